//! `judge-core`: the submission judging engine.
//!
//! This crate owns the submission lifecycle — queueing, the per-submission
//! execution plan, the sandbox resource protocol, problem configuration, and
//! on-disk archival. The HTTP/REST transport, problem-package import
//! tooling, and authentication live outside this crate and call into it.

#[macro_use]
extern crate lazy_static;
extern crate log;

pub mod cache;
pub mod checker;
pub mod config;
pub mod engine;
pub mod error;
pub mod problem;
pub mod sandbox;
pub mod store;
pub mod verdict;

pub use crate::config::CONFIG;
