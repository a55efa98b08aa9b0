pub mod client;
pub mod proto;
pub mod transport;

pub use client::{CheckerPrepared, Client, PreparedProgram};
pub use transport::{HttpTransport, Transport};

#[cfg(test)]
pub use transport::fake::FakeTransport;
