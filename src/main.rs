pub mod args;

use std::{error::Error, sync::Arc};

use clap::Parser;
use judge_core::{
  cache::VerdictCache,
  config::{self, CONFIG},
  engine::{EngineConfig, JudgeEngine},
  problem::ProblemLoader,
  sandbox::{Client, HttpTransport},
  store::SubmissionStore,
};
use log::info;

extern crate pretty_env_logger;
extern crate log;

/// Thin wiring binary: parse args, load config, construct the judge engine
/// and run its worker pool. The HTTP/REST transport that calls into the
/// engine's `submit`/`get_result` API lives outside this crate.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
  pretty_env_logger::init();

  let args = args::Args::parse();
  config::init(&args.config_search_path);

  let cfg = CONFIG.read().unwrap().clone();

  let store = Arc::new(SubmissionStore::new(
    cfg.data_root.clone(),
    cfg.submissions_root.clone(),
    cfg.bucket_size,
  ));
  let cache = Arc::new(VerdictCache::new());
  let loader = Arc::new(ProblemLoader::new(cfg.problems_root.clone()));
  let transport = Arc::new(HttpTransport::new(cfg.sandbox_host.clone()));
  let client = Arc::new(Client::new(transport));

  let engine = Arc::new(JudgeEngine::new(
    store,
    cache,
    loader,
    client,
    EngineConfig {
      worker_count: cfg.worker_count,
      spill_threshold: cfg.spill_threshold,
      testlib_include_path: cfg.testlib_include_path.clone(),
      judge_env: cfg.judge_env.clone(),
    },
  ));

  info!(
    "starting {} workers against sandbox {}",
    cfg.worker_count, cfg.sandbox_host
  );
  let _workers = engine.spawn_workers();

  tokio::signal::ctrl_c().await?;
  info!("shutting down");

  Ok(())
}
