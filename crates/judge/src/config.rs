use std::{sync::RwLock, time::Duration};

use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static::lazy_static! {
  /// Process-wide config, installed once at startup by [`init`].
  pub static ref CONFIG: RwLock<Cfg> = RwLock::new(Cfg::default());
}

/// Load config from `search_paths` and install it as the process-wide [`CONFIG`].
pub fn init(search_paths: &[String]) {
  *CONFIG.write().unwrap() = Cfg::load(search_paths);
}

/// Judge core config, loaded once from a layered file+env source.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Cfg {
  /// Base URL of the sandbox executor, e.g. `http://127.0.0.1:5050`.
  pub sandbox_host: String,

  /// Path to the testlib headers as seen from inside the sandbox container.
  pub testlib_include_path: String,

  /// Root directory holding `<pid>/config.yaml` problem packages.
  pub problems_root: String,

  /// Root directory holding `counter.txt`.
  pub data_root: String,

  /// Root directory submissions are archived under (§6.3 `submissions/`).
  pub submissions_root: String,

  /// Number of submissions grouped per bucket directory.
  pub bucket_size: u64,

  /// Number of concurrent workers draining the submission queue.
  pub worker_count: usize,

  /// Queue length at which a submission's source is spilled to disk
  /// instead of held inline in the queue entry.
  pub spill_threshold: usize,

  /// Environment variables passed to every sandboxed run.
  pub judge_env: Vec<String>,

  pub limits: LimitsCfg,
}

impl Default for Cfg {
  fn default() -> Self {
    Self {
      sandbox_host: "http://127.0.0.1:5050".to_string(),
      testlib_include_path: "/usr/local/include".to_string(),
      problems_root: "/var/lib/judge/problems".to_string(),
      data_root: "/var/lib/judge/data".to_string(),
      submissions_root: "/var/lib/judge/submissions".to_string(),
      bucket_size: 100,
      worker_count: 4,
      spill_threshold: 512 * 1024,
      judge_env: vec![
        "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string(),
        "HOME=/w".to_string(),
        "ONLINE_JUDGE=judge".to_string(),
      ],
      limits: LimitsCfg::default(),
    }
  }
}

/// Default resource limits applied to compilation and to checker/interactor runs.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsCfg {
  pub compile_time: Duration,
  pub compile_memory: u64,
  pub compile_proc: u64,
  pub checker_time: Duration,
  pub checker_memory: u64,
  pub checker_proc: u64,
  pub stdout_limit: u64,
  pub stderr_limit: u64,
  pub default_time: Duration,
  pub default_memory: u64,
}

impl Default for LimitsCfg {
  fn default() -> Self {
    Self {
      compile_time: Duration::from_secs(10),
      compile_memory: 512 * 1024 * 1024,
      compile_proc: 50,
      checker_time: Duration::from_secs(2),
      checker_memory: 256 * 1024 * 1024,
      checker_proc: 10,
      stdout_limit: 128 * 1024 * 1024,
      stderr_limit: 1024 * 1024,
      default_time: Duration::from_secs(1),
      default_memory: 256 * 1024 * 1024,
    }
  }
}

impl Cfg {
  /// Build the config from a default baseline, then each of `search_paths`
  /// in order (later entries win), then environment variables prefixed
  /// with `JUDGE_`.
  pub fn load(search_paths: &[String]) -> Self {
    let mut builder = config::Config::builder()
      .add_source(config::File::with_name("/etc/judge/judge").required(false));

    for p in search_paths {
      builder = builder.add_source(config::File::with_name(p.as_str()).required(false));
    }

    builder = builder.add_source(config::Environment::with_prefix("JUDGE").separator("_"));

    builder.build().unwrap().try_deserialize::<Self>().unwrap()
  }
}

/// Parse a time-limit string (`"1.5s"`, `"250ms"`, `"3"`) into nanoseconds.
///
/// A bare number is interpreted as seconds.
pub fn parse_time_ns(s: &str) -> Option<u64> {
  lazy_static::lazy_static! {
    static ref TIME_PAT: Regex = Regex::new(r"(?i)^\s*([0-9.]+)\s*(ms|s)?\s*$").unwrap();
  }
  let cap = TIME_PAT.captures(s)?;
  let value: f64 = cap[1].parse().ok()?;
  let unit = cap.get(2).map(|m| m.as_str().to_lowercase());
  let ns = match unit.as_deref() {
    Some("ms") => value * 1_000_000.0,
    _ => value * 1_000_000_000.0,
  };
  Some(ns.round() as u64)
}

/// Parse a memory-limit string (`"256m"`, `"1g"`, `"500"`) into bytes, using
/// IEC binary units (k=1024, m=1024^2, g=1024^3).
pub fn parse_memory_bytes(s: &str) -> Option<u64> {
  lazy_static::lazy_static! {
    static ref MEM_PAT: Regex = Regex::new(r"(?i)^\s*([0-9.]+)\s*(k|m|g)?\s*$").unwrap();
  }
  let cap = MEM_PAT.captures(s)?;
  let value: f64 = cap[1].parse().ok()?;
  let unit = cap.get(2).map(|m| m.as_str().to_lowercase());
  let mult = match unit.as_deref() {
    Some("k") => 1024.0,
    Some("m") => 1024.0 * 1024.0,
    Some("g") => 1024.0 * 1024.0 * 1024.0,
    _ => 1.0,
  };
  Some((value * mult).round() as u64)
}
