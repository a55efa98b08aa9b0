use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Wire shape of a sandbox stdio descriptor (go-judge wire-compatible, §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum File {
  Memory {
    content: String,
  },
  Cached {
    #[serde(rename = "fileId")]
    file_id: String,
  },
  Collector {
    name: String,
    max: u64,
    pipe: bool,
  },
}

impl File {
  pub fn memory(content: impl Into<String>) -> Self {
    File::Memory {
      content: content.into(),
    }
  }

  pub fn cached(file_id: impl Into<String>) -> Self {
    File::Cached {
      file_id: file_id.into(),
    }
  }

  pub fn collector(name: impl Into<String>, max: u64) -> Self {
    File::Collector {
      name: name.into(),
      max,
      pipe: false,
    }
  }
}

/// A single sandboxed run (§4.A `run(spec)`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cmd {
  pub args: Vec<String>,

  pub env: Vec<String>,

  /// Stdio descriptors: `[stdin, stdout, stderr]`.
  pub files: Vec<File>,

  /// ns
  pub cpu_limit: u64,

  /// ns
  pub clock_limit: u64,

  /// byte
  pub memory_limit: u64,

  pub proc_limit: u64,

  /// copy the corresponding file into the container before execution
  pub copy_in: HashMap<String, File>,

  /// files to return inline in the result
  pub copy_out: Vec<String>,

  /// files to store in the sandbox's file cache, returned as new artifact ids
  pub copy_out_cached: Vec<String>,
}

impl Default for Cmd {
  fn default() -> Self {
    Self {
      args: vec![],
      env: vec![],
      files: vec![
        File::memory(""),
        File::collector("stdout", 128 * 1024 * 1024),
        File::collector("stderr", 1024 * 1024),
      ],
      cpu_limit: 1_000_000_000,
      clock_limit: 2_000_000_000,
      memory_limit: 256 * 1024 * 1024,
      proc_limit: 1,
      copy_in: HashMap::new(),
      copy_out: vec![],
      copy_out_cached: vec![],
    }
  }
}

/// Sandbox verdict strings observed in the wire protocol (§6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
  Accepted,
  #[serde(alias = "Memory Limit Exceeded")]
  MemoryLimitExceeded,
  #[serde(alias = "Time Limit Exceeded")]
  TimeLimitExceeded,
  #[serde(alias = "Output Limit Exceeded")]
  OutputLimitExceeded,
  #[serde(alias = "File Error")]
  FileError,
  #[serde(alias = "Nonzero Exit Status")]
  NonzeroExitStatus,
  Signalled,
  #[serde(alias = "Internal Error")]
  InternalError,
}

/// Result of one `Cmd` dispatched to the sandbox.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
  pub status: Status,

  #[serde(default)]
  pub error: Option<String>,

  pub exit_status: i32,

  /// ns, wall clock
  pub run_time: u64,

  /// byte
  pub memory: u64,

  /// copyOut name -> content
  #[serde(default)]
  pub files: HashMap<String, String>,

  /// copyOutCached name -> cache artifact id
  #[serde(default)]
  pub file_ids: HashMap<String, String>,
}

/// One endpoint of a bidirectional pipe binding (interactive mode, §4.E).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeIndex {
  /// index into the request's `cmd` array
  pub index: u64,
  /// file descriptor number within that command
  pub fd: u64,
}

/// Connects one command's output fd to another's input fd.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeMap {
  #[serde(rename = "in")]
  pub inp: PipeIndex,
  pub out: PipeIndex,
  pub proxy: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max: Option<u64>,
}

/// Body of `POST /run`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
  pub cmd: Vec<Cmd>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub pipe_mapping: Vec<PipeMap>,
}
