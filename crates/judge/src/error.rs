use thiserror::Error;

/// Errors rejected at intake, before a submission id is allocated.
#[derive(Debug, Error, Clone)]
pub enum InvalidSubmission {
  #[error("empty source code")]
  EmptySource,

  #[error("unknown problem: {0}")]
  UnknownProblem(String),
}

/// Errors raised while loading a problem's configuration.
#[derive(Debug, Error)]
pub enum LoaderError {
  #[error("problem not found: {0}")]
  NotFound(String),

  #[error("invalid problem config for {pid}: {message}")]
  ConfigInvalid { pid: String, message: String },

  #[error("io error reading problem {pid}: {source}")]
  Io {
    pid: String,
    #[source]
    source: std::io::Error,
  },
}

/// Errors from the sandbox transport itself (network, protocol, non-2xx).
#[derive(Debug, Error)]
pub enum SandboxError {
  #[error("sandbox transport error: {0}")]
  Transport(String),

  #[error("sandbox run was not accepted: {status}")]
  NotAccepted { status: String },
}

/// Submission-level failures that abort the whole pipeline without
/// producing a per-case result (a subset of the pipeline's outcomes).
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Loader(#[from] LoaderError),

  #[error("compile error: {message}")]
  Compile { message: String },

  #[error("internal error: {message}")]
  InternalError { message: String },

  #[error(transparent)]
  Sandbox(#[from] SandboxError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
