use serde::{Deserialize, Serialize};

use crate::sandbox::proto;

/// Judge result status on a single test case (§3).
///
/// The wire spelling matches what the sandbox returns for run status
/// (passthrough) and the adjudicated `Accepted`/`WrongAnswer` pair for
/// checker decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum CaseStatus {
  Accepted,
  WrongAnswer,
  TimeLimitExceeded,
  MemoryLimitExceeded,
  RuntimeError,
  CompileError,
  OutputLimitExceeded,
  InternalError,
}

impl From<proto::Status> for CaseStatus {
  /// Passthrough mapping from the sandbox's run status, per §6.2.
  fn from(s: proto::Status) -> Self {
    match s {
      proto::Status::Accepted => CaseStatus::Accepted,
      proto::Status::MemoryLimitExceeded => CaseStatus::MemoryLimitExceeded,
      proto::Status::TimeLimitExceeded => CaseStatus::TimeLimitExceeded,
      proto::Status::OutputLimitExceeded => CaseStatus::OutputLimitExceeded,
      proto::Status::FileError
      | proto::Status::NonzeroExitStatus
      | proto::Status::Signalled => CaseStatus::RuntimeError,
      proto::Status::InternalError => CaseStatus::InternalError,
    }
  }
}

/// Result of running (and, if applicable, checking) one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
  pub ok: bool,
  pub status: CaseStatus,
  pub time_ns: u64,
  pub memory_bytes: u64,
  pub msg: String,
}

impl CaseResult {
  /// A case that could not even be dispatched to the sandbox (invariant 5).
  pub fn internal_error(msg: impl Into<String>) -> Self {
    Self {
      ok: false,
      status: CaseStatus::InternalError,
      time_ns: 0,
      memory_bytes: 0,
      msg: msg.into(),
    }
  }
}

/// Terminal or in-flight record of a submission's evaluation (§3).
///
/// Serializes as a flat, `status`-discriminated shape rather than an
/// internally-tagged enum so that `Done`'s `status` field doesn't collide
/// with the outer discriminator; see the `Serialize`/`Deserialize` impls.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
  Queued,
  Done {
    passed: bool,
    result: CaseStatus,
    cases: Vec<CaseResult>,
  },
  Error {
    message: String,
  },
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum WireVerdict {
  Queued,
  Done {
    passed: bool,
    result: CaseStatus,
    cases: Vec<CaseResult>,
  },
  Error {
    message: String,
  },
}

impl Serialize for Verdict {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    let wire = match self.clone() {
      Verdict::Queued => WireVerdict::Queued,
      Verdict::Done {
        passed,
        result,
        cases,
      } => WireVerdict::Done {
        passed,
        result,
        cases,
      },
      Verdict::Error { message } => WireVerdict::Error { message },
    };
    wire.serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for Verdict {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    Ok(match WireVerdict::deserialize(deserializer)? {
      WireVerdict::Queued => Verdict::Queued,
      WireVerdict::Done {
        passed,
        result,
        cases,
      } => Verdict::Done {
        passed,
        result,
        cases,
      },
      WireVerdict::Error { message } => Verdict::Error { message },
    })
  }
}
