use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Testlib-reported adjudication status, as embedded in a checker's output
/// message (distinct from the case-level `Accepted`/`WrongAnswer` pair the
/// engine adjudicates by exit status; see §4.E.1).
#[derive(Debug, PartialEq, strum::EnumString, Serialize, Deserialize, Clone, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Status {
  Accepted,
  WrongAnswer,
  PartiallyCorrect,
  PresentationError,
  SystemError,
}

const MESSAGE_LIMIT: usize = 4096;

/// Truncate a checker's raw output to a reasonable message length.
fn limit_message(s: &str) -> String {
  if s.len() <= MESSAGE_LIMIT {
    s.to_string()
  } else {
    let mut truncated = s.chars().take(MESSAGE_LIMIT).collect::<String>();
    truncated.push_str("...(truncated)");
    truncated
  }
}

/// Parsed testlib checker output.
#[derive(Debug, PartialEq, Clone)]
pub struct Output {
  /// Testlib parsed status.
  pub status: Status,

  /// Length limited output message.
  pub message: String,

  /// Floating point score value in [0,1].
  pub score: f32,
}

impl Output {
  /// Parse the output of a testlib checker.
  ///
  /// - ok -> Accepted.
  /// - wrong answer -> WrongAnswer.
  /// - fail -> SystemError.
  /// - wrong output format -> PresentationError.
  /// - points or partially correct:
  ///   - score <= 0: WrongAnswer, real_score = 0.
  ///   - 0 < score < 1: PartiallyCorrect, real_score = score.
  ///   - score >= 1: Accepted, real_score = 1.
  ///
  /// A line starting with `status(...)` overrides the parsed status; a
  /// line starting with `score(...)` overrides the parsed score.
  pub fn parse(output: &str) -> Self {
    lazy_static! {
      static ref AC_PAT: Regex = Regex::new(r"(?s)\Aok\s*(.*?)\s*\z").unwrap();
      static ref WA_PAT: Regex = Regex::new(r"(?s)\Awrong answer\s*(.*?)\s*\z").unwrap();
      static ref FAIL_PAT: Regex = Regex::new(r"(?s)\AFAIL\s*(.*?)\s*\z").unwrap();
      static ref PE_PAT: Regex = Regex::new(r"(?s)\Awrong output format\s*(.*?)\s*\z").unwrap();
      static ref PC_PAT: Regex =
        Regex::new(r"(?s)\A(?:partially correct|points) \(?([0-9]*\.?[0-9]*)\)?\s*(.*?)\s*\z")
          .unwrap();
      static ref CUSTOM_PAT: Regex =
        Regex::new(r"(?m)^[ \t]*(status|score)\(([\w\.]+)\)[ \t]*(.*?)\s*$").unwrap();
    }

    let mut ret = (Status::SystemError, 0.);

    if AC_PAT.is_match(output) {
      ret = (Status::Accepted, 1.);
    } else if WA_PAT.is_match(output) {
      ret = (Status::WrongAnswer, 0.);
    } else if FAIL_PAT.is_match(output) {
      ret = (Status::SystemError, 0.);
    } else if PE_PAT.is_match(output) {
      ret = (Status::PresentationError, 0.);
    } else if let Some(cap) = PC_PAT.captures(output) {
      if let Ok(score) = cap[1].parse::<f32>() {
        if score >= 1. {
          ret = (Status::Accepted, 1.);
        } else if score <= 0. {
          ret = (Status::WrongAnswer, 0.);
        } else {
          ret = (Status::PartiallyCorrect, score);
        }
      }
    }

    for cap in CUSTOM_PAT.captures_iter(output) {
      if &cap[1] == "status" {
        if let Ok(stat) = Status::from_str(&cap[2]) {
          ret.0 = stat;
        }
      } else if &cap[1] == "score" {
        if let Ok(stat) = cap[2].parse::<f32>() {
          ret.1 = stat.clamp(0., 1.);
        }
      }
    }

    Self {
      status: ret.0,
      score: ret.1,
      message: limit_message(output),
    }
  }
}
