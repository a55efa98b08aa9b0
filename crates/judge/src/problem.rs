use std::{fs, path::PathBuf};

use serde::Deserialize;

use crate::{config, error::LoaderError};

/// Adjudication mode a problem package runs under (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
  Default,
  Interactive,
}

/// One test case, flattened out of its subtask (§4.B, §9 Design Notes).
#[derive(Debug, Clone)]
pub struct Case {
  pub subtask_index: usize,
  pub input_filename: String,
  pub answer_filename: String,
  pub time_ns: u64,
  pub memory_bytes: u64,
}

/// A problem package, loaded and flattened out of `config.yaml`.
#[derive(Debug, Clone)]
pub struct LoadedProblem {
  pub pid: String,
  pub problem_dir: PathBuf,
  pub kind: ProblemKind,
  pub cases: Vec<Case>,
  pub checker_name: String,
  pub interactor_name: Option<String>,
  pub main_name: Option<String>,
}

fn default_checker_name() -> String {
  "chk.cc".to_string()
}

fn default_input_suffix() -> String {
  ".in".to_string()
}

fn default_output_suffix() -> String {
  ".ans".to_string()
}

#[derive(Debug, Deserialize)]
struct RawConfig {
  #[serde(rename = "type")]
  kind: String,
  #[serde(alias = "time_limit")]
  time: Option<String>,
  #[serde(alias = "memory_limit")]
  memory: Option<String>,
  #[serde(default = "default_checker_name")]
  checker: String,
  interactor: Option<String>,
  filename: Option<String>,
  #[serde(default)]
  input_prefix: String,
  #[serde(default = "default_input_suffix")]
  input_suffix: String,
  #[serde(default)]
  output_prefix: String,
  #[serde(default = "default_output_suffix")]
  output_suffix: String,
  subtasks: Vec<RawSubtask>,
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
  #[serde(default)]
  #[allow(dead_code)]
  score: f32,
  #[serde(alias = "time_limit")]
  time: Option<String>,
  #[serde(alias = "memory_limit")]
  memory: Option<String>,
  n_cases: Option<usize>,
  cases: Option<Vec<RawCase>>,
}

#[derive(Debug, Deserialize)]
struct RawCase {
  input: String,
  output: String,
  time: Option<String>,
  memory: Option<String>,
}

/// Reads problem packages under `problems_root` (§4.B, §6.1).
pub struct ProblemLoader {
  problems_root: PathBuf,
}

impl ProblemLoader {
  pub fn new(problems_root: impl Into<PathBuf>) -> Self {
    Self {
      problems_root: problems_root.into(),
    }
  }

  fn dir(&self, pid: &str) -> PathBuf {
    self.problems_root.join(pid)
  }

  /// Parse `config.yaml` and flatten its subtasks into a linear case list.
  ///
  /// Limits resolve case > subtask > problem > global default, and case
  /// filenames continue numbering across subtasks rather than restarting
  /// at each one (§9 Design Notes).
  pub fn load(&self, pid: &str) -> Result<LoadedProblem, LoaderError> {
    let problem_dir = self.dir(pid);
    if !problem_dir.is_dir() {
      return Err(LoaderError::NotFound(pid.to_string()));
    }

    let config_path = problem_dir.join("config.yaml");
    let raw = fs::read_to_string(&config_path).map_err(|source| LoaderError::Io {
      pid: pid.to_string(),
      source,
    })?;
    let cfg: RawConfig = serde_yaml::from_str(&raw).map_err(|e| LoaderError::ConfigInvalid {
      pid: pid.to_string(),
      message: e.to_string(),
    })?;

    let kind = match cfg.kind.as_str() {
      "default" => ProblemKind::Default,
      "interactive" => ProblemKind::Interactive,
      other => {
        return Err(LoaderError::ConfigInvalid {
          pid: pid.to_string(),
          message: format!("unsupported problem type: {other}"),
        })
      }
    };
    if kind == ProblemKind::Interactive && cfg.interactor.is_none() {
      return Err(LoaderError::ConfigInvalid {
        pid: pid.to_string(),
        message: "interactive problem is missing an interactor".to_string(),
      });
    }
    if cfg.subtasks.is_empty() {
      return Err(LoaderError::ConfigInvalid {
        pid: pid.to_string(),
        message: "subtasks must be a non-empty list".to_string(),
      });
    }

    let (default_time, default_memory) = {
      let global = config::CONFIG.read().unwrap();
      (
        global.limits.default_time.as_nanos() as u64,
        global.limits.default_memory,
      )
    };
    let problem_time = cfg
      .time
      .as_deref()
      .and_then(config::parse_time_ns)
      .unwrap_or(default_time);
    let problem_memory = cfg
      .memory
      .as_deref()
      .and_then(config::parse_memory_bytes)
      .unwrap_or(default_memory);

    let mut cases = Vec::new();
    let mut next_case_index: usize = 1;
    for (subtask_index, subtask) in cfg.subtasks.iter().enumerate() {
      let subtask_time = subtask
        .time
        .as_deref()
        .and_then(config::parse_time_ns)
        .unwrap_or(problem_time);
      let subtask_memory = subtask
        .memory
        .as_deref()
        .and_then(config::parse_memory_bytes)
        .unwrap_or(problem_memory);

      match (subtask.n_cases, &subtask.cases) {
        (Some(n), _) if n > 0 => {
          for k in 0..n {
            let idx = next_case_index + k;
            cases.push(Case {
              subtask_index,
              input_filename: format!("{}{}{}", cfg.input_prefix, idx, cfg.input_suffix),
              answer_filename: format!("{}{}{}", cfg.output_prefix, idx, cfg.output_suffix),
              time_ns: subtask_time,
              memory_bytes: subtask_memory,
            });
          }
          next_case_index += n;
        }
        (_, Some(explicit)) if !explicit.is_empty() => {
          for c in explicit {
            cases.push(Case {
              subtask_index,
              input_filename: c.input.clone(),
              answer_filename: c.output.clone(),
              time_ns: c
                .time
                .as_deref()
                .and_then(config::parse_time_ns)
                .unwrap_or(subtask_time),
              memory_bytes: c
                .memory
                .as_deref()
                .and_then(config::parse_memory_bytes)
                .unwrap_or(subtask_memory),
            });
          }
        }
        _ => {
          return Err(LoaderError::ConfigInvalid {
            pid: pid.to_string(),
            message: format!("subtask {subtask_index} declares neither n_cases nor cases"),
          })
        }
      }
    }

    Ok(LoadedProblem {
      pid: pid.to_string(),
      problem_dir,
      kind,
      cases,
      checker_name: cfg.checker,
      interactor_name: cfg.interactor,
      main_name: cfg.filename,
    })
  }

  fn testdata_dir(&self, problem: &LoadedProblem) -> PathBuf {
    problem.problem_dir.join("testdata")
  }

  pub fn read_test_file(&self, problem: &LoadedProblem, name: &str) -> Result<Vec<u8>, LoaderError> {
    fs::read(self.testdata_dir(problem).join(name)).map_err(|source| LoaderError::Io {
      pid: problem.pid.clone(),
      source,
    })
  }

  /// Read a case's expected answer. If the configured filename ends in
  /// `.out` and a sibling `.ans` file exists, the `.ans` variant is
  /// preferred (§4.B answer-file fallback).
  pub fn read_answer_file(&self, problem: &LoadedProblem, case: &Case) -> Result<Vec<u8>, LoaderError> {
    let testdata = self.testdata_dir(problem);
    let mut name = case.answer_filename.clone();
    if let Some(stem) = name.strip_suffix(".out") {
      let ans_sibling = format!("{stem}.ans");
      if testdata.join(&ans_sibling).is_file() {
        name = ans_sibling;
      }
    }
    fs::read(testdata.join(&name)).map_err(|source| LoaderError::Io {
      pid: problem.pid.clone(),
      source,
    })
  }

  pub fn read_checker_source(&self, problem: &LoadedProblem) -> Result<Vec<u8>, LoaderError> {
    fs::read(problem.problem_dir.join(&problem.checker_name)).map_err(|source| LoaderError::Io {
      pid: problem.pid.clone(),
      source,
    })
  }

  pub fn read_interactor_source(&self, problem: &LoadedProblem) -> Result<Vec<u8>, LoaderError> {
    let name = problem.interactor_name.as_deref().ok_or_else(|| LoaderError::ConfigInvalid {
      pid: problem.pid.clone(),
      message: "problem has no interactor".to_string(),
    })?;
    fs::read(problem.problem_dir.join(name)).map_err(|source| LoaderError::Io {
      pid: problem.pid.clone(),
      source,
    })
  }

  /// Path a compiled checker/interactor blob would be cached at, so callers
  /// can skip recompiling on subsequent submissions to the same problem.
  pub fn checker_blob_path(&self, problem: &LoadedProblem) -> PathBuf {
    problem.problem_dir.join(format!("{}.bin", problem.checker_name))
  }

  pub fn read_statement(&self, pid: &str) -> Option<String> {
    fs::read_to_string(self.dir(pid).join("statement.txt")).ok()
  }

  /// List problem ids in lexicographic order. A directory counts as a
  /// problem iff it contains `config.yaml`; configs are not validated here.
  pub fn list_problems(&self, with_statement: bool) -> Vec<String> {
    let entries = match fs::read_dir(&self.problems_root) {
      Ok(entries) => entries,
      Err(_) => return vec![],
    };

    let mut names: Vec<String> = entries
      .filter_map(|e| e.ok())
      .filter(|e| e.path().join("config.yaml").is_file())
      .filter(|e| !with_statement || e.path().join("statement.txt").is_file())
      .filter_map(|e| e.file_name().into_string().ok())
      .collect();
    names.sort();
    names
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write(dir: &std::path::Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }

  #[test]
  fn flattens_n_cases_and_continues_numbering_across_subtasks() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
      root,
      "p1/config.yaml",
      "type: default\ntime_limit: 1s\nmemory_limit: 256m\nchecker: chk.cc\nsubtasks:\n  - score: 40\n    n_cases: 2\n  - score: 60\n    n_cases: 1\n    time_limit: 2s\n",
    );

    let loader = ProblemLoader::new(root);
    let problem = loader.load("p1").unwrap();

    assert_eq!(problem.cases.len(), 3);
    assert_eq!(problem.cases[0].input_filename, "1.in");
    assert_eq!(problem.cases[1].input_filename, "2.in");
    assert_eq!(problem.cases[2].input_filename, "3.in");
    assert_eq!(problem.cases[0].subtask_index, 0);
    assert_eq!(problem.cases[2].subtask_index, 1);
    assert_eq!(problem.cases[0].time_ns, 1_000_000_000);
    assert_eq!(problem.cases[2].time_ns, 2_000_000_000);
  }

  #[test]
  fn explicit_cases_override_subtask_limits() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
      root,
      "p2/config.yaml",
      "type: default\nmemory_limit: 256m\nsubtasks:\n  - score: 100\n    time_limit: 1s\n    cases:\n      - input: a.in\n        output: a.ans\n      - input: b.in\n        output: b.ans\n        time: 3s\n",
    );

    let loader = ProblemLoader::new(root);
    let problem = loader.load("p2").unwrap();

    assert_eq!(problem.cases.len(), 2);
    assert_eq!(problem.cases[0].input_filename, "a.in");
    assert_eq!(problem.cases[0].time_ns, 1_000_000_000);
    assert_eq!(problem.cases[1].time_ns, 3_000_000_000);
  }

  #[test]
  fn interactive_without_interactor_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
      root,
      "p3/config.yaml",
      "type: interactive\nsubtasks:\n  - score: 100\n    n_cases: 1\n",
    );

    let loader = ProblemLoader::new(root);
    assert!(matches!(
      loader.load("p3"),
      Err(LoaderError::ConfigInvalid { .. })
    ));
  }

  #[test]
  fn answer_file_prefers_ans_sibling_over_out() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
      root,
      "p4/config.yaml",
      "type: default\nsubtasks:\n  - score: 100\n    cases:\n      - input: 1.in\n        output: 1.out\n",
    );
    write(root, "p4/testdata/1.in", "in");
    write(root, "p4/testdata/1.out", "stale");
    write(root, "p4/testdata/1.ans", "fresh");

    let loader = ProblemLoader::new(root);
    let problem = loader.load("p4").unwrap();
    let content = loader.read_answer_file(&problem, &problem.cases[0]).unwrap();
    assert_eq!(content, b"fresh");
  }

  #[test]
  fn unknown_problem_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let loader = ProblemLoader::new(tmp.path());
    assert!(matches!(loader.load("missing"), Err(LoaderError::NotFound(_))));
  }

  #[test]
  fn list_problems_filters_by_statement_and_sorts() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "b/config.yaml", "type: default\nsubtasks:\n  - n_cases: 1\n");
    write(root, "a/config.yaml", "type: default\nsubtasks:\n  - n_cases: 1\n");
    write(root, "a/statement.txt", "statement");
    write(root, "not-a-problem/readme.txt", "nope");

    let loader = ProblemLoader::new(root);
    assert_eq!(loader.list_problems(false), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(loader.list_problems(true), vec!["a".to_string()]);
  }
}
