use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
  time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::{debug, error, info, warn};

use crate::{
  checker,
  error::{InvalidSubmission, PipelineError},
  problem::{Case, LoadedProblem, ProblemKind, ProblemLoader},
  sandbox::{self, proto, Client, PreparedProgram},
  store::{Meta, SubmissionStore},
  verdict::{CaseResult, CaseStatus, Verdict},
  cache::VerdictCache,
};

/// Error surfaced by [`JudgeEngine::submit`] before a `sid` is allocated (§7).
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
  #[error(transparent)]
  Invalid(#[from] InvalidSubmission),
  #[error("io error allocating submission: {0}")]
  Io(#[from] std::io::Error),
}

/// A dequeued unit of work. `code` is `None` when the source was spilled to
/// disk at intake and must be rehydrated by the worker (§5 Queue).
struct Job {
  sid: u64,
  pid: String,
  language: String,
  code: Option<String>,
}

/// Construction parameters for [`JudgeEngine`] (§4.E Construction).
pub struct EngineConfig {
  pub worker_count: usize,
  pub spill_threshold: usize,
  pub testlib_include_path: String,
  pub judge_env: Vec<String>,
}

/// Submission intake API, queue, worker pool, and per-submission pipeline (§4.E).
pub struct JudgeEngine {
  store: Arc<SubmissionStore>,
  cache: Arc<VerdictCache>,
  loader: Arc<ProblemLoader>,
  client: Arc<Client>,
  queue: Mutex<VecDeque<Job>>,
  worker_count: usize,
  spill_threshold: usize,
  testlib_include_path: String,
  judge_env: Vec<String>,
}

impl JudgeEngine {
  pub fn new(
    store: Arc<SubmissionStore>,
    cache: Arc<VerdictCache>,
    loader: Arc<ProblemLoader>,
    client: Arc<Client>,
    cfg: EngineConfig,
  ) -> Self {
    Self {
      store,
      cache,
      loader,
      client,
      queue: Mutex::new(VecDeque::new()),
      worker_count: cfg.worker_count,
      spill_threshold: cfg.spill_threshold,
      testlib_include_path: cfg.testlib_include_path,
      judge_env: cfg.judge_env,
    }
  }

  /// Spawn `worker_count` worker loops. The engine must be wrapped in an
  /// `Arc` so each loop can hold a strong reference to it.
  pub fn spawn_workers(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
    (0..self.worker_count)
      .map(|_| {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.worker_loop().await })
      })
      .collect()
  }

  async fn worker_loop(self: Arc<Self>) {
    loop {
      let job = self.queue.lock().unwrap().pop_front();
      match job {
        Some(job) => {
          debug!("sid {}: dequeued for pid {}", job.sid, job.pid);
          self.process(job).await;
        }
        None => tokio::time::sleep(Duration::from_millis(50)).await,
      }
    }
  }

  /// Intake a submission: allocate an id, publish `Queued`, archive a
  /// visibility-respecting directory, and enqueue the job (§4.E Intake).
  pub fn submit(&self, pid: &str, language: &str, code: &str) -> Result<u64, SubmitError> {
    if code.trim().is_empty() {
      return Err(InvalidSubmission::EmptySource.into());
    }
    if pid.trim().is_empty() || language.trim().is_empty() {
      return Err(InvalidSubmission::UnknownProblem(pid.to_string()).into());
    }

    let sid = self.store.next_id()?;
    self.cache.publish(sid, Verdict::Queued);

    let paths = self.store.paths(sid);
    std::fs::create_dir_all(&paths.sub_dir)?;

    let spilled = self.queue.lock().unwrap().len() >= self.spill_threshold;
    let job_code = if spilled {
      std::fs::write(paths.sub_dir.join("source.code"), code)?;
      None
    } else {
      Some(code.to_string())
    };

    self.queue.lock().unwrap().push_back(Job {
      sid,
      pid: pid.to_string(),
      language: language.to_string(),
      code: job_code,
    });

    let timestamp_ms = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_millis() as u64;
    let meta = Meta {
      sid,
      pid: pid.to_string(),
      language: language.to_string(),
      timestamp_ms,
    };
    if let Err(e) = std::fs::write(
      paths.sub_dir.join("meta.json"),
      serde_json::to_vec(&meta).unwrap_or_default(),
    ) {
      warn!("sid {sid}: failed to write meta.json: {e}");
    }

    info!("sid {sid}: submitted for pid {pid} ({language}){}", if spilled { " [spilled]" } else { "" });

    Ok(sid)
  }

  /// §6.4 `get_result`: consume-on-read from the in-memory cache, falling
  /// back to the on-disk `result.json` when the entry is absent (§4.D).
  pub fn get_result(&self, sid: u64) -> Option<Verdict> {
    if let Some(verdict) = self.cache.read(sid) {
      return Some(verdict);
    }
    let path = self.store.paths(sid).sub_dir.join("result.json");
    std::fs::read(path)
      .ok()
      .and_then(|bytes| serde_json::from_slice(&bytes).ok())
  }

  /// §6.4 `clear_results`: wipes the in-memory verdict cache only.
  pub fn clear_results(&self) {
    self.cache.clear();
  }

  /// §6.4 `list_problems`.
  pub fn list_problems(&self, with_statement: bool) -> Vec<String> {
    self.loader.list_problems(with_statement)
  }

  /// §6.4 `get_statement`.
  pub fn get_statement(&self, pid: &str) -> Option<String> {
    self.loader.read_statement(pid)
  }

  /// §6.4 `read_test_file`.
  pub fn read_test_file(&self, pid: &str, name: &str) -> Result<Vec<u8>, PipelineError> {
    let problem = self.loader.load(pid)?;
    Ok(self.loader.read_test_file(&problem, name)?)
  }

  /// Reset protocol (§5): zero the submission id counter, wipe the
  /// submissions tree, and clear the in-memory verdict cache. As the spec
  /// notes, this does not quiesce in-flight workers — a worker mid-pipeline
  /// may still write `result.json` into what is now a fresh tree. Callers
  /// that need a stronger guarantee must refuse resets while the queue is
  /// non-empty themselves.
  pub fn reset(&self) -> std::io::Result<()> {
    self.store.reset()?;
    self.store.empty_tree(self.store.submissions_root())?;
    self.cache.clear();
    Ok(())
  }

  async fn process(&self, job: Job) {
    let paths = self.store.paths(job.sid);

    let code = match job.code {
      Some(inline) => {
        if let Err(e) = std::fs::write(paths.sub_dir.join("source.code"), &inline) {
          warn!("sid {}: failed to archive source.code: {e}", job.sid);
        }
        inline
      }
      None => match std::fs::read_to_string(paths.sub_dir.join("source.code")) {
        Ok(c) => c,
        Err(e) => {
          self.finish(job.sid, &paths, Verdict::Error { message: e.to_string() });
          return;
        }
      },
    };

    let verdict = match self.run_pipeline(&job.pid, &job.language, code.as_bytes()).await {
      Ok((passed, result, cases)) => Verdict::Done { passed, result, cases },
      Err(e) => Verdict::Error { message: e.to_string() },
    };
    self.finish(job.sid, &paths, verdict);
  }

  fn finish(&self, sid: u64, paths: &crate::store::SubmissionPaths, verdict: Verdict) {
    self.cache.publish(sid, verdict.clone());
    match serde_json::to_vec(&verdict) {
      Ok(bytes) => {
        if let Err(e) = std::fs::write(paths.sub_dir.join("result.json"), bytes) {
          error!("sid {sid}: failed to write result.json: {e}");
        }
      }
      Err(e) => error!("sid {sid}: failed to serialize verdict: {e}"),
    }
  }

  /// Load the problem, prepare the player program and checker/interactor,
  /// run cases in declared order with early termination, and release every
  /// sandbox artifact acquired along the way (§4.E worker loop).
  async fn run_pipeline(
    &self,
    pid: &str,
    language: &str,
    code: &[u8],
  ) -> Result<(bool, CaseStatus, Vec<CaseResult>), PipelineError> {
    let problem = self.loader.load(pid)?;

    let prepared = self
      .client
      .prepare_program(language, code, problem.main_name.as_deref())
      .await?;
    let mut cleanup_ids = prepared.cleanup_ids.clone();

    let checker_prepared = self.resolve_checker(&problem).await;
    let checker_prepared = match checker_prepared {
      Ok(c) => c,
      Err(e) => {
        self.cleanup(&cleanup_ids).await;
        return Err(e);
      }
    };
    cleanup_ids.extend(checker_prepared.cleanup_ids.clone());
    cleanup_ids.push(checker_prepared.checker_id.clone());

    let interactor_prepared = if problem.kind == ProblemKind::Interactive {
      match self.resolve_interactor(&problem).await {
        Ok(i) => {
          cleanup_ids.extend(i.cleanup_ids.clone());
          cleanup_ids.push(i.checker_id.clone());
          Some(i)
        }
        Err(e) => {
          self.cleanup(&cleanup_ids).await;
          return Err(e);
        }
      }
    } else {
      None
    };

    let mut cases = Vec::with_capacity(problem.cases.len());
    let mut last_status = CaseStatus::Accepted;
    for case in &problem.cases {
      let result = match (&interactor_prepared, problem.kind) {
        (Some(interactor), ProblemKind::Interactive) => {
          self
            .judge_case_interactive(&prepared, interactor.checker_id.as_str(), case, &problem)
            .await
        }
        _ => {
          self
            .judge_case(&prepared, case, &problem, &checker_prepared.checker_id)
            .await
        }
      };
      last_status = result.status;
      let ok = result.ok;
      cases.push(result);
      if !ok {
        break;
      }
    }

    self.cleanup(&cleanup_ids).await;

    let passed = cases.iter().all(|c| c.ok);
    Ok((passed, last_status, cases))
  }

  async fn resolve_checker(
    &self,
    problem: &LoadedProblem,
  ) -> Result<sandbox::CheckerPrepared, PipelineError> {
    let blob_path = self.loader.checker_blob_path(problem);
    if blob_path.is_file() {
      self.client.load_checker_blob(&blob_path).await
    } else {
      let source = self.loader.read_checker_source(problem)?;
      self
        .client
        .prepare_checker(&source, &self.testlib_include_path)
        .await
    }
  }

  async fn resolve_interactor(
    &self,
    problem: &LoadedProblem,
  ) -> Result<sandbox::CheckerPrepared, PipelineError> {
    let blob_path = problem
      .problem_dir
      .join(format!("{}.bin", problem.interactor_name.as_deref().unwrap_or_default()));
    if blob_path.is_file() {
      self.client.load_checker_blob(&blob_path).await
    } else {
      let source = self.loader.read_interactor_source(problem)?;
      self
        .client
        .prepare_checker(&source, &self.testlib_include_path)
        .await
    }
  }

  async fn cleanup(&self, ids: &[String]) {
    for id in ids {
      self.client.delete_file(id).await;
    }
  }

  /// Run the player program, then (iff it exits `Accepted`) the checker, and
  /// adjudicate per §4.E.1. Infallible: any sandbox/transport failure maps
  /// to an `InternalError` case rather than propagating.
  async fn judge_case(
    &self,
    prepared: &PreparedProgram,
    case: &Case,
    problem: &LoadedProblem,
    checker_id: &str,
  ) -> CaseResult {
    let input = match self.loader.read_test_file(problem, &case.input_filename) {
      Ok(b) => b,
      Err(e) => return CaseResult::internal_error(e.to_string()),
    };

    let run_cmd = proto::Cmd {
      args: prepared.run_args.clone(),
      env: self.judge_env.clone(),
      files: vec![
        proto::File::memory(String::from_utf8_lossy(&input)),
        proto::File::collector("stdout", 128 * 1024 * 1024),
        proto::File::collector("stderr", 1024 * 1024),
      ],
      cpu_limit: case.time_ns,
      clock_limit: case.time_ns * 2,
      memory_limit: case.memory_bytes,
      proc_limit: 50,
      copy_in: prepared.copy_in_bindings.clone(),
      ..Default::default()
    };

    let run_res = match self.client.run(run_cmd).await {
      Ok(r) => r,
      Err(e) => return CaseResult::internal_error(e.to_string()),
    };

    if run_res.status != proto::Status::Accepted {
      return CaseResult {
        ok: false,
        status: CaseStatus::from(run_res.status),
        time_ns: run_res.run_time,
        memory_bytes: run_res.memory,
        msg: run_res.files.get("stderr").cloned().unwrap_or_default(),
      };
    }

    let answer = match self.loader.read_answer_file(problem, case) {
      Ok(b) => b,
      Err(e) => return CaseResult::internal_error(e.to_string()),
    };
    let program_stdout = run_res.files.get("stdout").cloned().unwrap_or_default();

    let check_cmd = proto::Cmd {
      args: vec!["chk".to_string(), "in.txt".to_string(), "out.txt".to_string(), "ans.txt".to_string()],
      env: self.judge_env.clone(),
      files: vec![
        proto::File::memory(""),
        proto::File::collector("stdout", 1024 * 1024),
        proto::File::collector("stderr", 1024 * 1024),
      ],
      copy_in: [
        ("chk".to_string(), proto::File::cached(checker_id.to_string())),
        ("in.txt".to_string(), proto::File::memory(String::from_utf8_lossy(&input))),
        ("out.txt".to_string(), proto::File::memory(program_stdout)),
        ("ans.txt".to_string(), proto::File::memory(String::from_utf8_lossy(&answer))),
      ]
      .into(),
      cpu_limit: 2_000_000_000,
      clock_limit: 4_000_000_000,
      memory_limit: 256 * 1024 * 1024,
      proc_limit: 10,
      ..Default::default()
    };

    let check_res = match self.client.run(check_cmd).await {
      Ok(r) => r,
      Err(e) => return CaseResult::internal_error(e.to_string()),
    };

    let ok = check_res.status == proto::Status::Accepted && check_res.exit_status == 0;
    let raw = check_res
      .files
      .get("stdout")
      .filter(|s| !s.is_empty())
      .or_else(|| check_res.files.get("stderr"))
      .cloned()
      .unwrap_or_default();

    CaseResult {
      ok,
      status: if ok { CaseStatus::Accepted } else { CaseStatus::WrongAnswer },
      time_ns: run_res.run_time,
      memory_bytes: run_res.memory,
      msg: checker::Output::parse(&raw).message,
    }
  }

  /// Interactive counterpart of [`Self::judge_case`]: player and interactor
  /// are dispatched together, connected by the sandbox's pipe mapping
  /// (§4.E interactive paragraph).
  async fn judge_case_interactive(
    &self,
    prepared: &PreparedProgram,
    interactor_id: &str,
    case: &Case,
    problem: &LoadedProblem,
  ) -> CaseResult {
    let input = match self.loader.read_test_file(problem, &case.input_filename) {
      Ok(b) => b,
      Err(e) => return CaseResult::internal_error(e.to_string()),
    };
    let answer = match self.loader.read_answer_file(problem, case) {
      Ok(b) => b,
      Err(e) => return CaseResult::internal_error(e.to_string()),
    };

    let player_cmd = proto::Cmd {
      args: prepared.run_args.clone(),
      env: self.judge_env.clone(),
      copy_in: prepared.copy_in_bindings.clone(),
      cpu_limit: case.time_ns,
      clock_limit: case.time_ns * 2,
      memory_limit: case.memory_bytes,
      proc_limit: 50,
      ..Default::default()
    };

    let interactor_cmd = proto::Cmd {
      args: vec!["chk".to_string(), "in.txt".to_string(), "ans.txt".to_string()],
      env: self.judge_env.clone(),
      copy_in: [
        ("chk".to_string(), proto::File::cached(interactor_id.to_string())),
        ("in.txt".to_string(), proto::File::memory(String::from_utf8_lossy(&input))),
        ("ans.txt".to_string(), proto::File::memory(String::from_utf8_lossy(&answer))),
      ]
      .into(),
      cpu_limit: 2_000_000_000,
      clock_limit: 4_000_000_000,
      memory_limit: 256 * 1024 * 1024,
      proc_limit: 10,
      ..Default::default()
    };

    // interactor stdout -> player stdin, player stdout -> interactor stdin.
    let pipe_mapping = vec![
      proto::PipeMap {
        out: proto::PipeIndex { index: 1, fd: 1 },
        inp: proto::PipeIndex { index: 0, fd: 0 },
        proxy: false,
        name: None,
        max: None,
      },
      proto::PipeMap {
        out: proto::PipeIndex { index: 0, fd: 1 },
        inp: proto::PipeIndex { index: 1, fd: 0 },
        proxy: false,
        name: None,
        max: None,
      },
    ];

    match self.client.run_piped([player_cmd, interactor_cmd], pipe_mapping).await {
      Ok([player_res, interactor_res]) => {
        let ok = interactor_res.status == proto::Status::Accepted && interactor_res.exit_status == 0;
        let msg = interactor_res
          .files
          .get("stdout")
          .filter(|s| !s.is_empty())
          .or_else(|| interactor_res.files.get("stderr"))
          .cloned()
          .unwrap_or_default();
        CaseResult {
          ok,
          status: if ok { CaseStatus::Accepted } else { CaseStatus::WrongAnswer },
          time_ns: player_res.run_time,
          memory_bytes: player_res.memory,
          msg,
        }
      }
      Err(e) => CaseResult::internal_error(e.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{fs, path::Path};

  use super::*;
  use crate::sandbox::FakeTransport;

  fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }

  fn setup_two_case_problem(root: &Path) {
    write(
      root,
      "A/config.yaml",
      "type: default\nchecker: chk.cc\nsubtasks:\n  - n_cases: 2\n",
    );
    write(root, "A/chk.cc", "checker source");
    write(root, "A/testdata/1.in", "a\n");
    write(root, "A/testdata/1.ans", "a\n");
    write(root, "A/testdata/2.in", "b\n");
    write(root, "A/testdata/2.ans", "b\n");
  }

  fn content_of(f: &proto::File) -> String {
    match f {
      proto::File::Memory { content } => content.clone(),
      _ => String::new(),
    }
  }

  fn sandbox_ok(exit_status: i32, files: &[(&str, &str)], file_ids: &[(&str, &str)]) -> proto::RunResult {
    proto::RunResult {
      status: proto::Status::Accepted,
      error: None,
      exit_status,
      run_time: 1_000_000,
      memory: 4096,
      files: files.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
      file_ids: file_ids.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
    }
  }

  fn make_engine(root: &Path, transport: FakeTransport) -> JudgeEngine {
    make_engine_with_transport(root, Arc::new(transport))
  }

  fn make_engine_with_transport(root: &Path, transport: Arc<FakeTransport>) -> JudgeEngine {
    let store = Arc::new(SubmissionStore::new(root.join("data"), root.join("submissions"), 100));
    let cache = Arc::new(VerdictCache::new());
    let loader = Arc::new(ProblemLoader::new(root));
    let client = Arc::new(Client::new(transport));
    JudgeEngine::new(
      store,
      cache,
      loader,
      client,
      EngineConfig {
        worker_count: 1,
        spill_threshold: usize::MAX,
        testlib_include_path: "/usr/local/include".to_string(),
        judge_env: vec![],
      },
    )
  }

  async fn run_one(engine: &JudgeEngine, pid: &str, language: &str, code: &str) -> (u64, Verdict) {
    let sid = engine.submit(pid, language, code).unwrap();
    let job = engine.queue.lock().unwrap().pop_front().unwrap();
    engine.process(job).await;
    let verdict = engine.cache.read(sid).unwrap();
    (sid, verdict)
  }

  /// `get_result` consumes the cache entry once, then falls back to the
  /// durable `result.json` on the next read (§4.D, §8 property 6).
  #[tokio::test]
  async fn get_result_consumes_then_falls_back_to_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    setup_two_case_problem(root);

    let transport = FakeTransport::new(move |cmd| {
      if cmd.args.first().map(String::as_str) == Some("/bin/true") {
        sandbox_ok(0, &[], &[("main.py", "prog1")])
      } else if cmd.copy_in.contains_key("chk.cc") {
        sandbox_ok(0, &[], &[("chk", "chk1")])
      } else if cmd.args == vec!["/usr/bin/python3".to_string(), "main.py".to_string()] {
        let stdin = content_of(&cmd.files[0]);
        sandbox_ok(0, &[("stdout", stdin.as_str())], &[])
      } else {
        sandbox_ok(0, &[("stdout", "ok")], &[])
      }
    });

    let engine = make_engine(root, transport);
    let sid = engine.submit("A", "py", "print(input())").unwrap();
    let job = engine.queue.lock().unwrap().pop_front().unwrap();
    engine.process(job).await;

    match engine.get_result(sid) {
      Some(Verdict::Done { passed, .. }) => assert!(passed),
      other => panic!("expected Done from cache, got {other:?}"),
    }
    match engine.get_result(sid) {
      Some(Verdict::Done { passed, .. }) => assert!(passed),
      other => panic!("expected Done from disk fallback, got {other:?}"),
    }
    engine.clear_results();
    assert!(engine.cache.read(sid).is_none());
  }

  /// Reset zeroes the counter, empties the submissions tree, and clears the
  /// cache (§5 reset protocol).
  #[test]
  fn reset_clears_counter_tree_and_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    setup_two_case_problem(root);
    let transport = FakeTransport::new(|_| sandbox_ok(0, &[], &[]));
    let engine = make_engine(root, transport);

    let sid = engine.submit("A", "py", "print(1)").unwrap();
    assert!(engine.store.paths(sid).sub_dir.is_dir());

    engine.reset().unwrap();

    assert!(engine.cache.read(sid).is_none());
    assert_eq!(engine.store.next_id().unwrap(), 1);
    assert_eq!(fs::read_dir(engine.store.submissions_root()).unwrap().count(), 0);
  }

  /// S1: two cases, player echoes its input, checker accepts both.
  #[tokio::test]
  async fn happy_path_two_cases() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    setup_two_case_problem(root);

    let transport = FakeTransport::new(move |cmd| {
      if cmd.args.first().map(String::as_str) == Some("/bin/true") {
        sandbox_ok(0, &[], &[("main.py", "prog1")])
      } else if cmd.copy_in.contains_key("chk.cc") {
        sandbox_ok(0, &[], &[("chk", "chk1")])
      } else if cmd.args == vec!["/usr/bin/python3".to_string(), "main.py".to_string()] {
        let stdin = content_of(&cmd.files[0]);
        sandbox_ok(0, &[("stdout", stdin.as_str())], &[])
      } else {
        let out = content_of(cmd.copy_in.get("out.txt").unwrap());
        let ans = content_of(cmd.copy_in.get("ans.txt").unwrap());
        sandbox_ok(if out == ans { 0 } else { 1 }, &[("stdout", "ok")], &[])
      }
    });

    let engine = make_engine(root, transport);
    let (_, verdict) = run_one(&engine, "A", "py", "print(input())").await;

    match verdict {
      Verdict::Done { passed, result, cases } => {
        assert!(passed);
        assert_eq!(result, CaseStatus::Accepted);
        assert_eq!(cases.len(), 2);
        assert!(cases.iter().all(|c| c.ok));
      }
      other => panic!("expected Done, got {other:?}"),
    }
  }

  /// S2: player times out on the second case; verdict is TLE and the
  /// checker is never invoked for that case.
  #[tokio::test]
  async fn tle_on_second_case() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    setup_two_case_problem(root);

    let transport = FakeTransport::new(move |cmd| {
      if cmd.args.first().map(String::as_str) == Some("/bin/true") {
        sandbox_ok(0, &[], &[("main.py", "prog1")])
      } else if cmd.copy_in.contains_key("chk.cc") {
        sandbox_ok(0, &[], &[("chk", "chk1")])
      } else if cmd.args == vec!["/usr/bin/python3".to_string(), "main.py".to_string()] {
        let stdin = content_of(&cmd.files[0]);
        if stdin.trim() == "b" {
          proto::RunResult {
            status: proto::Status::TimeLimitExceeded,
            error: None,
            exit_status: -1,
            run_time: 2_000_000_000,
            memory: 4096,
            files: Default::default(),
            file_ids: Default::default(),
          }
        } else {
          sandbox_ok(0, &[("stdout", stdin.as_str())], &[])
        }
      } else {
        sandbox_ok(0, &[("stdout", "ok")], &[])
      }
    });

    let engine = make_engine(root, transport);
    let (_, verdict) = run_one(&engine, "A", "py", "print(input())").await;

    match verdict {
      Verdict::Done { passed, result, cases } => {
        assert!(!passed);
        assert_eq!(result, CaseStatus::TimeLimitExceeded);
        assert_eq!(cases.len(), 2);
        assert!(cases[0].ok);
        assert!(!cases[1].ok);
        assert_eq!(cases[1].status, CaseStatus::TimeLimitExceeded);
      }
      other => panic!("expected Done, got {other:?}"),
    }
  }

  /// S3: compilation fails; verdict is an `Error` carrying stderr, and the
  /// checker is never prepared.
  #[tokio::test]
  async fn compile_error_aborts_before_checker() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    setup_two_case_problem(root);

    let transport = FakeTransport::new(move |cmd| {
      if cmd.copy_in.contains_key("main.cpp") {
        proto::RunResult {
          status: proto::Status::NonzeroExitStatus,
          error: None,
          exit_status: 1,
          run_time: 10_000_000,
          memory: 4096,
          files: [("stderr".to_string(), "main.cpp:1: error: expected ';'".to_string())].into(),
          file_ids: Default::default(),
        }
      } else if cmd.copy_in.contains_key("chk.cc") {
        panic!("checker must not be prepared after a compile error");
      } else {
        panic!("unexpected sandbox call: {cmd:?}");
      }
    });

    let engine = make_engine(root, transport);
    let (_, verdict) = run_one(&engine, "A", "cpp", "int main( { return 0; }").await;

    match verdict {
      Verdict::Error { message } => assert!(message.contains("expected ';'")),
      other => panic!("expected Error, got {other:?}"),
    }
  }

  /// S4: player output is wrong; the checker adjudicates WA and the
  /// submission terminates after the first case.
  #[tokio::test]
  async fn checker_rejects_wrong_answer() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    setup_two_case_problem(root);

    let transport = FakeTransport::new(move |cmd| {
      if cmd.args.first().map(String::as_str) == Some("/bin/true") {
        sandbox_ok(0, &[], &[("main.py", "prog1")])
      } else if cmd.copy_in.contains_key("chk.cc") {
        sandbox_ok(0, &[], &[("chk", "chk1")])
      } else if cmd.args == vec!["/usr/bin/python3".to_string(), "main.py".to_string()] {
        sandbox_ok(0, &[("stdout", "wrong")], &[])
      } else {
        sandbox_ok(1, &[("stdout", "wrong answer expected a got wrong")], &[])
      }
    });

    let engine = make_engine(root, transport);
    let (_, verdict) = run_one(&engine, "A", "py", "print('wrong')").await;

    match verdict {
      Verdict::Done { passed, result, cases } => {
        assert!(!passed);
        assert_eq!(result, CaseStatus::WrongAnswer);
        assert_eq!(cases.len(), 1, "early termination: second case must not run");
        assert!(!cases[0].ok);
      }
      other => panic!("expected Done, got {other:?}"),
    }
  }

  /// Every sandbox artifact acquired for a submission is released exactly
  /// once (§8 property 3): one for the cached source, one for the checker.
  #[tokio::test]
  async fn cleans_up_every_acquired_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    setup_two_case_problem(root);

    let transport = Arc::new(FakeTransport::new(move |cmd| {
      if cmd.args.first().map(String::as_str) == Some("/bin/true") {
        sandbox_ok(0, &[], &[("main.py", "prog1")])
      } else if cmd.copy_in.contains_key("chk.cc") {
        sandbox_ok(0, &[], &[("chk", "chk1")])
      } else if cmd.args == vec!["/usr/bin/python3".to_string(), "main.py".to_string()] {
        let stdin = content_of(&cmd.files[0]);
        sandbox_ok(0, &[("stdout", stdin.as_str())], &[])
      } else {
        let out = content_of(cmd.copy_in.get("out.txt").unwrap());
        let ans = content_of(cmd.copy_in.get("ans.txt").unwrap());
        sandbox_ok(if out == ans { 0 } else { 1 }, &[("stdout", "ok")], &[])
      }
    }));

    let engine = make_engine_with_transport(root, Arc::clone(&transport));
    let (_, verdict) = run_one(&engine, "A", "py", "print(input())").await;
    assert!(matches!(verdict, Verdict::Done { passed: true, .. }));

    let mut deleted = transport.deleted.lock().unwrap().clone();
    deleted.sort();
    assert_eq!(deleted, vec!["chk1".to_string(), "prog1".to_string()]);
  }

  /// S5: a spilled submission (queue length at or past `spill_threshold`)
  /// rehydrates its source from `source.code` and produces the same verdict
  /// as an inline one (§5 Queue, §8 property 5).
  #[tokio::test]
  async fn spilled_submission_rehydrates_and_matches_inline() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    setup_two_case_problem(root);

    let responder = move |cmd: &proto::Cmd| {
      if cmd.args.first().map(String::as_str) == Some("/bin/true") {
        sandbox_ok(0, &[], &[("main.py", "prog1")])
      } else if cmd.copy_in.contains_key("chk.cc") {
        sandbox_ok(0, &[], &[("chk", "chk1")])
      } else if cmd.args == vec!["/usr/bin/python3".to_string(), "main.py".to_string()] {
        let stdin = content_of(&cmd.files[0]);
        sandbox_ok(0, &[("stdout", stdin.as_str())], &[])
      } else {
        let out = content_of(cmd.copy_in.get("out.txt").unwrap());
        let ans = content_of(cmd.copy_in.get("ans.txt").unwrap());
        sandbox_ok(if out == ans { 0 } else { 1 }, &[("stdout", "ok")], &[])
      }
    };

    let store = Arc::new(SubmissionStore::new(root.join("data"), root.join("submissions"), 100));
    let cache = Arc::new(VerdictCache::new());
    let loader = Arc::new(ProblemLoader::new(root));
    let client = Arc::new(Client::new(Arc::new(FakeTransport::new(responder))));
    let engine = JudgeEngine::new(
      store,
      cache,
      loader,
      client,
      EngineConfig {
        worker_count: 1,
        spill_threshold: 0,
        testlib_include_path: "/usr/local/include".to_string(),
        judge_env: vec![],
      },
    );

    let sid = engine.submit("A", "py", "print(input())").unwrap();
    let sub_dir = engine.store.paths(sid).sub_dir.clone();
    assert_eq!(
      fs::read_to_string(sub_dir.join("source.code")).unwrap(),
      "print(input())",
      "source must be archived to disk immediately when spilled"
    );

    let job = engine.queue.lock().unwrap().pop_front().unwrap();
    assert!(job.code.is_none(), "spilled job must not carry inline code");
    engine.process(job).await;

    match engine.cache.read(sid) {
      Some(Verdict::Done { passed, result, cases }) => {
        assert!(passed);
        assert_eq!(result, CaseStatus::Accepted);
        assert_eq!(cases.len(), 2);
      }
      other => panic!("expected Done, got {other:?}"),
    }
  }

  /// S6: when `<checker_name>.bin` is already cached on disk, the checker is
  /// uploaded via `load_checker_blob` and never compiled from source (§4.A,
  /// §4.F, §8 property 6's sandbox-call-count variant).
  #[tokio::test]
  async fn uses_cached_checker_blob_instead_of_compiling() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    setup_two_case_problem(root);
    fs::write(root.join("A/chk.cc.bin"), b"compiled checker bytes").unwrap();

    let run_count = Arc::new(Mutex::new(0usize));
    let counted = Arc::clone(&run_count);
    let transport = Arc::new(FakeTransport::new(move |cmd| {
      *counted.lock().unwrap() += 1;
      if cmd.copy_in.contains_key("chk.cc") {
        panic!("checker source must not be compiled when a cached blob exists");
      } else if cmd.args.first().map(String::as_str) == Some("/bin/true") {
        sandbox_ok(0, &[], &[("main.py", "prog1")])
      } else if cmd.args == vec!["/usr/bin/python3".to_string(), "main.py".to_string()] {
        let stdin = content_of(&cmd.files[0]);
        sandbox_ok(0, &[("stdout", stdin.as_str())], &[])
      } else {
        let out = content_of(cmd.copy_in.get("out.txt").unwrap());
        let ans = content_of(cmd.copy_in.get("ans.txt").unwrap());
        sandbox_ok(if out == ans { 0 } else { 1 }, &[("stdout", "ok")], &[])
      }
    }));

    let engine = make_engine_with_transport(root, Arc::clone(&transport));
    let (_, verdict) = run_one(&engine, "A", "py", "print(input())").await;

    match verdict {
      Verdict::Done { passed, cases, .. } => {
        assert!(passed);
        assert_eq!(cases.len(), 2);
      }
      other => panic!("expected Done, got {other:?}"),
    }
    // program cache_inline + 2 cases * (run + check) = 5 `POST /run` calls;
    // the checker blob itself goes through `upload_file` (`POST /file`), not `run`.
    assert_eq!(*run_count.lock().unwrap(), 5);
    assert_eq!(
      transport.uploaded.lock().unwrap().as_slice(),
      [b"compiled checker bytes".to_vec()]
    );
  }

  /// Interactive problems dispatch player and interactor together via the
  /// sandbox's pipe mapping rather than running a separate checker pass.
  #[tokio::test]
  async fn interactive_problem_uses_piped_dispatch() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
      root,
      "B/config.yaml",
      "type: interactive\ninteractor: chk.cc\nsubtasks:\n  - n_cases: 1\n",
    );
    write(root, "B/chk.cc", "interactor source");
    write(root, "B/testdata/1.in", "a\n");
    write(root, "B/testdata/1.ans", "a\n");

    let transport = FakeTransport::new(move |cmd| {
      if cmd.args.first().map(String::as_str) == Some("/bin/true") {
        sandbox_ok(0, &[], &[("main.py", "prog1")])
      } else if cmd.copy_in.contains_key("chk.cc") {
        // taken twice: once for resolve_checker's default "chk.cc", once
        // for resolve_interactor's "chk.cc" interactor source.
        sandbox_ok(0, &[], &[("chk", "chk1")])
      } else {
        // run_piped: player and interactor commands, both accepted.
        sandbox_ok(0, &[("stdout", "ok")], &[])
      }
    });

    let engine = make_engine(root, transport);
    let (_, verdict) = run_one(&engine, "B", "py", "print(input())").await;

    match verdict {
      Verdict::Done { passed, cases, .. } => {
        assert!(passed);
        assert_eq!(cases.len(), 1);
      }
      other => panic!("expected Done, got {other:?}"),
    }
  }
}
