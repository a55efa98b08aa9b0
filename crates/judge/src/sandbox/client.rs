use std::{collections::HashMap, path::Path, sync::Arc};

use log::debug;

use super::{proto, transport::Transport};
use crate::error::{PipelineError, SandboxError};

/// Everything a compiled player program needs at run time.
#[derive(Debug, Clone)]
pub struct PreparedProgram {
  pub run_args: Vec<String>,
  /// Files every per-case run must `copy_in` (e.g. the compiled executable).
  pub copy_in_bindings: HashMap<String, proto::File>,
  /// Sandbox artifact ids to release once the submission is done.
  pub cleanup_ids: Vec<String>,
}

/// A compiled checker or interactor, ready to be referenced as `chk`.
#[derive(Debug, Clone)]
pub struct CheckerPrepared {
  pub checker_id: String,
  pub cleanup_ids: Vec<String>,
}

/// Typed wrapper over the sandbox's compile/run/file-cache RPC (§4.A).
pub struct Client {
  transport: Arc<dyn Transport>,
}

impl Client {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self { transport }
  }

  /// Issue a single-command execution.
  pub async fn run(&self, cmd: proto::Cmd) -> Result<proto::RunResult, SandboxError> {
    let args = cmd.args.clone();
    let req = proto::RunRequest {
      cmd: vec![cmd],
      pipe_mapping: vec![],
    };
    let mut results = self.transport.run(req).await?;
    let result = results
      .pop()
      .ok_or_else(|| SandboxError::Transport("sandbox returned no results".to_string()))?;
    debug!("sandbox run {args:?} -> {:?}", result.status);
    Ok(result)
  }

  /// Issue two piped commands connected via `pipe_mapping` (interactive mode, §4.E).
  pub async fn run_piped(
    &self,
    cmds: [proto::Cmd; 2],
    pipe_mapping: Vec<proto::PipeMap>,
  ) -> Result<[proto::RunResult; 2], SandboxError> {
    let req = proto::RunRequest {
      cmd: cmds.into(),
      pipe_mapping,
    };
    let results = self.transport.run(req).await?;
    let [a, b]: [proto::RunResult; 2] = results
      .try_into()
      .map_err(|_| SandboxError::Transport("sandbox returned wrong result count".to_string()))?;
    Ok([a, b])
  }

  /// Release a cached artifact. Errors are swallowed and logged (§7).
  pub async fn delete_file(&self, file_id: &str) {
    if let Err(e) = self.transport.delete_file(file_id).await {
      debug!("delete_file({file_id}) failed: {e}");
    }
  }

  /// Cache a piece of content as a sandbox artifact via a trivial run.
  pub async fn cache_inline(
    &self,
    name: &str,
    content: &[u8],
  ) -> Result<String, PipelineError> {
    let cmd = proto::Cmd {
      args: vec!["/bin/true".to_string()],
      copy_in: [(name.to_string(), proto::File::memory(String::from_utf8_lossy(content)))].into(),
      copy_out_cached: vec![name.to_string()],
      ..Default::default()
    };
    let res = self.run(cmd).await?;
    if res.status != proto::Status::Accepted {
      return Err(PipelineError::InternalError {
        message: format!("cache_inline for {name} was not accepted: {:?}", res.status),
      });
    }
    res
      .file_ids
      .get(name)
      .cloned()
      .ok_or_else(|| PipelineError::InternalError {
        message: format!("cache_inline for {name} produced no file id"),
      })
  }

  /// Multipart-upload raw bytes into the sandbox's file cache (§6.2 `POST
  /// /file`), returning the assigned artifact id.
  pub async fn upload_file(&self, content: Vec<u8>) -> Result<String, PipelineError> {
    self
      .transport
      .upload_file(content)
      .await
      .map_err(PipelineError::from)
  }

  /// Upload an already-compiled binary file from the local filesystem.
  pub async fn load_checker_blob(&self, path: &Path) -> Result<CheckerPrepared, PipelineError> {
    let content = std::fs::read(path).map_err(PipelineError::Io)?;
    let checker_id = self.upload_file(content).await?;
    Ok(CheckerPrepared {
      checker_id,
      cleanup_ids: vec![],
    })
  }

  /// Compile a checker/interactor from testlib source.
  pub async fn prepare_checker(
    &self,
    source_text: &[u8],
    testlib_include_path: &str,
  ) -> Result<CheckerPrepared, PipelineError> {
    let cmd = proto::Cmd {
      args: vec![
        "/usr/bin/g++".to_string(),
        "-O2".to_string(),
        "-pipe".to_string(),
        "-std=gnu++17".to_string(),
        "-I".to_string(),
        testlib_include_path.to_string(),
        "chk.cc".to_string(),
        "-o".to_string(),
        "chk".to_string(),
      ],
      copy_in: [(
        "chk.cc".to_string(),
        proto::File::memory(String::from_utf8_lossy(source_text)),
      )]
      .into(),
      copy_out: vec!["stderr".to_string()],
      copy_out_cached: vec!["chk".to_string()],
      cpu_limit: 10_000_000_000,
      clock_limit: 20_000_000_000,
      memory_limit: 512 * 1024 * 1024,
      proc_limit: 50,
      ..Default::default()
    };

    let res = self.run(cmd).await?;
    if res.status != proto::Status::Accepted {
      return Err(PipelineError::Compile {
        message: res
          .files
          .get("stderr")
          .cloned()
          .unwrap_or_else(|| format!("{:?}", res.status)),
      });
    }
    let checker_id = res
      .file_ids
      .get("chk")
      .cloned()
      .ok_or_else(|| PipelineError::Compile {
        message: "checker compile produced no executable".to_string(),
      })?;
    Ok(CheckerPrepared {
      checker_id,
      cleanup_ids: vec![],
    })
  }

  /// Prepare a player program per its language's compile/cache rules (§4.A).
  pub async fn prepare_program(
    &self,
    language: &str,
    source_text: &[u8],
    main_name: Option<&str>,
  ) -> Result<PreparedProgram, PipelineError> {
    match language {
      "cpp" => self.prepare_cpp(source_text, main_name.unwrap_or("main.cpp")).await,
      "java" => self.prepare_java(source_text, main_name.unwrap_or("Main.java")).await,
      "py" | "python" | "python3" => {
        self.prepare_interpreted(source_text, "main.py", "/usr/bin/python3").await
      }
      "pypy" => self.prepare_interpreted(source_text, "main.py", "/usr/bin/pypy3").await,
      other => Err(PipelineError::Compile {
        message: format!("unsupported language: {other}"),
      }),
    }
  }

  async fn prepare_cpp(
    &self,
    source_text: &[u8],
    main_name: &str,
  ) -> Result<PreparedProgram, PipelineError> {
    let cmd = proto::Cmd {
      args: vec![
        "/usr/bin/g++".to_string(),
        "-O2".to_string(),
        "-pipe".to_string(),
        "-std=gnu++17".to_string(),
        main_name.to_string(),
        "-o".to_string(),
        "a".to_string(),
      ],
      copy_in: [(
        main_name.to_string(),
        proto::File::memory(String::from_utf8_lossy(source_text)),
      )]
      .into(),
      copy_out: vec!["stderr".to_string()],
      copy_out_cached: vec!["a".to_string()],
      cpu_limit: 10_000_000_000,
      clock_limit: 20_000_000_000,
      memory_limit: 512 * 1024 * 1024,
      proc_limit: 50,
      ..Default::default()
    };

    let res = self.run(cmd).await?;
    if res.status != proto::Status::Accepted {
      return Err(PipelineError::Compile {
        message: res.files.get("stderr").cloned().unwrap_or_default(),
      });
    }
    let exec_id = res
      .file_ids
      .get("a")
      .cloned()
      .ok_or_else(|| PipelineError::Compile {
        message: "compile produced no executable".to_string(),
      })?;

    Ok(PreparedProgram {
      run_args: vec!["a".to_string()],
      copy_in_bindings: [("a".to_string(), proto::File::cached(exec_id.clone()))].into(),
      cleanup_ids: vec![exec_id],
    })
  }

  async fn prepare_java(
    &self,
    source_text: &[u8],
    main_name: &str,
  ) -> Result<PreparedProgram, PipelineError> {
    let main_class = main_name
      .strip_suffix(".java")
      .unwrap_or(main_name)
      .to_string();
    let class_file = format!("{main_class}.class");

    let cmd = proto::Cmd {
      args: vec!["/usr/bin/javac".to_string(), main_name.to_string()],
      copy_in: [(
        main_name.to_string(),
        proto::File::memory(String::from_utf8_lossy(source_text)),
      )]
      .into(),
      copy_out: vec!["stderr".to_string()],
      copy_out_cached: vec![class_file.clone()],
      cpu_limit: 10_000_000_000,
      clock_limit: 20_000_000_000,
      memory_limit: 1024 * 1024 * 1024,
      proc_limit: 50,
      ..Default::default()
    };

    let res = self.run(cmd).await?;
    if res.status != proto::Status::Accepted {
      return Err(PipelineError::Compile {
        message: res.files.get("stderr").cloned().unwrap_or_default(),
      });
    }
    let class_id = res
      .file_ids
      .get(&class_file)
      .cloned()
      .ok_or_else(|| PipelineError::Compile {
        message: "javac produced no class file".to_string(),
      })?;

    Ok(PreparedProgram {
      run_args: vec!["/usr/bin/java".to_string(), main_class],
      copy_in_bindings: [(class_file, proto::File::cached(class_id.clone()))].into(),
      cleanup_ids: vec![class_id],
    })
  }

  async fn prepare_interpreted(
    &self,
    source_text: &[u8],
    source_name: &str,
    interpreter: &str,
  ) -> Result<PreparedProgram, PipelineError> {
    let source_id = self.cache_inline(source_name, source_text).await?;
    Ok(PreparedProgram {
      run_args: vec![interpreter.to_string(), source_name.to_string()],
      copy_in_bindings: [(source_name.to_string(), proto::File::cached(source_id.clone()))].into(),
      cleanup_ids: vec![source_id],
    })
  }
}
