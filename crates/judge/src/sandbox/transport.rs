use std::time::Duration;

use async_trait::async_trait;
use log::info;

use super::proto;
use crate::error::SandboxError;

/// Transport to the remote sandbox's `POST /run` / `POST /file` / `DELETE
/// /file/<id>` RPC (§4.A, §6.2). Abstracted behind a trait so the engine can
/// be exercised against an in-process fake without a live sandbox.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn run(&self, req: proto::RunRequest) -> Result<Vec<proto::RunResult>, SandboxError>;

  /// Multipart-upload a file's raw bytes, returning the cache artifact id
  /// the sandbox assigns it (§6.2 `POST /file`). Used to push an
  /// already-compiled checker/interactor blob straight into the file cache,
  /// as opposed to `cache_inline`'s no-op-run trick for inline source text.
  async fn upload_file(&self, content: Vec<u8>) -> Result<String, SandboxError>;

  /// Release a cached artifact. Errors are swallowed by callers (§7).
  async fn delete_file(&self, file_id: &str) -> Result<(), SandboxError>;
}

/// go-judge wire-compatible REST transport.
pub struct HttpTransport {
  http: reqwest::Client,
  base_url: String,
}

impl HttpTransport {
  pub fn new(base_url: impl Into<String>) -> Self {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(5 * 60))
      .build()
      .expect("failed to build sandbox http client");
    let base_url = base_url.into();
    info!("sandbox client targeting {base_url}");
    Self { http, base_url }
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn run(&self, req: proto::RunRequest) -> Result<Vec<proto::RunResult>, SandboxError> {
    let resp = self
      .http
      .post(format!("{}/run", self.base_url))
      .json(&req)
      .send()
      .await
      .map_err(|e| SandboxError::Transport(e.to_string()))?;

    let resp = resp
      .error_for_status()
      .map_err(|e| SandboxError::Transport(e.to_string()))?;

    resp
      .json::<Vec<proto::RunResult>>()
      .await
      .map_err(|e| SandboxError::Transport(e.to_string()))
  }

  async fn upload_file(&self, content: Vec<u8>) -> Result<String, SandboxError> {
    let form = reqwest::multipart::Form::new().part(
      "file",
      reqwest::multipart::Part::bytes(content).file_name("blob"),
    );
    let resp = self
      .http
      .post(format!("{}/file", self.base_url))
      .multipart(form)
      .send()
      .await
      .map_err(|e| SandboxError::Transport(e.to_string()))?;

    let resp = resp
      .error_for_status()
      .map_err(|e| SandboxError::Transport(e.to_string()))?;

    resp
      .text()
      .await
      .map_err(|e| SandboxError::Transport(e.to_string()))
  }

  async fn delete_file(&self, file_id: &str) -> Result<(), SandboxError> {
    let res = self
      .http
      .delete(format!("{}/file/{}", self.base_url, file_id))
      .send()
      .await;
    match res {
      Ok(r) if r.status().is_success() => Ok(()),
      Ok(r) => Err(SandboxError::Transport(format!(
        "delete_file returned {}",
        r.status()
      ))),
      Err(e) => Err(SandboxError::Transport(e.to_string())),
    }
  }
}
