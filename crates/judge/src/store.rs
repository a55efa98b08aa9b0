use std::{
  fs, io,
  path::{Path, PathBuf},
  sync::Mutex,
};

use serde::{Deserialize, Serialize};

/// Bucketed on-disk archive of submissions (§4.C, §6.3).
pub struct SubmissionStore {
  data_root: PathBuf,
  submissions_root: PathBuf,
  bucket_size: u64,
  counter_lock: Mutex<()>,
}

/// Directories a submission id resolves to.
#[derive(Debug, Clone)]
pub struct SubmissionPaths {
  pub bucket_dir: PathBuf,
  pub sub_dir: PathBuf,
}

/// `meta.json` contents written at intake (§4.E step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
  pub sid: u64,
  pub pid: String,
  pub language: String,
  pub timestamp_ms: u64,
}

impl SubmissionStore {
  pub fn new(
    data_root: impl Into<PathBuf>,
    submissions_root: impl Into<PathBuf>,
    bucket_size: u64,
  ) -> Self {
    Self {
      data_root: data_root.into(),
      submissions_root: submissions_root.into(),
      bucket_size: bucket_size.max(1),
      counter_lock: Mutex::new(()),
    }
  }

  fn counter_path(&self) -> PathBuf {
    self.data_root.join("counter.txt")
  }

  /// Atomic allocate-and-persist of the next monotonic submission id (§5).
  ///
  /// The counter file's contents are the last allocated `sid`; a missing or
  /// unparsable file is treated as `0`.
  pub fn next_id(&self) -> io::Result<u64> {
    let _guard = self.counter_lock.lock().unwrap();
    fs::create_dir_all(&self.data_root)?;
    let path = self.counter_path();
    let current = fs::read_to_string(&path)
      .ok()
      .and_then(|s| s.trim().parse::<u64>().ok())
      .unwrap_or(0);
    let next = current + 1;
    fs::write(&path, next.to_string())?;
    Ok(next)
  }

  /// `bucket = floor(sid / B) * B` (§3, §8 property 2).
  pub fn paths(&self, sid: u64) -> SubmissionPaths {
    let bucket = (sid / self.bucket_size) * self.bucket_size;
    let bucket_dir = self.submissions_root.join(bucket.to_string());
    let sub_dir = bucket_dir.join(sid.to_string());
    SubmissionPaths { bucket_dir, sub_dir }
  }

  /// Reset the counter to 0. Callers clear the submissions tree separately
  /// via [`Self::empty_tree`] (§5 reset protocol).
  pub fn reset(&self) -> io::Result<()> {
    let _guard = self.counter_lock.lock().unwrap();
    fs::create_dir_all(&self.data_root)?;
    fs::write(self.counter_path(), "0")
  }

  /// Recursively remove all children of `root` without removing `root` itself.
  pub fn empty_tree(&self, root: &Path) -> io::Result<()> {
    if !root.is_dir() {
      return Ok(());
    }
    for entry in fs::read_dir(root)? {
      let entry = entry?;
      let path = entry.path();
      if path.is_dir() {
        fs::remove_dir_all(&path)?;
      } else {
        fs::remove_file(&path)?;
      }
    }
    Ok(())
  }

  pub fn submissions_root(&self) -> &Path {
    &self.submissions_root
  }
}
