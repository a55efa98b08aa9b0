use std::{collections::HashMap, sync::Mutex};

use crate::verdict::Verdict;

/// In-memory `sid -> Verdict` map shared between workers and readers (§4.D).
///
/// Terminal entries (`Done`/`Error`) are consumed on their first successful
/// read; `Queued` reads leave the entry in place.
pub struct VerdictCache {
  entries: Mutex<HashMap<u64, Verdict>>,
}

impl VerdictCache {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
    }
  }

  /// Overwrite the entry for `sid`, e.g. on a `Queued` -> `Done` transition.
  pub fn publish(&self, sid: u64, verdict: Verdict) {
    self.entries.lock().unwrap().insert(sid, verdict);
  }

  /// Consume-on-read for terminal verdicts; `Queued` is merely cloned out.
  pub fn read(&self, sid: u64) -> Option<Verdict> {
    let mut entries = self.entries.lock().unwrap();
    match entries.get(&sid) {
      Some(Verdict::Queued) => Some(Verdict::Queued),
      Some(_) => entries.remove(&sid),
      None => None,
    }
  }

  /// Wipe all entries (reset flow, §5).
  pub fn clear(&self) {
    self.entries.lock().unwrap().clear();
  }
}

impl Default for VerdictCache {
  fn default() -> Self {
    Self::new()
  }
}
