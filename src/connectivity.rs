//! Connectivity signal abstraction.
//!
//! The cache layer consults a probe before deciding whether a GET may hit
//! the network and whether a failed mutation should be queued for replay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Source of the current online/offline signal.
pub trait ConnectivityProbe: Send + Sync {
  fn is_online(&self) -> bool;
}

/// Probe that always reports online.
///
/// With this probe the real connectivity signal is request failure: GETs
/// fall back to cache and mutations queue when the transport errors out.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeOnline;

impl ConnectivityProbe for AssumeOnline {
  fn is_online(&self) -> bool {
    true
  }
}

/// Probe backed by a shared flag.
///
/// Used by the CLI `--offline` flag and by tests; clones share the flag.
#[derive(Debug, Clone)]
pub struct ManualProbe {
  online: Arc<AtomicBool>,
}

impl ManualProbe {
  pub fn new(online: bool) -> Self {
    Self {
      online: Arc::new(AtomicBool::new(online)),
    }
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }
}

impl ConnectivityProbe for ManualProbe {
  fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_manual_probe_is_shared_across_clones() {
    let probe = ManualProbe::new(true);
    let clone = probe.clone();

    assert!(clone.is_online());
    probe.set_online(false);
    assert!(!clone.is_online());
  }
}
