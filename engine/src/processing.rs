//! Mutual exclusion for favorites operations.
//!
//! A second operation arriving while one is in flight is rejected, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The single "an operation is in progress" flag shared by the store and the
/// sync engine.
#[derive(Debug, Default)]
pub struct ProcessingFlag {
    busy: AtomicBool,
}

impl ProcessingFlag {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the flag, or `None` if another operation holds it.
    pub fn try_begin(self: &Arc<Self>) -> Option<ProcessingGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProcessingGuard { flag: self.clone() })
    }

    pub fn is_processing(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of holding the flag. Releases it on drop.
#[derive(Debug)]
pub struct ProcessingGuard {
    flag: Arc<ProcessingFlag>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::Release);
    }
}
