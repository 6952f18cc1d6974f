//! Wall-clock time source for the engine.
//!
//! Every timestamp the engine writes (entity `lastUpdatedMillis`, pending
//! operation order, cache write time, undo retention) comes from a [`Clock`],
//! so tests can drive time explicitly with [`ManualClock`].

use crate::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// A source of milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Timestamp;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Timestamp {
        chrono::Utc::now().timestamp_millis().max(0) as Timestamp
    }
}

/// A clock that only moves when told to.
///
/// Readings never go backwards: [`ManualClock::set`] ignores earlier values.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicU64::new(start),
        }
    }

    /// Move the clock forward by `delta` milliseconds.
    pub fn advance(&self, delta: u64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    /// Jump to an absolute time, if it is later than the current reading.
    pub fn set(&self, millis: Timestamp) {
        self.millis.fetch_max(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Timestamp {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_starts_where_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
    }

    #[test]
    fn advance_moves_forward() {
        let clock = ManualClock::new(1_000);
        clock.advance(250);
        clock.advance(250);
        assert_eq!(clock.now_millis(), 1_500);
    }

    #[test]
    fn set_never_goes_backwards() {
        let clock = ManualClock::new(5_000);
        clock.set(4_000);
        assert_eq!(clock.now_millis(), 5_000);
        clock.set(6_000);
        assert_eq!(clock.now_millis(), 6_000);
    }

    #[test]
    fn system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
