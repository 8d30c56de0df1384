//! Time source for lease-expiry checks.
//!
//! Timestamps are microseconds since the UNIX epoch, matching the lease
//! timeouts stored on [`ShardStatus`](crate::ShardStatus).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time in microseconds since the UNIX epoch.
    fn now_us(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        // u64 microseconds cover ~584,942 years from the epoch.
        #[allow(clippy::cast_possible_truncation)]
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_micros() as u64)
    }
}

/// Manually driven clock for tests and simulation.
///
/// Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading `start_us`.
    #[must_use]
    pub fn new(start_us: u64) -> Self {
        Self {
            now_us: Arc::new(AtomicU64::new(start_us)),
        }
    }

    /// Sets the current reading.
    pub fn set_us(&self, now_us: u64) {
        self.now_us.store(now_us, Ordering::SeqCst);
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        #[allow(clippy::cast_possible_truncation)]
        let by_us = by.as_micros() as u64;
        self.now_us.fetch_add(by_us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}
