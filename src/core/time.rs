//! Sleep and clock abstraction.
//!
//! Retry loops never call `std::thread::sleep` directly. They go through a
//! [`Sleeper`] so the decision logic can be driven in tests without real
//! delays, and so the runtime can substitute a cancellable implementation.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between layout recovery attempts.
pub const DEFAULT_RECOVERY_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval between failure-detector polling rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Something that can block the current thread for a duration.
pub trait Sleeper: Send + Sync {
    /// Block for `duration`. Implementations must not return early with an error.
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the OS thread scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Sleeper that records requested durations and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create a new recording sleeper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Durations requested so far, in call order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }

    /// Number of sleeps requested so far.
    pub fn count(&self) -> usize {
        self.slept.lock().len()
    }

    /// Sum of all requested durations.
    pub fn total(&self) -> Duration {
        self.slept.lock().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}

/// A fixed backoff between retries, expressed in milliseconds for config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInterval {
    pub ms: u64,
}

impl RetryInterval {
    /// Create a retry interval from milliseconds.
    pub const fn from_ms(ms: u64) -> Self {
        Self { ms }
    }

    /// The interval as a [`Duration`].
    pub const fn as_duration(self) -> Duration {
        Duration::from_millis(self.ms)
    }
}

impl Default for RetryInterval {
    fn default() -> Self {
        Self::from_ms(DEFAULT_RECOVERY_RETRY_INTERVAL.as_millis() as u64)
    }
}

impl std::fmt::Display for RetryInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.ms)
    }
}
