//! # Time
//!
//! Unix-epoch timestamps (seconds) and the clock abstraction. Every component
//! that reasons about the rolling 24 h quota window, day-aligned exposure
//! dates, or cache expiry goes through [`Clock`] so tests can pin time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// One day, in seconds.
pub const SECONDS_PER_DAY: Timestamp = 86_400;

/// One minute, in seconds.
pub const SECONDS_PER_MINUTE: Timestamp = 60;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in seconds.
    fn now(&self) -> Timestamp;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Test clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Jump to an absolute timestamp.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by `seconds`.
    pub fn advance(&self, seconds: Timestamp) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Truncate a timestamp to 00:00 UTC of its day.
pub fn start_of_day(timestamp: Timestamp) -> Timestamp {
    timestamp - timestamp % SECONDS_PER_DAY
}

/// Whole calendar days between two timestamps (0 if `later` precedes
/// `earlier`). Both are day-aligned before subtracting, so an exposure late
/// on Monday is one day old any time on Tuesday.
pub fn days_between(earlier: Timestamp, later: Timestamp) -> u64 {
    start_of_day(later).saturating_sub(start_of_day(earlier)) / SECONDS_PER_DAY
}
