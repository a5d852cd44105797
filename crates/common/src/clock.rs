//! Wall-clock source.
//!
//! Expiration is decided by comparing a stored timestamp with "now", so the
//! current time is injected rather than read ad hoc. Tests drive a
//! [`ManualClock`] across TTL boundaries without sleeping.

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Source of the current UTC time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time, truncated to whole seconds
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_to_seconds(Utc::now())
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(truncate_to_seconds(start))),
        }
    }

    /// Create a clock frozen at the given Unix timestamp
    pub fn at_unix(secs: i64) -> Self {
        let start = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH);
        Self::new(start)
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }

    /// Jump to an absolute time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write() = truncate_to_seconds(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// Drop sub-second precision; records are stored with second precision.
pub fn truncate_to_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(t.timestamp(), 0).single().unwrap_or(t)
}
