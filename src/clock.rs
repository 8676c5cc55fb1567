//! Deterministic clock abstraction for testable expiry checks.

use chrono::{DateTime, Utc};

/// Clock trait for deterministic time in tests.
pub trait Clock: Send + Sync {
    /// Get the current UTC time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current time as fractional Unix seconds, the unit license `until` fields use.
    fn unix_seconds(&self) -> f64 {
        let now = self.now_utc();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1e9
    }
}

/// System clock using actual wall time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for deterministic testing.
///
/// Shared behind an `Arc`, so advancing goes through a lock rather than `&mut self`.
#[cfg(any(test, feature = "test-seams"))]
#[derive(Debug)]
pub struct MockClock {
    now: std::sync::RwLock<DateTime<Utc>>,
}

#[cfg(any(test, feature = "test-seams"))]
impl MockClock {
    /// Create a mock clock frozen at the given time.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::RwLock::new(now),
        }
    }

    /// Create a mock clock frozen at a Unix timestamp (whole seconds).
    pub fn at_unix(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).expect("timestamp in range"))
    }

    /// Create a mock clock from an RFC 3339 string.
    pub fn from_rfc3339(s: &str) -> Self {
        Self::new(
            DateTime::parse_from_rfc3339(s)
                .expect("valid RFC 3339")
                .with_timezone(&Utc),
        )
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.write().expect("mock clock lock");
        *now = *now + duration;
    }
}

#[cfg(any(test, feature = "test-seams"))]
impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.read().expect("mock clock lock")
    }
}
