//! Deterministic clock abstraction and timestamp helpers.
//!
//! Every signature input is rendered with [`iso8601z`] and every touched
//! timestamp is carried as Unix seconds, so the conversions live next to
//! the clock that produces them.

use chrono::{DateTime, TimeZone, Utc};

/// Timestamp format used in signature inputs: second precision, literal `Z`.
pub const ISO8601Z_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Clock trait for deterministic time in tests.
pub trait Clock: Send + Sync {
    /// Get the current UTC time.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// System clock using actual wall time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Format a UTC timestamp as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn iso8601z(dt: &DateTime<Utc>) -> String {
    dt.format(ISO8601Z_FORMAT).to_string()
}

/// Seconds since the Unix epoch, clamped at zero.
pub fn to_unix_seconds(dt: &DateTime<Utc>) -> u64 {
    dt.timestamp().max(0) as u64
}

/// Convert Unix seconds back to a UTC timestamp.
///
/// Values beyond chrono's range collapse to the epoch.
pub fn from_unix_seconds(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Whole minutes elapsed between `then` and `now`, truncated toward zero.
pub fn minutes_since(then: &DateTime<Utc>, now: &DateTime<Utc>) -> i64 {
    (*now - *then).num_minutes()
}

/// Mock clock for deterministic testing.
///
/// Interior mutability lets a clock shared behind an `Arc` be advanced
/// mid-test.
#[cfg(any(test, feature = "test-seams"))]
#[derive(Debug)]
pub struct MockClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(any(test, feature = "test-seams"))]
impl MockClock {
    /// Create a mock clock frozen at the given time.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
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
        let mut now = self.now.lock().expect("mock clock poisoned");
        *now += duration;
    }
}

#[cfg(any(test, feature = "test-seams"))]
impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("mock clock poisoned")
    }
}
