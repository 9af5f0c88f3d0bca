//! Time utilities.
//!
//! All timestamps in this crate are `i64` milliseconds since the Unix epoch,
//! in UTC.

use chrono::{DateTime, Utc};

/// Returns the current time in milliseconds since the Unix epoch.
#[inline]
#[must_use]
pub fn milliseconds() -> i64 {
    Utc::now().timestamp_millis()
}

/// Returns the current time in seconds since the Unix epoch.
#[inline]
#[must_use]
pub fn seconds() -> i64 {
    Utc::now().timestamp()
}

/// Formats a millisecond timestamp as an ISO 8601 string.
///
/// Returns `None` for timestamps outside the representable range.
#[must_use]
pub fn iso8601(timestamp: i64) -> Option<String> {
    let secs = timestamp.div_euclid(1000);
    let nsecs = (timestamp.rem_euclid(1000) * 1_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nsecs)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// Rounds a millisecond timestamp down to the start of its interval bucket.
#[inline]
#[must_use]
pub fn interval_start(timestamp: i64, interval_ms: i64) -> i64 {
    timestamp - timestamp.rem_euclid(interval_ms)
}
