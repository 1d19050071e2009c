//! Conversions between `chrono` timestamps and their stored form.
//!
//! Tables store instants as Unix milliseconds (`INTEGER`), which keeps
//! ordering and range queries exact within the same second.

use chrono::{DateTime, Utc};

/// Converts an instant to Unix milliseconds.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Converts Unix milliseconds back to an instant.
///
/// Values outside chrono's range clamp to the Unix epoch.
pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
