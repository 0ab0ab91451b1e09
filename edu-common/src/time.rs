//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as Unix epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Next stamp for a record whose previous stamp was `previous`
///
/// Never moves backwards, even if the wall clock does.
pub fn monotonic_stamp(previous: Option<i64>) -> i64 {
    let now = now_millis();
    match previous {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}
