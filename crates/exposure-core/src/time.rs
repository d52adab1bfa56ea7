//! Millisecond-epoch time helpers.
//!
//! The core operates entirely on ms-epoch `i64` timestamps; wall-clock reads
//! are isolated here so tests can inject fixed values.

use std::time::{SystemTime, UNIX_EPOCH};

/// One day, in milliseconds.
pub const DAY_MS: i64 = 86_400_000;

/// Retention horizon, in days.
pub const RETENTION_DAYS: i64 = 180;

/// Retention horizon, in milliseconds.
pub const RETENTION_MS: i64 = RETENTION_DAYS * DAY_MS;

/// Current wall-clock time as ms-epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
