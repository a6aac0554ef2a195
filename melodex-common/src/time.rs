//! Timestamp helpers shared across the catalog and session models.

use chrono::{DateTime, Utc};

/// Current UTC time, truncated to whole seconds (SQLite storage precision).
pub fn now_truncated() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}
