//! Timestamps.
//!
//! Every `created_at`/`updated_at` column, event and presence `lastSeen` uses
//! RFC 3339 UTC with microsecond precision, so text ordering matches time
//! ordering.

use chrono::{DateTime, SecondsFormat, Utc};

/// A UTC instant.
pub type Timestamp = DateTime<Utc>;

/// The current time formatted for storage.
#[must_use]
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Format an instant for storage.
#[must_use]
pub fn format_timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
