use chrono::{DateTime, Utc};

pub mod one_time_token;
pub mod user;

pub use user::{NewUser, User};

/// Timestamps are stored as RFC3339 strings. A row that fails to parse is
/// treated as having no timestamp rather than poisoning the request.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}
