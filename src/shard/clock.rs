//! Timestamp helpers
//!
//! Stored timestamps are UTC RFC 3339 with millisecond precision and a `Z`
//! suffix (`2025-01-31T09:15:02.123Z`). The fixed width makes string order
//! equal chronological order, which the query and retention paths rely on.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Date key format used by the daily counters
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format an instant in the canonical stored form
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current instant in the canonical stored form
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Date key for an instant
pub fn date_key(at: DateTime<Utc>) -> String {
    at.format(DATE_FORMAT).to_string()
}

/// Today's date key (UTC)
pub fn today() -> String {
    date_key(Utc::now())
}

/// Parse an RFC 3339 timestamp (any offset or precision) or a bare
/// `YYYY-MM-DD` date, interpreted as midnight UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Rewrite a timestamp into the canonical stored form, if it parses
pub fn normalize_timestamp(value: &str) -> Option<String> {
    parse_timestamp(value).map(format_timestamp)
}

/// Validate a `YYYY-MM-DD` date key
pub fn parse_date_key(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}
