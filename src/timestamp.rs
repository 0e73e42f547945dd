use chrono::{DateTime, TimeZone, Utc};

use crate::error::IndicatorError;

/// Parses the update time reported by the conversion source.
///
/// Accepts RFC 2822 (`Fri, 01 Mar 2024 00:02:31 +0000`), RFC 3339 and
/// plain unix seconds.
pub fn parse_upstream_timestamp(raw: &str) -> Result<DateTime<Utc>, IndicatorError> {
    let raw = raw.trim().trim_matches('"');

    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        return parse_unix_seconds(raw);
    }

    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|datetime| datetime.with_timezone(&Utc))
        .map_err(|_| IndicatorError::Parse(format!("timestamp {raw:?}")))
}

fn parse_unix_seconds(raw: &str) -> Result<DateTime<Utc>, IndicatorError> {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| IndicatorError::Parse(format!("timestamp {raw:?}")))
}
