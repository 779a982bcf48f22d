// src/utils/time.rs

//! Timestamp parsing for catalog feeds.
//!
//! Feeds mix RFC 3339 timestamps with zone-less ones. Zone-less values are
//! read as UTC, and empty or `null` values deserialize to the
//! [`UNSET`] sentinel so callers can fill them in.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Sentinel for a timestamp the feed did not provide.
pub const UNSET: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a timestamp, normalizing it to UTC.
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Deserialize a required timestamp; missing values become [`UNSET`].
pub fn lenient_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_utc_opt(deserializer)?.unwrap_or(UNSET))
}

/// Deserialize an optional timestamp.
pub fn lenient_utc_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_utc(s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{s}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let parsed = parse_utc("2024-03-01T12:00:00+03:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_zoneless_as_utc() {
        let parsed = parse_utc("2024-03-01T12:00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_utc("yesterday").is_none());
    }
}
