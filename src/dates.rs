//! Date bounds for the cleanup window.
//!
//! Accepts ISO-8601 timestamps only. Anything unparseable means "no bound".

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parses a cleanup window bound. Empty or unparseable input yields `None`.
///
/// A trailing `Z` is read as `+00:00`; timestamps without an offset and plain
/// `YYYY-MM-DD` dates are taken as UTC.
pub fn parse_bound(input: &str) -> Option<DateTime<Utc>> {
    let raw = input.trim();
    if raw.is_empty() {
        return None;
    }
    let normalized = match raw.strip_suffix('Z').or_else(|| raw.strip_suffix('z')) {
        Some(stripped) => format!("{stripped}+00:00"),
        None => raw.to_string(),
    };
    // Python-style "2024-01-01 10:00:00" uses a space instead of `T`.
    let normalized = match normalized.char_indices().nth(10) {
        Some((index, ' ')) => format!("{}T{}", &normalized[..index], &normalized[index + 1..]),
        _ => normalized,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let date = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}
