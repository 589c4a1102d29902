//! Timestamp parsing and display helpers.
//!
//! # Invariants
//! - Stored timestamps stay strings; parsing never rewrites them.
//! - Naive (zone-less) values are interpreted as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a stored timestamp string.
///
/// Returns `None` for blank or unrecognised values.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}

/// Sort key for feed ordering. Unparseable values collapse to the epoch.
pub fn ordering_key(value: &str) -> DateTime<Utc> {
    parse_timestamp(value).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Current time in the ISO form written to new records.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Renders a timestamp relative to `now` for compact display.
pub fn format_relative(value: &str, now: DateTime<Utc>) -> String {
    let Some(at) = parse_timestamp(value) else {
        return "Just now".to_string();
    };

    let hours = (now - at).num_hours();
    if hours < 1 {
        return "Just now".to_string();
    }
    if hours < 24 {
        return format!("{hours} hour{} ago", plural(hours));
    }

    let days = hours / 24;
    if days < 7 {
        return format!("{days} day{} ago", plural(days));
    }

    at.format("%Y-%m-%d").to_string()
}

fn plural(count: i64) -> &'static str {
    if count > 1 {
        "s"
    } else {
        ""
    }
}
