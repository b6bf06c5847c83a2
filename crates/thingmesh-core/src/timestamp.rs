//! Band timestamps.
//!
//! Every state band carries one timestamp; an update is only applied when
//! its timestamp is strictly newer than the band's.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Timestamp type used throughout the engine.
pub type Timestamp = DateTime<Utc>;

/// Current time.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Canonical ISO-8601 rendering: `YYYY-MM-DDTHH:MM:SS.sssZ`.
pub fn to_iso(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp permissively.
///
/// Accepts RFC 3339, RFC 2822, a bare date, and date-times without an
/// offset (taken as UTC) separated by `T` or a space.
pub fn parse(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Whether `incoming` may replace `current`. Ties are rejected.
pub fn is_newer(current: Option<&Timestamp>, incoming: &Timestamp) -> bool {
    match current {
        Some(current) => incoming > current,
        None => true,
    }
}

/// A fresh timestamp guaranteed to be newer than `current`.
///
/// Uses the wall clock, nudged one microsecond past `current` when the
/// clock has not moved on.
pub fn advance(current: Option<&Timestamp>) -> Timestamp {
    let now = now();
    match current {
        Some(current) if now <= *current => *current + chrono::Duration::microseconds(1),
        _ => now,
    }
}
