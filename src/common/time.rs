//! Canonical timestamps.
//!
//! Every timestamp that reaches the store or the checkpoint is rendered as
//! RFC 3339 UTC with microsecond precision and a `Z` suffix. The fixed width
//! makes lexicographic order equal chronological order.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

pub const EPOCH: &str = "1970-01-01T00:00:00.000000Z";

pub fn format(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now() -> String {
    format(&Utc::now())
}

/// Accepts RFC 3339 with any offset, or a naive ISO-8601 datetime taken as UTC.
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn normalize(raw: &str) -> Option<String> {
    parse(raw).map(|dt| format(&dt))
}

/// `HH:MM` for history display; unparseable input is shown as-is.
pub fn short_time(raw: &str) -> String {
    match parse(raw) {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_offsets_and_naive_values() {
        assert_eq!(
            normalize("2024-03-01T12:30:00.5+02:00").as_deref(),
            Some("2024-03-01T10:30:00.500000Z")
        );
        assert_eq!(normalize("1970-01-01T00:00:00").as_deref(), Some(EPOCH));
        assert_eq!(normalize("yesterday"), None);
    }

    #[test]
    fn canonical_strings_sort_chronologically() {
        let earlier = normalize("2024-01-01T09:59:59.999999Z").unwrap();
        let later = normalize("2024-01-01T10:00:00Z").unwrap();
        assert!(earlier < later);
        assert_eq!(earlier.len(), later.len());
    }

    #[test]
    fn short_time_falls_back_to_raw_text() {
        assert_eq!(short_time("2024-01-01T08:05:00Z"), "08:05");
        assert_eq!(short_time("garbage"), "garbage");
    }
}
