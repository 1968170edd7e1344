//! Timestamp parsing shared by connectors, ingestion and clustering.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Parse an ISO-8601 string into a UTC datetime.
///
/// Accepts a trailing `Z`, an explicit offset, or a naive timestamp
/// (assumed UTC). Returns `None` for anything unparseable — callers
/// decide whether that is a counter bump or a dropped record.
pub fn parse_iso_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Offset without the RFC 3339 'T' separator, e.g. "2026-01-06 00:03:43+01:00"
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    // Naive variants: assume UTC
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// Convert unix seconds into a UTC datetime. Rejects non-positive and
/// out-of-range values (some upstreams ship garbage epochs).
pub fn epoch_secs_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_zulu_suffix() {
        let dt = parse_iso_datetime("2026-01-06T00:03:43Z").unwrap();
        assert_eq!(dt.hour(), 0);
        assert_eq!(dt.to_rfc3339(), "2026-01-06T00:03:43+00:00");
    }

    #[test]
    fn parses_offset() {
        let dt = parse_iso_datetime("2026-01-06T02:03:43+02:00").unwrap();
        assert_eq!(dt.hour(), 0, "offset should be folded into UTC");
    }

    #[test]
    fn naive_assumed_utc() {
        let dt = parse_iso_datetime("2026-01-06T00:03:43.123").unwrap();
        assert_eq!(dt.hour(), 0);
        let dt = parse_iso_datetime("2026-01-06 00:03:43").unwrap();
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_iso_datetime("").is_none());
        assert!(parse_iso_datetime("yesterday").is_none());
        assert!(parse_iso_datetime("2026-13-40T99:00:00Z").is_none());
    }

    #[test]
    fn epoch_bounds() {
        assert!(epoch_secs_to_utc(0).is_none());
        assert!(epoch_secs_to_utc(-1).is_none());
        let dt = epoch_secs_to_utc(1_700_000_000).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }
}
