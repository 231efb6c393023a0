//! Lenient parsing of the timestamps stored in the remote table.
//!
//! The table stores naive timestamps (no zone suffix) that are UTC by
//! convention. Rows written through other paths may carry a `Z` or an
//! explicit offset; those are normalized to UTC and the offset dropped.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse a timestamp string into a naive UTC date-time.
///
/// Accepts:
/// - `2024-03-01T10:00:00` (optionally with fractional seconds)
/// - `2024-03-01 10:00:00`
/// - `2024-03-01T10:00:00Z` / `2024-03-01T10:00:00+02:00` (converted to UTC)
/// - `2024-03-01` (midnight)
///
/// Returns `None` for anything else.
pub fn parse_naive_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ts);
        }
    }

    // Zone-qualified forms, with either separator
    let normalized = s.replacen(' ', "T", 1);
    if let Ok(ts) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(ts.naive_utc());
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
