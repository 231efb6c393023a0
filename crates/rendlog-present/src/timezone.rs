//! Fixed hour offsets for displaying the table's UTC timestamps.
//!
//! Timestamps are stored naive and mean UTC. Labels apply a user-chosen
//! whole-hour offset and never consult the machine's local zone.

use std::fmt;

use chrono::Duration;
use rendlog_core::NaiveDateTime;

/// Signed whole-hour offset from UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UtcOffset(i8);

impl UtcOffset {
    pub const UTC: UtcOffset = UtcOffset(0);
    pub const MIN_HOURS: i8 = -12;
    pub const MAX_HOURS: i8 = 14;

    /// Offset of `hours`, `None` outside `-12..=14`.
    pub fn new(hours: i8) -> Option<Self> {
        (Self::MIN_HOURS..=Self::MAX_HOURS)
            .contains(&hours)
            .then_some(Self(hours))
    }

    pub fn hours(&self) -> i8 {
        self.0
    }

    /// The offsets offered in the settings picker, `UTC-8` to `UTC+8`.
    pub fn options() -> Vec<UtcOffset> {
        (-8..=8).map(UtcOffset).collect()
    }

    /// Parse `-5`, `+3`, `UTC-5` or `utc+3`. Anything else is UTC.
    pub fn parse_lenient(input: &str) -> Self {
        let trimmed = input.trim();
        let digits = trimmed
            .get(..3)
            .filter(|prefix| prefix.eq_ignore_ascii_case("utc"))
            .map_or(trimmed, |_| &trimmed[3..]);
        digits
            .trim()
            .parse::<i8>()
            .ok()
            .and_then(Self::new)
            .unwrap_or(Self::UTC)
    }

    /// Shift a UTC timestamp into this offset.
    pub fn apply(&self, utc: NaiveDateTime) -> NaiveDateTime {
        utc.checked_add_signed(Duration::hours(i64::from(self.0)))
            .unwrap_or(utc)
    }
}

impl fmt::Display for UtcOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "UTC{}", self.0)
        } else {
            write!(f, "UTC+{}", self.0)
        }
    }
}

/// Which parts of a timestamp a label shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeFormat {
    /// Prefix with `YYYY-MM-DD `.
    pub include_date: bool,
    /// Suffix with `:SS`.
    pub include_seconds: bool,
}

impl TimeFormat {
    pub const FULL: TimeFormat = TimeFormat {
        include_date: true,
        include_seconds: true,
    };

    fn pattern(&self) -> &'static str {
        match (self.include_date, self.include_seconds) {
            (false, false) => "%H:%M",
            (false, true) => "%H:%M:%S",
            (true, false) => "%Y-%m-%d %H:%M",
            (true, true) => "%Y-%m-%d %H:%M:%S",
        }
    }
}

/// Label for a UTC timestamp under `offset`; `--` when missing.
pub fn format_time(timestamp: Option<NaiveDateTime>, offset: UtcOffset, format: TimeFormat) -> String {
    match timestamp {
        Some(ts) => offset.apply(ts).format(format.pattern()).to_string(),
        None => "--".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendlog_core::parse_naive_timestamp;

    #[test]
    fn test_negative_offset_with_date() {
        let ts = parse_naive_timestamp("2024-03-01T10:00:00");
        let format = TimeFormat {
            include_date: true,
            include_seconds: false,
        };
        assert_eq!(
            format_time(ts, UtcOffset::new(-5).unwrap(), format),
            "2024-03-01 05:00"
        );
    }

    #[test]
    fn test_offset_crosses_midnight() {
        let ts = parse_naive_timestamp("2024-03-01T22:30:15");
        assert_eq!(
            format_time(ts, UtcOffset::new(3).unwrap(), TimeFormat::FULL),
            "2024-03-02 01:30:15"
        );
        assert_eq!(
            format_time(ts, UtcOffset::UTC, TimeFormat::default()),
            "22:30"
        );
    }

    #[test]
    fn test_missing_timestamp() {
        assert_eq!(format_time(None, UtcOffset::UTC, TimeFormat::FULL), "--");
    }

    #[test]
    fn test_range() {
        assert!(UtcOffset::new(-12).is_some());
        assert!(UtcOffset::new(14).is_some());
        assert!(UtcOffset::new(-13).is_none());
        assert!(UtcOffset::new(15).is_none());
    }

    #[test]
    fn test_options() {
        let options = UtcOffset::options();
        assert_eq!(options.len(), 17);
        assert_eq!(options[0].to_string(), "UTC-8");
        assert_eq!(options[8].to_string(), "UTC+0");
        assert_eq!(options[16].to_string(), "UTC+8");
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(UtcOffset::parse_lenient("-5").hours(), -5);
        assert_eq!(UtcOffset::parse_lenient("+3").hours(), 3);
        assert_eq!(UtcOffset::parse_lenient("UTC-6").hours(), -6);
        assert_eq!(UtcOffset::parse_lenient(" utc+1 ").hours(), 1);
        assert_eq!(UtcOffset::parse_lenient("abc"), UtcOffset::UTC);
        assert_eq!(UtcOffset::parse_lenient("99"), UtcOffset::UTC);
        assert_eq!(UtcOffset::parse_lenient(""), UtcOffset::UTC);
    }
}
