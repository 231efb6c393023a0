//! Timeframe enumeration used as the window filter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Aggregation interval the backend computes indicators for.
///
/// Labels match the values stored in the remote table's `timeframe` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Min1,  // 1 minute
    Min5,  // 5 minutes
    Min15, // 15 minutes
    Min30, // 30 minutes
    Hour1, // 1 hour
    Hour4, // 4 hours
}

impl Timeframe {
    /// Returns the duration of this timeframe in minutes.
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::Min1 => 1,
            Timeframe::Min5 => 5,
            Timeframe::Min15 => 15,
            Timeframe::Min30 => 30,
            Timeframe::Hour1 => 60,
            Timeframe::Hour4 => 240,
        }
    }

    /// Returns the label stored in the remote table.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1M",
            Timeframe::Min5 => "5M",
            Timeframe::Min15 => "15M",
            Timeframe::Min30 => "30M",
            Timeframe::Hour1 => "1H",
            Timeframe::Hour4 => "4H",
        }
    }

    /// Returns all selectable timeframes, finest first.
    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::Min1,
            Timeframe::Min5,
            Timeframe::Min15,
            Timeframe::Min30,
            Timeframe::Hour1,
            Timeframe::Hour4,
        ]
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::Min1
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Returned when a label does not name a known timeframe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeframeError(pub String);

impl fmt::Display for ParseTimeframeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown timeframe '{}'", self.0)
    }
}

impl std::error::Error for ParseTimeframeError {}

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Timeframe::all()
            .iter()
            .copied()
            .find(|tf| tf.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseTimeframeError(s.to_string()))
    }
}

impl Serialize for Timeframe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}
