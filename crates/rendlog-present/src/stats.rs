//! Headline figures for the newest row.

use std::fmt;

use rendlog_core::{Row, Timeframe};

use crate::series::{RendlogPoint, Signal};
use crate::timezone::{format_time, TimeFormat, UtcOffset};

/// Text shown in the stats panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSummary {
    pub timeframe: String,
    pub last_update: String,
    pub z_score: String,
    pub signal: String,
    pub connection: String,
}

impl StatsSummary {
    pub fn build(
        latest: Option<&Row>,
        connected: bool,
        timeframe: Option<Timeframe>,
        offset: UtcOffset,
    ) -> Self {
        let rendlog = latest
            .and_then(|row| row.section("rendlog"))
            .map(RendlogPoint::from_value)
            .unwrap_or_default();

        Self {
            timeframe: timeframe.map_or_else(|| "--".to_string(), |tf| tf.label().to_string()),
            last_update: format_time(latest.and_then(|row| row.timestamp), offset, TimeFormat::FULL),
            z_score: rendlog
                .z_score
                .map_or_else(|| "--".to_string(), |z| format!("{z:.4}")),
            signal: rendlog
                .signal
                .map_or("no signal", |s: Signal| s.label())
                .to_string(),
            connection: if connected { "connected" } else { "disconnected" }.to_string(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | z {} | {} | {}",
            self.timeframe, self.last_update, self.z_score, self.signal, self.connection
        )
    }
}
