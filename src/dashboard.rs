//! Terminal rendering and input handling.

use std::fmt::Write as _;
use std::time::Duration;

use rendlog_config::{DisplayConfig, RemoteConfig, SyncConfig};
use rendlog_core::Timeframe;
use rendlog_present::{build_series, RenderOptions, StatsSummary, TimeFormat, UtcOffset};
use rendlog_remote::{ClientConfig, RealtimeConfig};
use rendlog_sync::{SyncOptions, SyncSnapshot};

/// Rows listed under the summary line.
const TAIL_ROWS: usize = 5;

pub const HELP: &str = "commands: 1M 5M 15M 30M 1H 4H (switch timeframe), help, quit";

/// A line typed on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Quit,
    Help,
    Switch(Timeframe),
    Empty,
    Unknown(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_ascii_lowercase().as_str() {
            "" => Input::Empty,
            "q" | "quit" | "exit" => Input::Quit,
            "h" | "help" | "?" => Input::Help,
            _ => match line.parse::<Timeframe>() {
                Ok(timeframe) => Input::Switch(timeframe),
                Err(_) => Input::Unknown(line.to_string()),
            },
        }
    }
}

pub fn client_config(remote: &RemoteConfig) -> ClientConfig {
    let realtime = RealtimeConfig::default()
        .with_heartbeat_interval(Duration::from_secs(remote.heartbeat_secs.max(1)))
        .with_reconnect(
            Duration::from_millis(remote.reconnect_delay_ms),
            remote.max_reconnect_attempts,
        );
    let mut config = ClientConfig::new(&remote.url, &remote.anon_key)
        .with_table(&remote.table)
        .with_timeout(Duration::from_secs(remote.request_timeout_secs.max(1)))
        .with_realtime(realtime);
    if let Some(token) = &remote.access_token {
        config = config.with_access_token(token);
    }
    config
}

pub fn sync_options(sync: &SyncConfig) -> SyncOptions {
    SyncOptions {
        max_rows: sync.max_rows,
        refresh_interval: Duration::from_secs(sync.refresh_interval_secs),
        event_buffer: sync.event_buffer,
    }
}

/// Renders snapshots as text.
#[derive(Debug, Clone)]
pub struct View {
    options: RenderOptions,
}

impl View {
    pub fn from_config(display: &DisplayConfig) -> Self {
        Self {
            options: RenderOptions {
                offset: UtcOffset::new(display.utc_offset_hours).unwrap_or_default(),
                time_format: TimeFormat {
                    include_date: display.include_date,
                    include_seconds: display.include_seconds,
                },
                magnitude_bound: display.magnitude_bound,
            },
        }
    }

    pub fn render(&self, snapshot: &SyncSnapshot) -> String {
        let summary = StatsSummary::build(
            snapshot.latest(),
            snapshot.channel_status.is_connected(),
            snapshot.category,
            self.options.offset,
        );
        let series = build_series(&snapshot.rows, &self.options);

        let mut out = String::new();
        let _ = writeln!(out, "[{}] {}", snapshot.state, summary);
        let _ = writeln!(
            out,
            "  {} rows ({}), {} band breaches, {} volume anomalies, {} rejected",
            series.len(),
            self.options.offset,
            series.breaches().count(),
            series.anomalies().count(),
            series.rejected
        );

        let skip = series.len().saturating_sub(TAIL_ROWS);
        for point in series.points.iter().skip(skip) {
            let rendlog = point.rendlog.unwrap_or_default();
            let orderflow = point.orderflow.unwrap_or_default();
            let marker = match point.breach {
                Some(rendlog_present::BandBreach::Above) => " ^",
                Some(rendlog_present::BandBreach::Below) => " v",
                None => "",
            };
            let _ = writeln!(
                out,
                "  {}  ret {}  z {}  delta {}{}{}",
                point.label,
                fmt_opt(rendlog.log_return, 6),
                fmt_opt(rendlog.z_score, 4),
                fmt_opt(orderflow.delta, 0),
                if orderflow.anomaly { " !" } else { "" },
                marker,
            );
        }
        out
    }
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "--".to_string(), |v| format!("{v:.decimals$}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendlog_core::{parse_naive_timestamp, Row};
    use rendlog_remote::ChannelStatus;
    use rendlog_sync::SyncState;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_parse_input() {
        assert_eq!(Input::parse(" 5m "), Input::Switch(Timeframe::Min5));
        assert_eq!(Input::parse("4H"), Input::Switch(Timeframe::Hour4));
        assert_eq!(Input::parse("QUIT"), Input::Quit);
        assert_eq!(Input::parse("help"), Input::Help);
        assert_eq!(Input::parse("   "), Input::Empty);
        assert_eq!(Input::parse("2W"), Input::Unknown("2W".into()));
    }

    #[test]
    fn test_config_mapping() {
        let mut remote = RemoteConfig::default();
        remote.url = "https://xyz.supabase.co".into();
        remote.anon_key = "anon".into();
        remote.access_token = Some("jwt".into());
        remote.heartbeat_secs = 10;
        let client = client_config(&remote);
        assert_eq!(client.bearer(), "jwt");
        assert_eq!(client.table, "user_data");
        assert_eq!(client.realtime.heartbeat_interval, Duration::from_secs(10));

        let options = sync_options(&SyncConfig::default());
        assert_eq!(options.max_rows, 100);
        assert_eq!(options.refresh_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_render() {
        let mut display = DisplayConfig::default();
        display.utc_offset_hours = -5;
        let view = View::from_config(&display);

        let row = Row::new(
            "u-1".into(),
            Timeframe::Min1,
            parse_naive_timestamp("2024-03-01T10:00:00"),
            json!({
                "rendlog": { "log_return": 0.01, "z_score": 2.5, "banda_2sigma_superior": 0.005, "senal": "VENTA" },
                "orderflow": { "delta": 14 }
            }),
        );
        let snapshot = SyncSnapshot {
            state: SyncState::Live,
            channel_status: ChannelStatus::Connected,
            subject: Some("u-1".into()),
            category: Some(Timeframe::Min1),
            rows: Arc::from(vec![row]),
            revision: 3,
        };

        let text = view.render(&snapshot);
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("[live] 1M | 2024-03-01 05:00:00 | z 2.5000 | SELL | connected")
        );
        assert_eq!(
            lines.next(),
            Some("  1 rows (UTC-5), 1 band breaches, 0 volume anomalies, 0 rejected")
        );
        assert_eq!(
            lines.next(),
            Some("  2024-03-01 05:00  ret 0.010000  z 2.5000  delta 14 ^")
        );
    }
}
