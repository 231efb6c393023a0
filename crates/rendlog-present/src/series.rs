//! Render-ready series derived from window snapshots.

use rendlog_core::{NaiveDateTime, Row};
use serde_json::Value;

use crate::timezone::{format_time, TimeFormat, UtcOffset};
use crate::validation::{validate_row, DEFAULT_MAGNITUDE_BOUND};

/// How series are labelled and filtered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub offset: UtcOffset,
    pub time_format: TimeFormat,
    /// Rows with any numeric field above this magnitude are skipped.
    pub magnitude_bound: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            offset: UtcOffset::UTC,
            time_format: TimeFormat::default(),
            magnitude_bound: DEFAULT_MAGNITUDE_BOUND,
        }
    }
}

/// Trading signal emitted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
}

impl Signal {
    /// Decode the stored value (`COMPRA`/`VENTA`, or `BUY`/`SELL`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "COMPRA" | "BUY" => Some(Signal::Buy),
            "VENTA" | "SELL" => Some(Signal::Sell),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
        }
    }
}

/// Side of the 2-sigma band a log return broke through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandBreach {
    Above,
    Below,
}

/// Log-return statistics of one row (`rendlog` payload section).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RendlogPoint {
    pub log_return: Option<f64>,
    pub mean: Option<f64>,
    pub z_score: Option<f64>,
    pub upper_2sigma: Option<f64>,
    pub lower_2sigma: Option<f64>,
    pub upper_3sigma: Option<f64>,
    pub lower_3sigma: Option<f64>,
    pub signal: Option<Signal>,
}

impl RendlogPoint {
    pub fn from_value(value: &Value) -> Self {
        Self {
            log_return: number(value, "log_return"),
            mean: number(value, "media"),
            z_score: number(value, "z_score"),
            upper_2sigma: number(value, "banda_2sigma_superior"),
            lower_2sigma: number(value, "banda_2sigma_inferior"),
            upper_3sigma: number(value, "banda_3sigma_superior"),
            lower_3sigma: number(value, "banda_3sigma_inferior"),
            signal: value.get("senal").and_then(Value::as_str).and_then(Signal::parse),
        }
    }

    /// Whether the log return sits outside the 2-sigma band.
    pub fn breach(&self) -> Option<BandBreach> {
        let ret = self.log_return?;
        if self.upper_2sigma.is_some_and(|upper| ret > upper) {
            Some(BandBreach::Above)
        } else if self.lower_2sigma.is_some_and(|lower| ret < lower) {
            Some(BandBreach::Below)
        } else {
            None
        }
    }
}

/// Order-flow statistics of one row (`orderflow` payload section).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrderflowPoint {
    pub delta: Option<f64>,
    pub tick_volume: Option<f64>,
    pub relative_volume: Option<f64>,
    pub volume_z_score: Option<f64>,
    pub anomaly: bool,
}

impl OrderflowPoint {
    pub fn from_value(value: &Value) -> Self {
        Self {
            delta: number(value, "delta"),
            tick_volume: number(value, "tick_volume"),
            relative_volume: number(value, "vol_relativo"),
            volume_z_score: number(value, "z_score_vol"),
            anomaly: value
                .get("anomalia_vol")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

fn number(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

/// One drawable row.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPoint {
    pub timestamp: NaiveDateTime,
    pub label: String,
    pub rendlog: Option<RendlogPoint>,
    pub orderflow: Option<OrderflowPoint>,
    pub breach: Option<BandBreach>,
}

/// Points ready for the charts, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSeries {
    pub points: Vec<RenderPoint>,
    /// Rows skipped by validation.
    pub rejected: usize,
}

impl RenderSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&RenderPoint> {
        self.points.last()
    }

    /// Points whose log return left the 2-sigma band.
    pub fn breaches(&self) -> impl Iterator<Item = &RenderPoint> {
        self.points.iter().filter(|p| p.breach.is_some())
    }

    /// Points flagged with a volume anomaly.
    pub fn anomalies(&self) -> impl Iterator<Item = &RenderPoint> {
        self.points
            .iter()
            .filter(|p| p.orderflow.is_some_and(|of| of.anomaly))
    }
}

/// Turn window rows into a sorted, validated series.
pub fn build_series(rows: &[Row], options: &RenderOptions) -> RenderSeries {
    let mut series = RenderSeries::default();

    for row in rows {
        if let Err(defect) = validate_row(row, options.magnitude_bound) {
            log::warn!("Skipping row {:?}: {}", row.id, defect);
            series.rejected += 1;
            continue;
        }
        let Some(timestamp) = row.timestamp else {
            series.rejected += 1;
            continue;
        };

        let rendlog = row.section("rendlog").map(RendlogPoint::from_value);
        let orderflow = row.section("orderflow").map(OrderflowPoint::from_value);
        series.points.push(RenderPoint {
            timestamp,
            label: format_time(Some(timestamp), options.offset, options.time_format),
            breach: rendlog.and_then(|r| r.breach()),
            rendlog,
            orderflow,
        });
    }

    series.points.sort_by_key(|p| p.timestamp);
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendlog_core::{parse_naive_timestamp, Timeframe};
    use serde_json::json;

    fn row(ts: Option<&str>, payload: Value) -> Row {
        Row::new(
            "u-1".into(),
            Timeframe::Min5,
            ts.and_then(parse_naive_timestamp),
            payload,
        )
    }

    #[test]
    fn test_null_timestamp_is_excluded() {
        let rows = vec![
            row(Some("2024-03-01T10:00:00"), json!({})),
            row(None, json!({})),
        ];
        let series = build_series(&rows, &RenderOptions::default());
        assert_eq!(series.len(), 1);
        assert_eq!(series.rejected, 1);
    }

    #[test]
    fn test_sorted_and_labelled() {
        let rows = vec![
            row(Some("2024-03-01T10:05:00"), json!({})),
            row(Some("2024-03-01T10:00:00"), json!({})),
        ];
        let options = RenderOptions {
            offset: UtcOffset::new(-5).unwrap(),
            time_format: TimeFormat {
                include_date: true,
                include_seconds: false,
            },
            ..Default::default()
        };
        let series = build_series(&rows, &options);
        let labels: Vec<&str> = series.points.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["2024-03-01 05:00", "2024-03-01 05:05"]);
    }

    #[test]
    fn test_out_of_bound_rows_are_rejected() {
        let rows = vec![
            row(Some("2024-03-01T10:00:00"), json!({ "orderflow": { "delta": 1.0e12 } })),
            row(Some("2024-03-01T10:05:00"), json!({ "orderflow": { "delta": 12 } })),
        ];
        let series = build_series(&rows, &RenderOptions::default());
        assert_eq!(series.len(), 1);
        assert_eq!(series.rejected, 1);
        assert_eq!(series.latest().unwrap().orderflow.unwrap().delta, Some(12.0));
    }

    #[test]
    fn test_typed_fields_and_breaches() {
        let rows = vec![
            row(
                Some("2024-03-01T10:00:00"),
                json!({
                    "rendlog": {
                        "log_return": 0.004,
                        "media": 0.0001,
                        "z_score": 2.4,
                        "banda_2sigma_superior": 0.003,
                        "banda_2sigma_inferior": -0.003,
                        "banda_3sigma_superior": 0.0045,
                        "banda_3sigma_inferior": -0.0045,
                        "senal": "VENTA"
                    },
                    "orderflow": {
                        "delta": -35,
                        "tick_volume": 410,
                        "vol_relativo": 2.6,
                        "z_score_vol": 3.1,
                        "anomalia_vol": true
                    }
                }),
            ),
            row(
                Some("2024-03-01T10:05:00"),
                json!({
                    "rendlog": {
                        "log_return": -0.004,
                        "banda_2sigma_superior": 0.003,
                        "banda_2sigma_inferior": -0.003,
                        "senal": "COMPRA"
                    }
                }),
            ),
            row(
                Some("2024-03-01T10:10:00"),
                json!({ "rendlog": { "log_return": 0.001, "banda_2sigma_superior": 0.003 } }),
            ),
        ];
        let series = build_series(&rows, &RenderOptions::default());
        assert_eq!(series.len(), 3);

        let first = &series.points[0];
        let rendlog = first.rendlog.unwrap();
        assert_eq!(rendlog.mean, Some(0.0001));
        assert_eq!(rendlog.z_score, Some(2.4));
        assert_eq!(rendlog.signal, Some(Signal::Sell));
        assert_eq!(first.breach, Some(BandBreach::Above));
        let orderflow = first.orderflow.unwrap();
        assert_eq!(orderflow.tick_volume, Some(410.0));
        assert_eq!(orderflow.relative_volume, Some(2.6));
        assert!(orderflow.anomaly);

        assert_eq!(series.points[1].breach, Some(BandBreach::Below));
        assert_eq!(series.points[1].rendlog.unwrap().signal, Some(Signal::Buy));
        assert!(series.points[1].orderflow.is_none());
        assert_eq!(series.points[2].breach, None);

        assert_eq!(series.breaches().count(), 2);
        assert_eq!(series.anomalies().count(), 1);
    }

    #[test]
    fn test_signal_parse() {
        assert_eq!(Signal::parse("compra"), Some(Signal::Buy));
        assert_eq!(Signal::parse("SELL"), Some(Signal::Sell));
        assert_eq!(Signal::parse(""), None);
        assert_eq!(Signal::Buy.label(), "BUY");
    }
}
