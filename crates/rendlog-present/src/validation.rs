//! Sanity checks applied to rows before they are drawn.

use rendlog_core::Row;
use serde_json::Value;
use thiserror::Error;

/// Default bound on the magnitude of any numeric payload field.
pub const DEFAULT_MAGNITUDE_BOUND: f64 = 1.0e6;

/// Why a row is not drawn.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowDefect {
    #[error("row has no timestamp")]
    MissingTimestamp,
    #[error("field `{path}` is not a finite number")]
    NonFinite { path: String },
    #[error("field `{path}` = {value} exceeds magnitude bound {bound}")]
    OutOfBounds { path: String, value: f64, bound: f64 },
}

/// Validate a row has a timestamp and sane numbers everywhere in its payload.
pub fn validate_row(row: &Row, bound: f64) -> Result<(), RowDefect> {
    if row.timestamp.is_none() {
        return Err(RowDefect::MissingTimestamp);
    }
    check_value(&row.payload, "", bound)
}

fn check_value(value: &Value, path: &str, bound: f64) -> Result<(), RowDefect> {
    match value {
        Value::Number(n) => {
            let Some(x) = n.as_f64() else {
                return Err(RowDefect::NonFinite {
                    path: path.to_string(),
                });
            };
            if !x.is_finite() {
                return Err(RowDefect::NonFinite {
                    path: path.to_string(),
                });
            }
            if x.abs() > bound {
                return Err(RowDefect::OutOfBounds {
                    path: path.to_string(),
                    value: x,
                    bound,
                });
            }
            Ok(())
        }
        Value::Object(map) => map
            .iter()
            .try_for_each(|(key, v)| check_value(v, &join(path, key), bound)),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, v)| check_value(v, &join(path, &i.to_string()), bound)),
        _ => Ok(()),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
