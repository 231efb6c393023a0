//! Core types for the rendlog workspace.
//!
//! This crate provides the data model shared by every other crate:
//! - `Row` - one persisted indicator snapshot from the remote table
//! - `SubjectId` - the owner of a set of rows
//! - `Timeframe` - the aggregation interval rows are filtered by
//! - `parse_naive_timestamp` - lenient parsing of the table's timestamps

pub mod row;
pub mod timeframe;
pub mod timestamp;

pub use row::{Row, RowId, SubjectId};
pub use timeframe::{ParseTimeframeError, Timeframe};
pub use timestamp::parse_naive_timestamp;

/// Re-exported so downstream crates name the same timestamp type.
pub use chrono::NaiveDateTime;
