//! Row data structures for the persisted indicator snapshots.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::timeframe::{ParseTimeframeError, Timeframe};
use crate::timestamp::parse_naive_timestamp;

/// Identifier of the user/session that owns a set of rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Primary key assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

/// One indicator snapshot as stored in the remote table.
///
/// `payload` holds every column other than the identity, owner, timeframe
/// and timestamp columns (typically the nested `rendlog` and `orderflow`
/// objects). It is forwarded untouched to the presentation layer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawRow")]
pub struct Row {
    pub id: Option<RowId>,
    pub subject_id: SubjectId,
    pub category: Timeframe,
    /// `None` when the stored value is missing or unparseable.
    pub timestamp: Option<NaiveDateTime>,
    pub payload: Value,
}

impl Row {
    pub fn new(
        subject_id: SubjectId,
        category: Timeframe,
        timestamp: Option<NaiveDateTime>,
        payload: Value,
    ) -> Self {
        Self {
            id: None,
            subject_id,
            category,
            timestamp,
            payload,
        }
    }

    pub fn with_id(mut self, id: RowId) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether this row belongs to the given (subject, category) pair.
    pub fn belongs_to(&self, subject: &SubjectId, category: Timeframe) -> bool {
        &self.subject_id == subject && self.category == category
    }

    /// Look up a top-level payload section such as `rendlog`.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.payload.get(name).filter(|v| !v.is_null())
    }
}

/// Wire shape of a row as returned by the table's REST endpoint.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default)]
    id: Option<RowId>,
    user_id: SubjectId,
    timeframe: String,
    #[serde(default)]
    data_timestamp: Option<Value>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl TryFrom<RawRow> for Row {
    type Error = ParseTimeframeError;

    fn try_from(raw: RawRow) -> Result<Self, Self::Error> {
        let category = raw.timeframe.parse()?;
        let timestamp = raw
            .data_timestamp
            .as_ref()
            .and_then(Value::as_str)
            .and_then(parse_naive_timestamp);

        Ok(Self {
            id: raw.id,
            subject_id: raw.user_id,
            category,
            timestamp,
            payload: Value::Object(raw.rest),
        })
    }
}
