//! Bounded, ordered, deduplicated window of rows.

use std::collections::HashSet;

use rendlog_core::{NaiveDateTime, Row, RowId, SubjectId, Timeframe};

/// Default number of rows kept in a window.
pub const DEFAULT_MAX_ROWS: usize = 100;

/// Outcome of a [`WindowStore::replace`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceReport {
    /// Rows now in the window.
    pub kept: usize,
    /// Rows dropped for a missing timestamp.
    pub missing_timestamp: usize,
    /// Rows dropped for belonging to another subject or timeframe.
    pub foreign: usize,
    /// Rows collapsed into a later duplicate.
    pub duplicates: usize,
    /// Oldest rows cut to respect the size bound.
    pub truncated: usize,
}

impl ReplaceReport {
    /// Rows excluded as malformed or misplaced (worth a warning).
    pub fn rejected(&self) -> usize {
        self.missing_timestamp + self.foreign
    }
}

/// The last `max_rows` rows of one (subject, timeframe), oldest first.
#[derive(Debug, Clone)]
pub struct WindowStore {
    subject: SubjectId,
    category: Timeframe,
    max_rows: usize,
    rows: Vec<Row>,
}

impl WindowStore {
    /// Create an empty window. `max_rows` is clamped to at least 1.
    pub fn new(subject: SubjectId, category: Timeframe, max_rows: usize) -> Self {
        Self {
            subject,
            category,
            max_rows: max_rows.max(1),
            rows: Vec::new(),
        }
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn category(&self) -> Timeframe {
        self.category
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Replace the contents with an unordered batch.
    ///
    /// Rows without a timestamp or for another (subject, timeframe) are
    /// dropped. Rows sharing a timestamp and id collapse to the one that
    /// came last in the batch. The result is sorted ascending and cut to
    /// the newest `max_rows`.
    pub fn replace(&mut self, rows: impl IntoIterator<Item = Row>) -> ReplaceReport {
        let mut report = ReplaceReport::default();

        let candidates: Vec<(NaiveDateTime, Row)> = rows
            .into_iter()
            .filter_map(|row| {
                if !row.belongs_to(&self.subject, self.category) {
                    report.foreign += 1;
                    return None;
                }
                match row.timestamp {
                    Some(ts) => Some((ts, row)),
                    None => {
                        report.missing_timestamp += 1;
                        None
                    }
                }
            })
            .collect();

        // Walk backwards so the last occurrence of each key is the one kept
        let mut seen: HashSet<(NaiveDateTime, Option<RowId>)> = HashSet::new();
        let mut unique: Vec<(NaiveDateTime, Row)> = Vec::with_capacity(candidates.len());
        for (ts, row) in candidates.into_iter().rev() {
            if seen.insert((ts, row.id.clone())) {
                unique.push((ts, row));
            } else {
                report.duplicates += 1;
            }
        }
        unique.reverse();
        unique.sort_by_key(|(ts, _)| *ts);

        if unique.len() > self.max_rows {
            report.truncated = unique.len() - self.max_rows;
            unique.drain(..report.truncated);
        }

        self.rows = unique.into_iter().map(|(_, row)| row).collect();
        report.kept = self.rows.len();
        report
    }

    /// Current rows, oldest first.
    pub fn current(&self) -> &[Row] {
        &self.rows
    }

    /// Newest row, `None` when empty.
    pub fn latest(&self) -> Option<&Row> {
        self.rows.last()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
