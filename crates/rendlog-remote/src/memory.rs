//! In-process implementation of [`RemoteTable`].
//!
//! Behaves like the hosted table: append-only rows, filtered queries ordered
//! newest first, and a push channel announcing every insert to the matching
//! subject's subscribers. Used by tests and offline demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rendlog_core::{Row, RowId, SubjectId};
use tokio::sync::mpsc;

use crate::error::{ApiError, Error, Result};
use crate::table::{
    ChangeKind, ChannelEvent, ChannelStatus, RemoteTable, Subscription, SubscriptionHandle,
    WindowQuery,
};

const SUBSCRIPTION_BUFFER: usize = 64;

#[derive(Debug)]
struct Subscriber {
    subject: SubjectId,
    tx: mpsc::Sender<ChannelEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<Row>,
    subscribers: HashMap<SubscriptionHandle, Subscriber>,
    failing_queries: usize,
    push_enabled: bool,
}

/// Shared in-memory row table.
#[derive(Debug)]
pub struct MemoryTable {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    next_handle: AtomicU64,
    queries: AtomicU64,
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTable {
    /// Create an empty table with push delivery enabled.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                push_enabled: true,
                ..Default::default()
            }),
            next_id: AtomicU64::new(1),
            next_handle: AtomicU64::new(1),
            queries: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a row, assigning an id when it has none, and notify subscribers.
    pub fn insert(&self, row: Row) -> RowId {
        let row = match row.id {
            Some(_) => row,
            None => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed) as i64;
                row.with_id(RowId::Int(id))
            }
        };
        let id = row.id.clone().unwrap_or(RowId::Int(0));
        let subject = row.subject_id.clone();

        let mut inner = self.lock();
        inner.rows.push(row);
        if inner.push_enabled {
            notify(&inner, Some(&subject), ChannelEvent::Change(ChangeKind::Insert));
        }
        id
    }

    /// Append several rows in order.
    pub fn insert_many(&self, rows: impl IntoIterator<Item = Row>) -> Vec<RowId> {
        rows.into_iter().map(|row| self.insert(row)).collect()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    /// Whether the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    /// Broadcast a channel status change to every subscriber.
    pub fn set_channel_status(&self, status: ChannelStatus) {
        let inner = self.lock();
        notify(&inner, None, ChannelEvent::Status(status));
    }

    /// End every subscriber's stream, as a channel that gave up reconnecting
    /// would. The handles are forgotten.
    pub fn close_channels(&self) {
        self.lock().subscribers.clear();
    }

    /// Make the next `count` queries fail with a server error.
    pub fn fail_next_queries(&self, count: usize) {
        self.lock().failing_queries = count;
    }

    /// Enable or suppress change notifications (simulates a silent channel).
    pub fn set_push_enabled(&self, enabled: bool) {
        self.lock().push_enabled = enabled;
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Number of queries served or failed so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

fn notify(inner: &Inner, subject: Option<&SubjectId>, event: ChannelEvent) {
    for (handle, subscriber) in &inner.subscribers {
        if subject.is_some_and(|s| s != &subscriber.subject) {
            continue;
        }
        if subscriber.tx.try_send(event).is_err() {
            tracing::debug!("Dropping {:?} for subscription {}", event, handle);
        }
    }
}

#[async_trait]
impl RemoteTable for MemoryTable {
    async fn query(&self, query: &WindowQuery) -> Result<Vec<Row>> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.lock();
        if inner.failing_queries > 0 {
            inner.failing_queries -= 1;
            return Err(Error::Api(ApiError::new(
                503,
                None,
                "injected query failure",
            )));
        }

        let mut rows: Vec<Row> = inner
            .rows
            .iter()
            .filter(|row| row.belongs_to(&query.subject, query.category))
            .cloned()
            .collect();
        drop(inner);

        // Newest first, missing timestamps last (NULLS LAST)
        rows.sort_by(|a, b| match (a.timestamp, b.timestamp) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        rows.truncate(query.limit);
        Ok(rows)
    }

    async fn subscribe(&self, subject: &SubjectId) -> Result<Subscription> {
        let handle = SubscriptionHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let (tx, events) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tx.try_send(ChannelEvent::Status(ChannelStatus::Connected))
            .map_err(|e| Error::ChannelSend(e.to_string()))?;

        self.lock().subscribers.insert(
            handle,
            Subscriber {
                subject: subject.clone(),
                tx,
            },
        );
        Ok(Subscription { handle, events })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        self.lock()
            .subscribers
            .remove(&handle)
            .map(|_| ())
            .ok_or(Error::UnknownSubscription(handle.raw()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendlog_core::{parse_naive_timestamp, Timeframe};
    use serde_json::json;

    fn row(subject: &str, category: Timeframe, ts: Option<&str>) -> Row {
        Row::new(
            subject.into(),
            category,
            ts.and_then(parse_naive_timestamp),
            json!({}),
        )
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_limits() {
        let table = MemoryTable::new();
        table.insert(row("u-1", Timeframe::Min1, Some("2024-03-01T10:01:00")));
        table.insert(row("u-1", Timeframe::Min1, Some("2024-03-01T10:03:00")));
        table.insert(row("u-1", Timeframe::Min1, None));
        table.insert(row("u-1", Timeframe::Min1, Some("2024-03-01T10:02:00")));
        table.insert(row("u-1", Timeframe::Min5, Some("2024-03-01T10:05:00")));
        table.insert(row("u-2", Timeframe::Min1, Some("2024-03-01T10:09:00")));

        let rows = table
            .query(&WindowQuery::new("u-1".into(), Timeframe::Min1, 3))
            .await
            .unwrap();
        let stamps: Vec<String> = rows
            .iter()
            .map(|r| r.timestamp.unwrap().format("%H:%M").to_string())
            .collect();
        assert_eq!(stamps, vec!["10:03", "10:02", "10:01"]);

        let all = table
            .query(&WindowQuery::new("u-1".into(), Timeframe::Min1, 10))
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.last().unwrap().timestamp.is_none());
        assert_eq!(table.query_count(), 2);
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let table = MemoryTable::new();
        let ids = table.insert_many(vec![
            row("u-1", Timeframe::Min1, None),
            row("u-1", Timeframe::Min1, None).with_id(RowId::Text("x".into())),
        ]);
        assert_eq!(ids, vec![RowId::Int(1), RowId::Text("x".into())]);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_subscription_receives_matching_inserts() {
        let table = MemoryTable::new();
        let mut sub = table.subscribe(&"u-1".into()).await.unwrap();
        assert_eq!(
            sub.events.recv().await,
            Some(ChannelEvent::Status(ChannelStatus::Connected))
        );

        table.insert(row("u-2", Timeframe::Min1, None));
        table.insert(row("u-1", Timeframe::Hour4, None));
        assert_eq!(
            sub.events.recv().await,
            Some(ChannelEvent::Change(ChangeKind::Insert))
        );
        assert!(sub.events.try_recv().is_err());

        table.set_channel_status(ChannelStatus::Disconnected);
        assert_eq!(
            sub.events.recv().await,
            Some(ChannelEvent::Status(ChannelStatus::Disconnected))
        );
    }

    #[tokio::test]
    async fn test_silent_channel() {
        let table = MemoryTable::new();
        let mut sub = table.subscribe(&"u-1".into()).await.unwrap();
        let _ = sub.events.recv().await;

        table.set_push_enabled(false);
        table.insert(row("u-1", Timeframe::Min1, None));
        assert!(sub.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let table = MemoryTable::new();
        let sub = table.subscribe(&"u-1".into()).await.unwrap();
        assert_eq!(table.subscriber_count(), 1);

        table.unsubscribe(sub.handle).unwrap();
        assert_eq!(table.subscriber_count(), 0);
        assert!(matches!(
            table.unsubscribe(sub.handle),
            Err(Error::UnknownSubscription(_))
        ));
    }

    #[tokio::test]
    async fn test_close_channels_ends_streams() {
        let table = MemoryTable::new();
        let mut sub = table.subscribe(&"u-1".into()).await.unwrap();
        let _ = sub.events.recv().await;

        table.close_channels();
        assert_eq!(sub.events.recv().await, None);
        assert_eq!(table.subscriber_count(), 0);
        assert!(matches!(
            table.unsubscribe(sub.handle),
            Err(Error::UnknownSubscription(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let table = MemoryTable::new();
        table.fail_next_queries(1);
        let query = WindowQuery::new("u-1".into(), Timeframe::Min1, 10);
        assert!(matches!(table.query(&query).await, Err(Error::Api(_))));
        assert!(table.query(&query).await.is_ok());
    }
}
