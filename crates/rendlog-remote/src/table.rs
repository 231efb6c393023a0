//! The contract every remote row source implements.

use std::fmt;

use async_trait::async_trait;
use rendlog_core::{Row, SubjectId, Timeframe};
use tokio::sync::mpsc;

use crate::error::Result;

/// Point-in-time query for the most recent rows of one (subject, timeframe).
///
/// Results are ordered by timestamp descending and hold at most `limit` rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowQuery {
    /// Owner of the rows.
    pub subject: SubjectId,
    /// Timeframe the rows are filtered by.
    pub category: Timeframe,
    /// Maximum number of rows returned.
    pub limit: usize,
}

impl WindowQuery {
    /// Create a new window query.
    pub fn new(subject: SubjectId, category: Timeframe, limit: usize) -> Self {
        Self {
            subject,
            category,
            limit,
        }
    }
}

/// Opaque identifier of one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Wrap a raw handle value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Health of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    /// Subscription confirmed by the server.
    Connected,
    /// Not (yet) confirmed, lost, or erroring.
    #[default]
    Disconnected,
}

impl ChannelStatus {
    /// Whether the channel is delivering notifications.
    pub fn is_connected(&self) -> bool {
        matches!(self, ChannelStatus::Connected)
    }

    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ChannelStatus::Connected => "connected",
            ChannelStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of row change reported by the push channel.
///
/// The change itself is never applied; any kind triggers a full refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
    /// A row was deleted.
    Delete,
    /// Any other change notification.
    Other,
}

impl ChangeKind {
    /// Map a database event type (`INSERT`, `UPDATE`, ...) to a change kind.
    pub fn from_event_type(event: &str) -> Self {
        match event.to_ascii_uppercase().as_str() {
            "INSERT" => ChangeKind::Insert,
            "UPDATE" => ChangeKind::Update,
            "DELETE" => ChangeKind::Delete,
            _ => ChangeKind::Other,
        }
    }
}

/// Event delivered on a subscription stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A row matching the subscription changed.
    Change(ChangeKind),
    /// The channel status changed.
    Status(ChannelStatus),
}

/// A live subscription: its handle plus the event stream.
#[derive(Debug)]
pub struct Subscription {
    /// Handle passed back to [`RemoteTable::unsubscribe`].
    pub handle: SubscriptionHandle,
    /// Change and status notifications.
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// Query and push-subscription access to the remote row table.
#[async_trait]
pub trait RemoteTable: Send + Sync {
    /// Fetch the newest rows for a (subject, timeframe), newest first.
    async fn query(&self, query: &WindowQuery) -> Result<Vec<Row>>;

    /// Open a push subscription for every row change of `subject`.
    async fn subscribe(&self, subject: &SubjectId) -> Result<Subscription>;

    /// Cancel a subscription. Events stop before this returns.
    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;
}
