//! Per-(subject, timeframe) session state.

use rendlog_core::{SubjectId, Timeframe};
use rendlog_remote::{ChannelStatus, SubscriptionHandle};

use crate::events::Generation;
use crate::window::WindowStore;

/// The signed-in user the dashboard is showing rows for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub subject: SubjectId,
}

impl SessionContext {
    pub fn new(subject: impl Into<SubjectId>) -> Self {
        Self {
            subject: subject.into(),
        }
    }
}

impl From<SubjectId> for SessionContext {
    fn from(subject: SubjectId) -> Self {
        Self { subject }
    }
}

/// Everything owned on behalf of one active (subject, timeframe) pairing.
#[derive(Debug)]
pub struct SyncSession {
    pub generation: Generation,
    /// Latest status reported by this session's channel.
    pub channel_status: ChannelStatus,
    pub subscription: Option<SubscriptionHandle>,
    /// A subscribe request is in flight.
    pub subscribe_pending: bool,
    pub timer_active: bool,
    /// Set once the first full refresh has been applied.
    pub loaded: bool,
    pub window: WindowStore,
}

impl SyncSession {
    pub fn new(
        generation: Generation,
        subject: SubjectId,
        category: Timeframe,
        max_rows: usize,
    ) -> Self {
        Self {
            generation,
            channel_status: ChannelStatus::Disconnected,
            subscription: None,
            subscribe_pending: false,
            timer_active: false,
            loaded: false,
            window: WindowStore::new(subject, category, max_rows),
        }
    }

    pub fn subject(&self) -> &SubjectId {
        self.window.subject()
    }

    pub fn category(&self) -> Timeframe {
        self.window.category()
    }
}
