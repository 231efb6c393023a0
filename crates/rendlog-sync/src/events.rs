//! Events flowing into the sync controller and commands flowing out.
//!
//! The [`EventQueue`] collects every input (control calls, query results,
//! channel notifications, timer ticks) in arrival order, and the commands
//! the controller issues in response. The runtime executes the commands and
//! feeds their outcomes back in as new events.

use std::collections::VecDeque;
use std::time::Duration;

use rendlog_core::{Row, SubjectId, Timeframe};
use rendlog_remote::{ChangeKind, ChannelEvent, SubscriptionHandle, WindowQuery};

use crate::session::SessionContext;

/// Identifies one sync session. Bumped on every teardown.
pub type Generation = u64;

/// Why a refresh was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// First load of a session.
    Initial,
    /// The push channel reported a change.
    Push(ChangeKind),
    /// The periodic timer fired.
    Timer,
}

/// Tag carried by every in-flight refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    /// Monotonic issue order across all sessions.
    pub seq: u64,
    /// Session the refresh was issued for.
    pub generation: Generation,
    /// Timeframe the refresh was issued for.
    pub category: Timeframe,
    pub reason: RefreshReason,
}

/// Inputs to the sync controller.
#[derive(Debug)]
pub enum SyncEvent {
    /// The signed-in subject changed (or signed out).
    SubjectChanged(Option<SessionContext>),
    /// The user selected a timeframe.
    CategoryChanged(Timeframe),
    /// A full refresh finished.
    QueryCompleted {
        ticket: RefreshTicket,
        result: rendlog_remote::Result<Vec<Row>>,
    },
    /// A subscription requested by `generation` is live.
    Subscribed {
        generation: Generation,
        handle: SubscriptionHandle,
    },
    /// A subscription requested by `generation` could not be opened.
    SubscribeFailed {
        generation: Generation,
        error: String,
    },
    /// Notification from the push channel of `generation`.
    Channel {
        generation: Generation,
        event: ChannelEvent,
    },
    /// The push stream of `generation` ended without being unsubscribed.
    ChannelClosed {
        generation: Generation,
        handle: SubscriptionHandle,
    },
    /// The refresh timer of `generation` fired.
    TimerTick { generation: Generation },
    /// Stop for good.
    Shutdown,
}

/// Side effects requested by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    /// Run a full refresh query and report back with `ticket`.
    Query {
        ticket: RefreshTicket,
        query: WindowQuery,
    },
    /// Open a push subscription for `subject`.
    Subscribe {
        generation: Generation,
        subject: SubjectId,
    },
    /// Cancel a push subscription, synchronously.
    Unsubscribe {
        generation: Generation,
        handle: SubscriptionHandle,
    },
    /// Start the periodic refresh timer.
    StartTimer {
        generation: Generation,
        interval: Duration,
    },
    /// Clear the periodic refresh timer, synchronously.
    StopTimer { generation: Generation },
}

impl SyncCommand {
    /// Session this command belongs to.
    pub fn generation(&self) -> Generation {
        match self {
            SyncCommand::Query { ticket, .. } => ticket.generation,
            SyncCommand::Subscribe { generation, .. }
            | SyncCommand::Unsubscribe { generation, .. }
            | SyncCommand::StartTimer { generation, .. }
            | SyncCommand::StopTimer { generation } => *generation,
        }
    }
}

/// FIFO queues of pending events and issued commands.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<SyncEvent>,
    commands: VecDeque<SyncCommand>,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for processing.
    pub fn emit(&mut self, event: SyncEvent) {
        self.events.push_back(event);
    }

    /// Take the oldest pending event.
    pub fn next_event(&mut self) -> Option<SyncEvent> {
        self.events.pop_front()
    }

    /// Queue a command for execution.
    pub fn dispatch(&mut self, cmd: SyncCommand) {
        self.commands.push_back(cmd);
    }

    /// Take all pending commands in issue order, leaving the queue empty.
    #[must_use]
    pub fn take_commands(&mut self) -> Vec<SyncCommand> {
        std::mem::take(&mut self.commands).into()
    }
}
