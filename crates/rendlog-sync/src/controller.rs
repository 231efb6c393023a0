//! The sync controller state machine.
//!
//! The controller performs no I/O. Inputs arrive as [`SyncEvent`]s through
//! [`SyncController::emit`]; [`SyncController::process`] reacts to them and
//! queues [`SyncCommand`]s for a runtime to execute.

use std::fmt;
use std::time::Duration;

use rendlog_core::{Row, SubjectId, Timeframe};
use rendlog_remote::{ChannelEvent, ChannelStatus, SubscriptionHandle, WindowQuery};

use crate::events::{EventQueue, Generation, RefreshReason, RefreshTicket, SyncCommand, SyncEvent};
use crate::session::{SessionContext, SyncSession};
use crate::window::DEFAULT_MAX_ROWS;

/// Default fallback polling interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest polling interval the controller will request.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No subject or no timeframe yet.
    #[default]
    Uninitialized,
    /// First full refresh in flight; no rows exposed.
    Loading,
    /// Push channel connected.
    Live,
    /// Push channel down; polling, and resubscribing on each timer tick.
    Degraded,
    /// Shut down.
    Teardown,
}

impl SyncState {
    pub fn label(&self) -> &'static str {
        match self {
            SyncState::Uninitialized => "uninitialized",
            SyncState::Loading => "loading",
            SyncState::Live => "live",
            SyncState::Degraded => "degraded",
            SyncState::Teardown => "teardown",
        }
    }

    fn from_status(status: ChannelStatus) -> Self {
        if status.is_connected() {
            SyncState::Live
        } else {
            SyncState::Degraded
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tunables shared by the controller and runtime.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Window size bound.
    pub max_rows: usize,
    /// Fallback polling interval.
    pub refresh_interval: Duration,
    /// Capacity of the runtime's inbound event channel.
    pub event_buffer: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            event_buffer: 256,
        }
    }
}

/// Sans-IO controller keeping one window in sync with the remote table.
#[derive(Debug)]
pub struct SyncController {
    options: SyncOptions,
    queue: EventQueue,
    context: Option<SessionContext>,
    category: Option<Timeframe>,
    session: Option<SyncSession>,
    state: SyncState,
    last_generation: Generation,
    last_seq: u64,
    applied_seq: u64,
    revision: u64,
    shut_down: bool,
}

impl SyncController {
    pub fn new(mut options: SyncOptions) -> Self {
        options.refresh_interval = options.refresh_interval.max(MIN_REFRESH_INTERVAL);
        Self {
            options,
            queue: EventQueue::new(),
            context: None,
            category: None,
            session: None,
            state: SyncState::Uninitialized,
            last_generation: 0,
            last_seq: 0,
            applied_seq: 0,
            revision: 0,
            shut_down: false,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Queue an input event.
    pub fn emit(&mut self, event: SyncEvent) {
        self.queue.emit(event);
    }

    /// Handle every queued event. Returns how many were handled.
    pub fn process(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.queue.next_event() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Take the commands issued so far, in issue order.
    pub fn drain_commands(&mut self) -> Vec<SyncCommand> {
        self.queue.take_commands()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Latest channel status of the active session.
    pub fn channel_status(&self) -> ChannelStatus {
        self.session
            .as_ref()
            .map(|s| s.channel_status)
            .unwrap_or_default()
    }

    /// Rows visible to the presentation layer, oldest first.
    ///
    /// Empty until the session's first full refresh has been applied.
    pub fn snapshot(&self) -> &[Row] {
        match &self.session {
            Some(session) if session.loaded => session.window.current(),
            _ => &[],
        }
    }

    /// Newest visible row.
    pub fn latest(&self) -> Option<&Row> {
        self.snapshot().last()
    }

    /// Selected timeframe.
    pub fn category(&self) -> Option<Timeframe> {
        self.category
    }

    pub fn subject(&self) -> Option<&SubjectId> {
        self.context.as_ref().map(|c| &c.subject)
    }

    /// Generation of the active session.
    pub fn generation(&self) -> Option<Generation> {
        self.session.as_ref().map(|s| s.generation)
    }

    /// Subscription held by the active session.
    pub fn subscription(&self) -> Option<SubscriptionHandle> {
        self.session.as_ref().and_then(|s| s.subscription)
    }

    pub fn timer_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.timer_active)
    }

    /// Bumped on every change visible through the accessors above.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn handle(&mut self, event: SyncEvent) {
        if self.shut_down {
            log::debug!("Ignoring {:?} after shutdown", event);
            return;
        }

        match event {
            SyncEvent::SubjectChanged(context) => self.on_subject_changed(context),
            SyncEvent::CategoryChanged(category) => self.on_category_changed(category),
            SyncEvent::QueryCompleted { ticket, result } => self.on_query_completed(ticket, result),
            SyncEvent::Subscribed { generation, handle } => self.on_subscribed(generation, handle),
            SyncEvent::SubscribeFailed { generation, error } => {
                if let Some(session) = self.session.as_mut().filter(|s| s.generation == generation) {
                    log::warn!("Push subscription failed, retrying on next refresh: {}", error);
                    session.subscribe_pending = false;
                    self.apply_status(ChannelStatus::Disconnected);
                }
            }
            SyncEvent::ChannelClosed { generation, handle } => {
                self.on_channel_closed(generation, handle)
            }
            SyncEvent::Channel { generation, event } => {
                if !self.is_current(generation) {
                    log::debug!("Dropping channel event from generation {}", generation);
                    return;
                }
                match event {
                    ChannelEvent::Change(kind) => self.issue_refresh(RefreshReason::Push(kind)),
                    ChannelEvent::Status(status) => self.apply_status(status),
                }
            }
            SyncEvent::TimerTick { generation } => {
                if self.is_current(generation) {
                    self.issue_refresh(RefreshReason::Timer);
                    self.resubscribe_if_idle();
                }
            }
            SyncEvent::Shutdown => {
                log::info!("Sync shutting down");
                self.teardown();
                self.shut_down = true;
                self.set_state(SyncState::Teardown);
            }
        }
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.generation() == Some(generation)
    }

    fn on_subject_changed(&mut self, context: Option<SessionContext>) {
        if context == self.context {
            return;
        }
        match &context {
            Some(ctx) => log::info!("Subject changed to {}", ctx.subject),
            None => log::info!("Subject signed out"),
        }
        self.teardown();
        self.context = context;
        self.revision += 1;
        self.start_session();
    }

    fn on_category_changed(&mut self, category: Timeframe) {
        if self.category == Some(category) {
            return;
        }
        log::info!("Timeframe changed to {}", category);
        self.teardown();
        self.category = Some(category);
        self.revision += 1;
        self.start_session();
    }

    /// Cancel the subscription and timer, then drop the window.
    fn teardown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if let Some(handle) = session.subscription {
            self.queue.dispatch(SyncCommand::Unsubscribe {
                generation: session.generation,
                handle,
            });
        }
        if session.timer_active {
            self.queue.dispatch(SyncCommand::StopTimer {
                generation: session.generation,
            });
        }
        log::debug!("Tore down session generation {}", session.generation);
        self.set_state(SyncState::Uninitialized);
        self.revision += 1;
    }

    fn start_session(&mut self) {
        let (Some(context), Some(category)) = (&self.context, self.category) else {
            self.set_state(SyncState::Uninitialized);
            return;
        };

        self.last_generation += 1;
        let generation = self.last_generation;
        let subject = context.subject.clone();
        let mut session =
            SyncSession::new(generation, subject.clone(), category, self.options.max_rows);

        log::info!(
            "Starting session {} for {} on {}",
            generation,
            subject,
            category
        );
        self.queue.dispatch(SyncCommand::Subscribe {
            generation,
            subject,
        });
        session.subscribe_pending = true;
        self.queue.dispatch(SyncCommand::StartTimer {
            generation,
            interval: self.options.refresh_interval,
        });
        session.timer_active = true;

        self.session = Some(session);
        self.set_state(SyncState::Loading);
        self.issue_refresh(RefreshReason::Initial);
    }

    fn issue_refresh(&mut self, reason: RefreshReason) {
        let Some(session) = &self.session else {
            return;
        };
        self.last_seq += 1;
        let ticket = RefreshTicket {
            seq: self.last_seq,
            generation: session.generation,
            category: session.category(),
            reason,
        };
        let query = WindowQuery::new(
            session.subject().clone(),
            session.category(),
            self.options.max_rows,
        );
        log::debug!("Refresh #{} ({:?})", ticket.seq, reason);
        self.queue.dispatch(SyncCommand::Query { ticket, query });
    }

    fn on_query_completed(
        &mut self,
        ticket: RefreshTicket,
        result: rendlog_remote::Result<Vec<Row>>,
    ) {
        if !self.is_current(ticket.generation) {
            log::debug!(
                "Discarding refresh #{} from generation {} ({})",
                ticket.seq,
                ticket.generation,
                ticket.category
            );
            return;
        }
        if ticket.seq <= self.applied_seq {
            log::debug!(
                "Discarding stale refresh #{} (applied #{})",
                ticket.seq,
                self.applied_seq
            );
            return;
        }

        let mut rows = match result {
            Ok(rows) => rows,
            Err(rendlog_remote::Error::Api(api)) if api.is_auth_error() => {
                log::error!(
                    "Refresh #{} rejected, access token is missing or expired: {}",
                    ticket.seq,
                    api
                );
                return;
            }
            Err(e) => {
                log::warn!("Refresh #{} failed: {}", ticket.seq, e);
                return;
            }
        };
        // Newest first from the table
        rows.reverse();

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let report = session.window.replace(rows);
        if report.rejected() > 0 {
            log::warn!(
                "Refresh #{} rejected {} rows ({} without timestamp, {} misplaced)",
                ticket.seq,
                report.rejected(),
                report.missing_timestamp,
                report.foreign
            );
        }
        session.loaded = true;
        let status = session.channel_status;
        self.applied_seq = ticket.seq;
        self.revision += 1;

        if self.state == SyncState::Loading {
            self.set_state(SyncState::from_status(status));
        }
    }

    fn on_subscribed(&mut self, generation: Generation, handle: SubscriptionHandle) {
        match self.session.as_mut() {
            Some(session) if session.generation == generation && session.subscription.is_none() => {
                session.subscription = Some(handle);
                session.subscribe_pending = false;
            }
            _ => {
                log::debug!(
                    "Cancelling late subscription {} of generation {}",
                    handle,
                    generation
                );
                self.queue
                    .dispatch(SyncCommand::Unsubscribe { generation, handle });
            }
        }
    }

    /// The push stream ended on its own. Release it and fall back to polling.
    fn on_channel_closed(&mut self, generation: Generation, handle: SubscriptionHandle) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.generation == generation && s.subscription == Some(handle))
        else {
            log::debug!("Ignoring end of stale channel {}", handle);
            return;
        };
        log::warn!("Push channel {} closed, polling until it is reopened", handle);
        session.subscription = None;
        self.queue
            .dispatch(SyncCommand::Unsubscribe { generation, handle });
        self.apply_status(ChannelStatus::Disconnected);
    }

    /// Ask for a new subscription when the session holds none and none is
    /// in flight.
    fn resubscribe_if_idle(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.subscription.is_some() || session.subscribe_pending {
            return;
        }
        log::info!("Reopening push channel for session {}", session.generation);
        session.subscribe_pending = true;
        self.queue.dispatch(SyncCommand::Subscribe {
            generation: session.generation,
            subject: session.subject().clone(),
        });
    }

    fn apply_status(&mut self, status: ChannelStatus) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.channel_status != status {
            session.channel_status = status;
            self.revision += 1;
        }
        // Recorded only while loading
        if matches!(self.state, SyncState::Live | SyncState::Degraded) {
            self.set_state(SyncState::from_status(status));
        }
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state != state {
            log::info!("Sync state {} -> {}", self.state, state);
            self.state = state;
            self.revision += 1;
        }
    }
}
