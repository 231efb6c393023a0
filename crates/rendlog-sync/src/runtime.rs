//! Tokio driver for the [`SyncController`].
//!
//! One dispatch loop owns the controller. Remote calls, channel forwarders
//! and refresh timers run as separate tasks and report back through the same
//! inbound channel, so the loop never blocks on the network.

use std::collections::HashMap;
use std::sync::Arc;

use rendlog_core::{Row, SubjectId, Timeframe};
use rendlog_remote::{ChannelStatus, Error as RemoteError, RemoteTable, Subscription, SubscriptionHandle};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::controller::{SyncController, SyncOptions, SyncState};
use crate::events::{Generation, SyncCommand, SyncEvent};
use crate::session::SessionContext;

/// Returned when the runtime has already stopped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("sync runtime has stopped")]
pub struct SyncStopped;

/// Published view of the controller after each visible change.
#[derive(Debug, Clone)]
pub struct SyncSnapshot {
    pub state: SyncState,
    pub channel_status: ChannelStatus,
    pub subject: Option<SubjectId>,
    pub category: Option<Timeframe>,
    /// Window rows, oldest first.
    pub rows: Arc<[Row]>,
    pub revision: u64,
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self {
            state: SyncState::default(),
            channel_status: ChannelStatus::default(),
            subject: None,
            category: None,
            rows: Arc::from(Vec::new()),
            revision: 0,
        }
    }
}

impl SyncSnapshot {
    fn capture(controller: &SyncController) -> Self {
        Self {
            state: controller.state(),
            channel_status: controller.channel_status(),
            subject: controller.subject().cloned(),
            category: controller.category(),
            rows: Arc::from(controller.snapshot()),
            revision: controller.revision(),
        }
    }

    /// Newest row in the window.
    pub fn latest(&self) -> Option<&Row> {
        self.rows.last()
    }
}

/// Messages into the dispatch loop.
#[derive(Debug)]
enum Inbound {
    Event(SyncEvent),
    /// A subscribe task finished; the stream waits for the controller's verdict.
    Opened {
        generation: Generation,
        subscription: Subscription,
    },
}

/// Entry point for running a controller on the current tokio runtime.
pub struct SyncRuntime;

impl SyncRuntime {
    /// Spawn the dispatch loop. Must be called from within a tokio runtime.
    pub fn spawn(
        table: Arc<dyn RemoteTable>,
        options: SyncOptions,
        session: Option<SessionContext>,
        category: Option<Timeframe>,
    ) -> SyncHandle {
        let (tx, rx) = mpsc::channel(options.event_buffer.max(1));
        let mut controller = SyncController::new(options);
        if session.is_some() {
            controller.emit(SyncEvent::SubjectChanged(session));
        }
        if let Some(category) = category {
            controller.emit(SyncEvent::CategoryChanged(category));
        }

        let (snapshot_tx, snapshot_rx) = watch::channel(SyncSnapshot::default());
        let driver = Driver {
            controller,
            table,
            tx: tx.clone(),
            snapshot_tx,
            published: None,
            forwarders: HashMap::new(),
            timers: HashMap::new(),
            opened: HashMap::new(),
        };
        let task = tokio::spawn(driver.run(rx));

        SyncHandle {
            tx,
            snapshots: snapshot_rx,
            task: Some(task),
        }
    }
}

/// Control and observation handle for a running sync loop.
#[derive(Debug)]
pub struct SyncHandle {
    tx: mpsc::Sender<Inbound>,
    snapshots: watch::Receiver<SyncSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Latest published snapshot.
    pub fn get_snapshot(&self) -> SyncSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn get_channel_status(&self) -> ChannelStatus {
        self.snapshots.borrow().channel_status
    }

    pub fn state(&self) -> SyncState {
        self.snapshots.borrow().state
    }

    /// Receiver notified after every visible change, for redraws.
    pub fn snapshots(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshots.clone()
    }

    /// Select another timeframe.
    pub async fn on_category_change(&self, category: Timeframe) -> Result<(), SyncStopped> {
        self.send(SyncEvent::CategoryChanged(category)).await
    }

    /// Switch to another subject, or sign out with `None`.
    pub async fn on_subject_change(
        &self,
        session: Option<SessionContext>,
    ) -> Result<(), SyncStopped> {
        self.send(SyncEvent::SubjectChanged(session)).await
    }

    /// Tear everything down and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        let _ = self.tx.send(Inbound::Event(SyncEvent::Shutdown)).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("Sync loop ended abnormally: {}", e);
            }
        }
    }

    async fn send(&self, event: SyncEvent) -> Result<(), SyncStopped> {
        self.tx
            .send(Inbound::Event(event))
            .await
            .map_err(|_| SyncStopped)
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        // Dropped without shutdown: stop the loop, which closes every task's channel
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Driver {
    controller: SyncController,
    table: Arc<dyn RemoteTable>,
    tx: mpsc::Sender<Inbound>,
    snapshot_tx: watch::Sender<SyncSnapshot>,
    published: Option<u64>,
    forwarders: HashMap<Generation, (SubscriptionHandle, JoinHandle<()>)>,
    timers: HashMap<Generation, JoinHandle<()>>,
    /// Streams whose subscription has not been accepted or cancelled yet.
    opened: HashMap<Generation, Subscription>,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::Receiver<Inbound>) {
        self.step();

        while !self.controller.is_shut_down() {
            let Some(inbound) = rx.recv().await else {
                break;
            };
            match inbound {
                Inbound::Event(event) => self.controller.emit(event),
                Inbound::Opened {
                    generation,
                    subscription,
                } => {
                    self.controller.emit(SyncEvent::Subscribed {
                        generation,
                        handle: subscription.handle,
                    });
                    self.opened.insert(generation, subscription);
                }
            }
            self.step();
        }

        self.stop_all();
        log::info!("Sync loop stopped");
    }

    /// Process queued events, run the resulting commands, publish.
    fn step(&mut self) {
        self.controller.process();
        for cmd in self.controller.drain_commands() {
            self.execute(cmd);
        }
        self.adopt_opened();
        self.publish();
    }

    fn execute(&mut self, cmd: SyncCommand) {
        match cmd {
            SyncCommand::Query { ticket, query } => {
                let table = Arc::clone(&self.table);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = table.query(&query).await;
                    let _ = tx
                        .send(Inbound::Event(SyncEvent::QueryCompleted { ticket, result }))
                        .await;
                });
            }
            SyncCommand::Subscribe {
                generation,
                subject,
            } => {
                let table = Arc::clone(&self.table);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let inbound = match table.subscribe(&subject).await {
                        Ok(subscription) => Inbound::Opened {
                            generation,
                            subscription,
                        },
                        Err(e) => Inbound::Event(SyncEvent::SubscribeFailed {
                            generation,
                            error: e.to_string(),
                        }),
                    };
                    if let Err(mpsc::error::SendError(Inbound::Opened { subscription, .. })) =
                        tx.send(inbound).await
                    {
                        // Loop is gone; nobody else will cancel this one
                        let _ = table.unsubscribe(subscription.handle);
                    }
                });
            }
            SyncCommand::Unsubscribe { generation, handle } => {
                if self.forwarders.get(&generation).is_some_and(|(h, _)| *h == handle) {
                    if let Some((_, forwarder)) = self.forwarders.remove(&generation) {
                        forwarder.abort();
                    }
                }
                if self.opened.get(&generation).is_some_and(|s| s.handle == handle) {
                    self.opened.remove(&generation);
                }
                match self.table.unsubscribe(handle) {
                    Ok(()) => {}
                    // The table already dropped a stream that ended on its own
                    Err(RemoteError::UnknownSubscription(_)) => {
                        log::debug!("Subscription {} was already released", handle)
                    }
                    Err(e) => log::warn!("Failed to unsubscribe {}: {}", handle, e),
                }
            }
            SyncCommand::StartTimer {
                generation,
                interval: period,
            } => {
                let tx = self.tx.clone();
                let timer = tokio::spawn(async move {
                    let mut ticks = interval(period);
                    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    // The first tick completes immediately
                    ticks.tick().await;
                    loop {
                        ticks.tick().await;
                        if tx
                            .send(Inbound::Event(SyncEvent::TimerTick { generation }))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                });
                if let Some(previous) = self.timers.insert(generation, timer) {
                    previous.abort();
                }
            }
            SyncCommand::StopTimer { generation } => {
                if let Some(timer) = self.timers.remove(&generation) {
                    timer.abort();
                }
            }
        }
    }

    /// Start forwarding streams the controller accepted.
    fn adopt_opened(&mut self) {
        for (generation, subscription) in std::mem::take(&mut self.opened) {
            if self.controller.generation() != Some(generation)
                || self.controller.subscription() != Some(subscription.handle)
            {
                // Already cancelled by an Unsubscribe command
                continue;
            }
            let tx = self.tx.clone();
            let handle = subscription.handle;
            let mut events = subscription.events;
            let forwarder = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if tx
                        .send(Inbound::Event(SyncEvent::Channel { generation, event }))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                log::debug!("Channel stream {} of generation {} ended", handle, generation);
                let _ = tx
                    .send(Inbound::Event(SyncEvent::ChannelClosed { generation, handle }))
                    .await;
            });
            if let Some((_, previous)) = self.forwarders.insert(generation, (handle, forwarder)) {
                previous.abort();
            }
        }
    }

    fn publish(&mut self) {
        let revision = self.controller.revision();
        if self.published == Some(revision) {
            return;
        }
        self.published = Some(revision);
        self.snapshot_tx
            .send_replace(SyncSnapshot::capture(&self.controller));
    }

    fn stop_all(&mut self) {
        for (_, (_, task)) in self.forwarders.drain() {
            task.abort();
        }
        for (_, task) in self.timers.drain() {
            task.abort();
        }
        for (_, subscription) in self.opened.drain() {
            let _ = self.table.unsubscribe(subscription.handle);
        }
    }
}
