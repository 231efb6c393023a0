//! Realtime push channel over the Phoenix websocket protocol.
//!
//! One websocket connection is opened per subscription. The channel joins a
//! `postgres_changes` topic filtered to the subject's rows and forwards every
//! change as [`ChannelEvent::Change`]. Connection health is reported as
//! [`ChannelEvent::Status`], only when it actually changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use rendlog_core::SubjectId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::config::RealtimeConfig;
use crate::error::{Error, Result};
use crate::table::{ChangeKind, ChannelEvent, ChannelStatus, Subscription, SubscriptionHandle};

const PHOENIX_TOPIC: &str = "phoenix";
const JOIN_REF: &str = "1";

/// A Phoenix protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    /// Channel topic.
    pub topic: String,
    /// Event name (`phx_join`, `phx_reply`, `postgres_changes`, ...).
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub payload: Value,
    /// Message reference, echoed back in replies.
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    /// Reference of the join this message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, payload: Value, msg_ref: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref),
            join_ref: Some(JOIN_REF.to_string()),
        }
    }

    fn to_text(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// What a channel subscribes to.
#[derive(Debug, Clone)]
pub struct JoinParams {
    /// Subject whose rows are watched.
    pub subject: SubjectId,
    /// Table name.
    pub table: String,
    /// Bearer token forwarded to the realtime server.
    pub access_token: String,
}

impl JoinParams {
    /// Channel topic for this subject.
    pub fn topic(&self) -> String {
        format!("realtime:rendlog:{}", self.subject)
    }

    /// The `phx_join` frame.
    pub fn join_message(&self) -> PhoenixMessage {
        let payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": self.table,
                    "filter": format!("user_id=eq.{}", self.subject),
                }],
            },
            "access_token": self.access_token,
        });
        PhoenixMessage::new(&self.topic(), "phx_join", payload, JOIN_REF.to_string())
    }
}

/// Meaning of an inbound frame for the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// The join was accepted.
    Joined,
    /// A watched row changed.
    Change(ChangeKind),
    /// The channel failed or was closed by the server.
    Lost(String),
    /// Heartbeat replies, presence, system notices.
    Ignored,
}

/// Classify a text frame received on the socket.
pub fn interpret(text: &str, topic: &str) -> Inbound {
    let msg: PhoenixMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!("Unparseable realtime frame: {}", e);
            return Inbound::Ignored;
        }
    };
    if msg.topic != topic {
        return Inbound::Ignored;
    }

    match msg.event.as_str() {
        "phx_reply" if msg.msg_ref.as_deref() == Some(JOIN_REF) => {
            match msg.payload.get("status").and_then(Value::as_str) {
                Some("ok") => Inbound::Joined,
                _ => Inbound::Lost(format!(
                    "join rejected: {}",
                    msg.payload.get("response").unwrap_or(&Value::Null)
                )),
            }
        }
        "postgres_changes" => {
            let kind = msg
                .payload
                .pointer("/data/type")
                .and_then(Value::as_str)
                .map(ChangeKind::from_event_type)
                .unwrap_or(ChangeKind::Other);
            Inbound::Change(kind)
        }
        "phx_error" => Inbound::Lost("channel error".to_string()),
        "phx_close" => Inbound::Lost("channel closed by server".to_string()),
        _ => Inbound::Ignored,
    }
}

/// Commands for a running channel task.
#[derive(Debug)]
enum ChannelCommand {
    Leave,
}

/// Forwards status transitions, suppressing repeats.
struct StatusReporter {
    current: ChannelStatus,
    event_tx: mpsc::Sender<ChannelEvent>,
    cancelled: Arc<AtomicBool>,
}

impl StatusReporter {
    /// Returns `false` once nobody is listening any more.
    async fn set(&mut self, status: ChannelStatus) -> bool {
        if self.current == status {
            return true;
        }
        self.current = status;
        self.forward(ChannelEvent::Status(status)).await
    }

    async fn forward(&self, event: ChannelEvent) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        if self.event_tx.send(event).await.is_err() {
            tracing::warn!("Realtime event receiver dropped");
            return false;
        }
        true
    }
}

struct ChannelTask {
    command_tx: mpsc::Sender<ChannelCommand>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Live realtime channels, keyed by subscription handle.
#[derive(Default)]
pub struct RealtimeChannels {
    next_handle: AtomicU64,
    channels: Mutex<HashMap<SubscriptionHandle, ChannelTask>>,
}

impl std::fmt::Debug for RealtimeChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannels")
            .field("open", &self.lock().len())
            .finish()
    }
}

impl RealtimeChannels {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionHandle, ChannelTask>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn a channel task and return its subscription.
    pub fn open(
        &self,
        endpoint: Url,
        params: JoinParams,
        config: RealtimeConfig,
    ) -> Subscription {
        let handle = SubscriptionHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        let (command_tx, command_rx) = mpsc::channel(4);
        let (event_tx, events) = mpsc::channel(config.channel_buffer_size.max(1));
        let cancelled = Arc::new(AtomicBool::new(false));

        let reporter = StatusReporter {
            current: ChannelStatus::Disconnected,
            event_tx,
            cancelled: Arc::clone(&cancelled),
        };
        tracing::info!("Opening realtime channel {} for {}", handle, params.subject);
        let task = tokio::spawn(run_channel(endpoint, params, config, command_rx, reporter));

        self.lock().insert(
            handle,
            ChannelTask {
                command_tx,
                cancelled,
                task,
            },
        );
        Subscription { handle, events }
    }

    /// Stop a channel. No further events are forwarded once this returns.
    pub fn close(&self, handle: SubscriptionHandle) -> Result<()> {
        let channel = self
            .lock()
            .remove(&handle)
            .ok_or(Error::UnknownSubscription(handle.raw()))?;

        channel.cancelled.store(true, Ordering::Release);
        // Let the task say goodbye to the server when it can, otherwise kill it
        if channel.command_tx.try_send(ChannelCommand::Leave).is_err() {
            channel.task.abort();
        }
        tracing::info!("Closed realtime channel {}", handle);
        Ok(())
    }

    /// Number of open channels.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no channel is open.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Drop for RealtimeChannels {
    fn drop(&mut self) {
        for (_, channel) in self.lock().drain() {
            channel.cancelled.store(true, Ordering::Release);
            channel.task.abort();
        }
    }
}

/// Run the websocket connection loop for one channel.
async fn run_channel(
    endpoint: Url,
    params: JoinParams,
    config: RealtimeConfig,
    mut command_rx: mpsc::Receiver<ChannelCommand>,
    mut reporter: StatusReporter,
) {
    let topic = params.topic();
    let mut reconnect_attempts: u32 = 0;
    let mut next_ref: u64 = 1;

    loop {
        let ws_stream = match connect_async(endpoint.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                tracing::warn!("Realtime connection failed: {}", e);
                if !reporter.set(ChannelStatus::Disconnected).await
                    || reconnect_attempts >= config.max_reconnect_attempts
                {
                    tracing::warn!("Giving up on realtime channel {}", topic);
                    return;
                }
                reconnect_attempts += 1;
                tokio::select! {
                    _ = tokio::time::sleep(config.reconnect_delay * reconnect_attempts) => continue,
                    _ = command_rx.recv() => return,
                }
            }
        };

        let (mut write, mut read) = ws_stream.split();

        if let Some(text) = params.join_message().to_text() {
            if let Err(e) = write.send(Message::Text(text)).await {
                tracing::warn!("Failed to send join: {}", e);
            }
        }

        let mut heartbeat = interval(config.heartbeat_period());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        heartbeat.tick().await;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => match interpret(&text, &topic) {
                            Inbound::Joined => {
                                reconnect_attempts = 0;
                                if !reporter.set(ChannelStatus::Connected).await {
                                    return;
                                }
                            }
                            Inbound::Change(kind) => {
                                if !reporter.forward(ChannelEvent::Change(kind)).await {
                                    return;
                                }
                            }
                            Inbound::Lost(reason) => {
                                tracing::warn!("Realtime channel {}: {}", topic, reason);
                                break;
                            }
                            Inbound::Ignored => {}
                        },
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Realtime socket closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::warn!("Realtime socket error: {}", e);
                            break;
                        }
                        None => {
                            tracing::info!("Realtime stream ended");
                            break;
                        }
                        _ => {}
                    }
                }

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(ChannelCommand::Leave) | None => {
                            next_ref += 1;
                            let leave = PhoenixMessage::new(&topic, "phx_leave", json!({}), next_ref.to_string());
                            if let Some(text) = leave.to_text() {
                                let _ = write.send(Message::Text(text)).await;
                            }
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        }
                    }
                }

                _ = heartbeat.tick() => {
                    next_ref += 1;
                    let beat = PhoenixMessage {
                        join_ref: None,
                        ..PhoenixMessage::new(PHOENIX_TOPIC, "heartbeat", json!({}), next_ref.to_string())
                    };
                    let sent = match beat.to_text() {
                        Some(text) => write.send(Message::Text(text)).await.is_ok(),
                        None => false,
                    };
                    if !sent {
                        tracing::warn!("Failed to send heartbeat");
                        break;
                    }
                }
            }
        }

        // Connection lost, report and try to reconnect
        if !reporter.set(ChannelStatus::Disconnected).await
            || reconnect_attempts >= config.max_reconnect_attempts
        {
            tracing::warn!("Giving up on realtime channel {}", topic);
            return;
        }
        reconnect_attempts += 1;
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay * reconnect_attempts) => {}
            _ = command_rx.recv() => return,
        }
    }
}
