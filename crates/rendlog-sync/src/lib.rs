//! Live window synchronization for rendlog.
//!
//! Keeps the last N rows of one (subject, timeframe) consistent with the
//! remote table as rows arrive, as the timeframe changes and as the push
//! channel comes and goes.
//!
//! - [`WindowStore`] - bounded, ordered, deduplicated rows
//! - [`SyncController`] - sans-IO state machine emitting [`SyncCommand`]s
//! - [`SyncRuntime`] - tokio driver; returns a [`SyncHandle`]

pub mod controller;
pub mod events;
pub mod runtime;
pub mod session;
pub mod window;

pub use controller::{SyncController, SyncOptions, SyncState, DEFAULT_REFRESH_INTERVAL,
    MIN_REFRESH_INTERVAL,
};
pub use events::{EventQueue, Generation, RefreshReason, RefreshTicket, SyncCommand, SyncEvent};
pub use runtime::{SyncHandle, SyncRuntime, SyncSnapshot, SyncStopped};
pub use session::{SessionContext, SyncSession};
pub use window::{ReplaceReport, WindowStore, DEFAULT_MAX_ROWS};
