//! # rendlog remote table client
//!
//! Access to the append-only table the indicator backend writes into:
//!
//! - **Queries**: newest rows of one (subject, timeframe), via PostgREST
//! - **Push channel**: change notifications over the realtime websocket
//! - **In-memory table**: the same contract without a network, for tests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rendlog_remote::{ClientConfig, RemoteTable, RestTable, WindowQuery};
//! use rendlog_core::Timeframe;
//!
//! let table = RestTable::new(ClientConfig::new("https://xyz.supabase.co", "anon-key"))?;
//! let rows = table
//!     .query(&WindowQuery::new("user-1".into(), Timeframe::Min5, 100))
//!     .await?;
//!
//! let mut sub = table.subscribe(&"user-1".into()).await?;
//! while let Some(event) = sub.events.recv().await {
//!     println!("{:?}", event);
//! }
//! table.unsubscribe(sub.handle)?;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod memory;
pub mod realtime;
pub mod rest;
pub mod table;

pub use config::{ClientConfig, RealtimeConfig, MIN_HEARTBEAT_INTERVAL};
pub use error::{ApiError, Error, Result};
pub use memory::MemoryTable;
pub use rest::RestTable;
pub use table::{
    ChangeKind, ChannelEvent, ChannelStatus, RemoteTable, Subscription, SubscriptionHandle,
    WindowQuery,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Table the backend writes indicator rows into.
pub const DEFAULT_TABLE: &str = "user_data";
