//! Configuration management for rendlog.
//!
//! Loads configuration from TOML files, with environment overrides for the
//! remote endpoint and credentials.

use rendlog_core::Timeframe;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding `remote.url`.
pub const ENV_URL: &str = "RENDLOG_URL";
/// Environment variable overriding `remote.anon_key`.
pub const ENV_ANON_KEY: &str = "RENDLOG_ANON_KEY";
/// Environment variable overriding `remote.access_token`.
pub const ENV_ACCESS_TOKEN: &str = "RENDLOG_ACCESS_TOKEN";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub display: DisplayConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations.
    ///
    /// Searches in order:
    /// 1. `./rendlog.toml`
    /// 2. `~/.config/rendlog/config.toml`
    ///
    /// Returns default config if no file found.
    pub fn load_default() -> Self {
        if let Ok(config) = Self::load(Self::default_path()) {
            return config;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("rendlog").join("config.toml");
            if let Ok(config) = Self::load(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Save configuration to a file path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("rendlog.toml")
    }

    /// Apply `RENDLOG_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_URL) {
            self.remote.url = url;
        }
        if let Some(key) = non_empty(ENV_ANON_KEY) {
            self.remote.anon_key = key;
        }
        if let Some(token) = non_empty(ENV_ACCESS_TOKEN) {
            self.remote.access_token = Some(token);
        }
    }

    /// Check value ranges that the rest of the system relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.max_rows == 0 {
            return Err(ConfigError::Invalid("sync.max_rows must be at least 1".into()));
        }
        if self.sync.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sync.refresh_interval_secs must be at least 1".into(),
            ));
        }
        if self.sync.event_buffer == 0 {
            return Err(ConfigError::Invalid("sync.event_buffer must be at least 1".into()));
        }
        if !(-12..=14).contains(&self.display.utc_offset_hours) {
            return Err(ConfigError::Invalid(format!(
                "display.utc_offset_hours {} is outside -12..=14",
                self.display.utc_offset_hours
            )));
        }
        if !(self.display.magnitude_bound.is_finite() && self.display.magnitude_bound > 0.0) {
            return Err(ConfigError::Invalid(
                "display.magnitude_bound must be a positive number".into(),
            ));
        }
        Ok(())
    }
}

/// General application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Timeframe selected on startup.
    pub default_timeframe: Timeframe,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_timeframe: Timeframe::Min1,
        }
    }
}

/// Remote table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Public (anon) API key sent with every request.
    pub anon_key: String,
    /// User access token; the anon key is used as bearer when absent.
    pub access_token: Option<String>,
    /// Table holding the indicator rows.
    pub table: String,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Realtime heartbeat interval in seconds.
    pub heartbeat_secs: u64,
    /// Base delay between realtime reconnect attempts in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Reconnect attempts before the channel gives up.
    pub max_reconnect_attempts: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            access_token: None,
            table: "user_data".to_string(),
            request_timeout_secs: 15,
            heartbeat_secs: 25,
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 10,
        }
    }
}

/// Window synchronization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum rows kept in the window.
    pub max_rows: usize,
    /// Fallback polling interval in seconds.
    pub refresh_interval_secs: u64,
    /// Capacity of the controller's event queue.
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_rows: 100,
            refresh_interval_secs: 30,
            event_buffer: 256,
        }
    }
}

/// Presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Fixed hour offset applied to the UTC timestamps.
    pub utc_offset_hours: i8,
    /// Prefix time labels with the date.
    pub include_date: bool,
    /// Append seconds to time labels.
    pub include_seconds: bool,
    /// Rows with a numeric payload field above this magnitude are not drawn.
    pub magnitude_bound: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 0,
            include_date: true,
            include_seconds: false,
            magnitude_bound: 1.0e6,
        }
    }
}
