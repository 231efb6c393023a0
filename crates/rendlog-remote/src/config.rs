//! Configuration for the remote table client.

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

/// Configuration for the REST query client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Project base URL (e.g. `https://xyz.supabase.co`).
    pub base_url: String,
    /// Public API key, sent as the `apikey` header.
    pub anon_key: String,
    /// Signed-in user's access token; the anon key is used when absent.
    pub access_token: Option<String>,
    /// Table holding the rows.
    pub table: String,
    /// Request timeout.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Realtime channel settings.
    pub realtime: RealtimeConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            anon_key: String::new(),
            access_token: None,
            table: crate::DEFAULT_TABLE.to_string(),
            timeout: Duration::from_secs(15),
            user_agent: format!("rendlog/{}", crate::VERSION),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for a project.
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            anon_key: anon_key.into(),
            ..Default::default()
        }
    }

    /// Set the user access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the realtime configuration.
    pub fn with_realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }

    /// Token used in the `Authorization: Bearer` header.
    pub fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }

    /// REST endpoint for the configured table.
    pub fn table_url(&self) -> Result<Url> {
        let base = self.parsed_base()?;
        Ok(base.join(&format!("rest/v1/{}", self.table))?)
    }

    /// Realtime websocket endpoint (`https` becomes `wss`).
    pub fn realtime_url(&self) -> Result<Url> {
        let base = self.parsed_base()?;
        let mut url = base.join("realtime/v1/websocket")?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(Error::InvalidConfig(format!("unsupported URL scheme '{other}'")))
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::InvalidConfig(format!("cannot use scheme {scheme}")))?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }

    fn parsed_base(&self) -> Result<Url> {
        if self.base_url.trim().is_empty() {
            return Err(Error::InvalidConfig("base URL is empty".into()));
        }
        if self.anon_key.trim().is_empty() {
            return Err(Error::InvalidConfig("anon key is empty".into()));
        }
        // Ensure join() appends rather than replacing the last segment
        let mut base = self.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Url::parse(&base)?)
    }
}

/// Shortest heartbeat interval a channel will use.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Realtime channel configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Consecutive reconnect attempts before the channel gives up and its
    /// event stream ends.
    pub max_reconnect_attempts: u32,
    /// Reconnect delay, multiplied by the attempt number.
    pub reconnect_delay: Duration,
    /// Channel buffer size.
    pub channel_buffer_size: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(25),
            max_reconnect_attempts: 10,
            reconnect_delay: Duration::from_secs(1),
            channel_buffer_size: 256,
        }
    }
}

impl RealtimeConfig {
    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, delay: Duration, max_attempts: u32) -> Self {
        self.reconnect_delay = delay;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Heartbeat interval, never shorter than [`MIN_HEARTBEAT_INTERVAL`].
    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL)
    }
}
