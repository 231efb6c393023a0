//! Error types for the remote table client.

use std::fmt;

/// Result type alias for remote table operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the remote table client.
#[derive(Debug)]
pub enum Error {
    /// HTTP request failed
    Http(reqwest::Error),
    /// JSON serialization/deserialization error
    Json(serde_json::Error),
    /// The table endpoint returned an error response
    Api(ApiError),
    /// Rate limit exceeded
    RateLimited {
        /// Retry after this many milliseconds (if provided)
        retry_after_ms: Option<u64>,
    },
    /// Client configuration is unusable (missing URL, bad key, ...)
    InvalidConfig(String),
    /// Channel send error
    ChannelSend(String),
    /// No live subscription with this handle
    UnknownSubscription(u64),
    /// Timeout waiting for response
    Timeout,
    /// URL parsing error
    UrlParse(url::ParseError),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Api(e) => Some(e),
            Error::UrlParse(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::RateLimited { retry_after_ms } => {
                if let Some(ms) = retry_after_ms {
                    write!(f, "Rate limited, retry after {ms}ms")
                } else {
                    write!(f, "Rate limited")
                }
            }
            Error::InvalidConfig(msg) => write!(f, "Invalid client config: {msg}"),
            Error::ChannelSend(msg) => write!(f, "Channel send error: {msg}"),
            Error::UnknownSubscription(id) => write!(f, "Unknown subscription #{id}"),
            Error::Timeout => write!(f, "Request timed out"),
            Error::UrlParse(e) => write!(f, "URL parse error: {e}"),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Http(err)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::UrlParse(err)
    }
}

/// Error response returned by the table endpoint.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Backend error code (e.g. `PGRST301`), when the body carried one
    pub code: Option<String>,
    /// Error message
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{} {}] {}", self.status, code, self.message),
            None => write!(f, "[{}] {}", self.status, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Create a new API error.
    pub fn new(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Check if this is an authentication error (expired or invalid token).
    pub fn is_auth_error(&self) -> bool {
        matches!(self.status, 401 | 403)
            || self.code.as_deref().is_some_and(|c| c.starts_with("PGRST30"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::RateLimited {
                retry_after_ms: Some(2000)
            }
            .to_string(),
            "Rate limited, retry after 2000ms"
        );
        assert_eq!(Error::UnknownSubscription(7).to_string(), "Unknown subscription #7");

        let api = ApiError::new(401, Some("PGRST301".into()), "JWT expired");
        assert_eq!(Error::Api(api).to_string(), "API error: [401 PGRST301] JWT expired");
    }

    #[test]
    fn test_auth_classification() {
        assert!(ApiError::new(401, None, "").is_auth_error());
        assert!(ApiError::new(400, Some("PGRST301".into()), "").is_auth_error());
        assert!(!ApiError::new(500, None, "").is_auth_error());
    }
}
