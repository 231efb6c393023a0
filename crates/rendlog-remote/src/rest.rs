//! PostgREST-backed [`RemoteTable`] with a realtime push channel.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response};
use rendlog_core::{Row, SubjectId};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ApiError, Error, Result};
use crate::realtime::{JoinParams, RealtimeChannels};
use crate::table::{RemoteTable, Subscription, SubscriptionHandle, WindowQuery};

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Remote table client for the hosted `user_data` table.
#[derive(Debug)]
pub struct RestTable {
    http: Client,
    config: ClientConfig,
    table_url: Url,
    realtime_url: Url,
    channels: RealtimeChannels,
}

impl RestTable {
    /// Create a new client. Fails when the URL or key is unusable.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let table_url = config.table_url()?;
        let realtime_url = config.realtime_url()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(&config.anon_key)
                .map_err(|_| Error::InvalidConfig("anon key is not a valid header".into()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.bearer()))
                .map_err(|_| Error::InvalidConfig("access token is not a valid header".into()))?,
        );

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            config,
            table_url,
            realtime_url,
            channels: RealtimeChannels::new(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Full request URL for a window query.
    pub fn query_url(&self, query: &WindowQuery) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("user_id", &format!("eq.{}", query.subject))
            .append_pair("timeframe", &format!("eq.{}", query.category.label()))
            .append_pair("order", "data_timestamp.desc")
            .append_pair("limit", &query.limit.to_string());
        url
    }

    async fn handle_response(&self, response: Response) -> Result<Vec<Value>> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .map(|s: u64| s * 1000);

            return Err(Error::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                let message = error
                    .message
                    .or(error.details)
                    .unwrap_or_else(|| format!("HTTP {status}"));
                return Err(Error::Api(ApiError::new(status.as_u16(), error.code, message)));
            }

            return Err(Error::Api(ApiError::new(
                status.as_u16(),
                None,
                format!("HTTP {status}: {body}"),
            )));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Decode rows one by one, skipping the ones that do not fit the model.
pub fn decode_rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Row>(value) {
            Ok(row) => Some(row),
            Err(e) => {
                tracing::warn!("Skipping undecodable row: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl RemoteTable for RestTable {
    async fn query(&self, query: &WindowQuery) -> Result<Vec<Row>> {
        let url = self.query_url(query);
        tracing::debug!("GET {}", url);

        let response = self.http.get(url).send().await?;
        let values = self.handle_response(response).await?;
        Ok(decode_rows(values))
    }

    async fn subscribe(&self, subject: &SubjectId) -> Result<Subscription> {
        let params = JoinParams {
            subject: subject.clone(),
            table: self.config.table.clone(),
            access_token: self.config.bearer().to_string(),
        };
        Ok(self.channels.open(
            self.realtime_url.clone(),
            params,
            self.config.realtime.clone(),
        ))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        self.channels.close(handle)
    }
}
