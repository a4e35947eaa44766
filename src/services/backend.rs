use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::models::provider::{ProviderDescriptor, ProvidersResponse};
use crate::models::query::{QueryRequest, QueryResult};
use crate::models::settings::{BackendConfig, ConfigPayload, DateRange};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend responded with status {0}")]
    Status(u16),

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Answer of `GET /api/available-dates`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailableDates {
    Range(DateRange),
    /// The backend answered with an `error` body (no bucket, no data, ...).
    Unavailable(String),
}

/// The text-to-SQL backend as seen by the chat gateway.
#[async_trait]
pub trait TextToSqlBackend: Send + Sync {
    async fn list_providers(&self) -> Result<Vec<ProviderDescriptor>, BackendError>;

    async fn get_config(&self) -> Result<BackendConfig, BackendError>;

    async fn save_config(&self, payload: &ConfigPayload) -> Result<(), BackendError>;

    /// Server-reported failures come back as `Ok` with `error` set; only
    /// failures to obtain an answer at all are `Err`.
    async fn query(&self, request: &QueryRequest) -> Result<QueryResult, BackendError>;

    async fn available_dates(&self) -> Result<AvailableDates, BackendError>;
}

/// `reqwest` implementation talking to `{base_url}/api/...`.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    /// Applied to every call except `query`, which the conversation
    /// controller bounds itself.
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// The backend reports errors as `{ "error": "..." }`, usually with a 4xx
/// status. Look at the body first, whatever the status. An empty or null
/// `error` means there is none.
fn error_field(body: &serde_json::Value) -> Option<String> {
    let message = match body.get("error")? {
        serde_json::Value::Null | serde_json::Value::Bool(false) => return None,
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| other.to_string()),
    };
    (!message.is_empty()).then_some(message)
}

fn decode_body(status: StatusCode, bytes: &[u8]) -> Result<serde_json::Value, BackendError> {
    serde_json::from_slice(bytes).map_err(|e| {
        if status.is_success() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Status(status.as_u16())
        }
    })
}

#[async_trait]
impl TextToSqlBackend for HttpBackend {
    async fn list_providers(&self) -> Result<Vec<ProviderDescriptor>, BackendError> {
        let resp = self
            .client
            .get(self.url("providers"))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let bytes = resp.bytes().await?;
        let parsed: ProvidersResponse = serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::Decode(format!("invalid providers payload: {e}")))?;
        Ok(parsed.providers)
    }

    async fn get_config(&self) -> Result<BackendConfig, BackendError> {
        let resp = self
            .client
            .get(self.url("config"))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::Decode(format!("invalid config payload: {e}")))
    }

    async fn save_config(&self, payload: &ConfigPayload) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(self.url("config"))
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResult, BackendError> {
        let resp = self
            .client
            .post(self.url("query"))
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        let body = decode_body(status, &bytes)?;

        if let Some(message) = error_field(&body) {
            return Ok(QueryResult {
                error: Some(message),
                ..QueryResult::default()
            });
        }
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let mut result: QueryResult = serde_json::from_value(body)
            .map_err(|e| BackendError::Decode(format!("invalid query payload: {e}")))?;
        result.error = result.error.filter(|e| !e.is_empty());
        Ok(result)
    }

    async fn available_dates(&self) -> Result<AvailableDates, BackendError> {
        let resp = self
            .client
            .get(self.url("available-dates"))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        let body = decode_body(status, &bytes)?;

        if let Some(message) = error_field(&body) {
            return Ok(AvailableDates::Unavailable(message));
        }
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let range: DateRange = serde_json::from_value(body)
            .map_err(|e| BackendError::Decode(format!("invalid date range: {e}")))?;
        Ok(AvailableDates::Range(range))
    }
}
