//! Tool-proxy HTTP client, retry policy and destination-store sinks for tunewatch.

pub mod sinks;

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info_span, warn, Instrument};

pub use sinks::{
    notion_page_request, sheets_append_request, NotionSink, PersistedRecord, ReportSink,
    SheetsSink,
};

pub const CRATE_NAME: &str = "tunewatch-storage";

pub const DEFAULT_BASE_URL: &str = "https://composio-api.com/v1";

/// One call of a proxy tool: the tool identifier plus its tool-specific arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolRequest {
    pub tool_slug: String,
    pub arguments: JsonValue,
}

impl ToolRequest {
    pub fn new(tool_slug: impl Into<String>, arguments: JsonValue) -> Self {
        Self {
            tool_slug: tool_slug.into(),
            arguments,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolResponse {
    #[serde(default)]
    data: JsonValue,
    #[serde(default)]
    successful: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("request to {tool_slug} failed: {source}")]
    Request {
        tool_slug: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("proxy returned status {status} for {tool_slug}: {message}")]
    Api {
        tool_slug: String,
        status: u16,
        message: String,
    },
    #[error("tool {tool_slug} reported failure: {message}")]
    Tool { tool_slug: String, message: String },
    #[error("could not decode response from {tool_slug}: {source}")]
    Parse {
        tool_slug: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ProxyError {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            ProxyError::Request { source, .. } => classify_reqwest_error(source),
            ProxyError::Api { status, .. } => StatusCode::from_u16(*status)
                .map(classify_status)
                .unwrap_or(RetryDisposition::NonRetryable),
            ProxyError::Tool { .. } | ProxyError::Parse { .. } => RetryDisposition::NonRetryable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Hard ceiling on retries of a non-idempotent write.
    pub const MAX_RETRIES_CAP: usize = 3;

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(retries: usize) -> Self {
        Self {
            max_retries: retries.min(Self::MAX_RETRIES_CAP),
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// Anything that can run a proxy tool and hand back its `data` payload.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, request: &ToolRequest) -> Result<JsonValue, ProxyError>;
}

/// Run `request`, retrying retryable failures according to `backoff`.
pub async fn execute_with_retry<E>(
    executor: &E,
    request: &ToolRequest,
    backoff: &BackoffPolicy,
) -> Result<JsonValue, ProxyError>
where
    E: ToolExecutor + ?Sized,
{
    let mut attempt = 0usize;
    loop {
        match executor.execute(request).await {
            Ok(data) => return Ok(data),
            Err(err)
                if err.disposition() == RetryDisposition::Retryable
                    && attempt < backoff.max_retries =>
            {
                let delay = backoff.delay_for_attempt(attempt);
                warn!(
                    tool_slug = %request.tool_slug,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying tool call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[derive(Clone)]
pub struct ProxyClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl fmt::Debug for ProxyClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// HTTP client for the tool-execution proxy (`POST {base_url}/tools/execute`).
pub struct ProxyClient {
    client: reqwest::Client,
    execute_url: String,
    api_key: String,
}

impl fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyClient")
            .field("execute_url", &self.execute_url)
            .finish_non_exhaustive()
    }
}

impl ProxyClient {
    pub fn new(config: ProxyClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            execute_url: execute_url(&config.base_url),
            api_key: config.api_key,
        })
    }
}

fn execute_url(base_url: &str) -> String {
    format!("{}/tools/execute", base_url.trim().trim_end_matches('/'))
}

#[async_trait]
impl ToolExecutor for ProxyClient {
    async fn execute(&self, request: &ToolRequest) -> Result<JsonValue, ProxyError> {
        let span = info_span!("tool_call", tool_slug = %request.tool_slug);
        async {
            let request_error = |source| ProxyError::Request {
                tool_slug: request.tool_slug.clone(),
                source,
            };

            let resp = self
                .client
                .post(&self.execute_url)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await
                .map_err(request_error)?;

            let status = resp.status();
            let body = resp.text().await.map_err(request_error)?;
            if !status.is_success() {
                return Err(ProxyError::Api {
                    tool_slug: request.tool_slug.clone(),
                    status: status.as_u16(),
                    message: body,
                });
            }

            decode_tool_response(&request.tool_slug, &body)
        }
        .instrument(span)
        .await
    }
}

/// Unwrap the proxy envelope. A missing `data` field decodes as `null`.
pub fn decode_tool_response(tool_slug: &str, body: &str) -> Result<JsonValue, ProxyError> {
    let envelope: ToolResponse = serde_json::from_str(body).map_err(|source| ProxyError::Parse {
        tool_slug: tool_slug.to_string(),
        source,
    })?;

    if envelope.successful == Some(false) {
        return Err(ProxyError::Tool {
            tool_slug: tool_slug.to_string(),
            message: envelope
                .error
                .unwrap_or_else(|| "no error message".to_string()),
        });
    }

    Ok(envelope.data)
}

pub(crate) fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}
