//! Webhook workflow client
//!
//! Posts REF arguments as JSON to `endpoint_config.webhook` and returns the
//! decoded body. Transport failures and 5xx responses are retried with
//! exponential backoff up to `max_retries`; 4xx responses fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use url::Url;

use super::WorkflowClient;
use crate::config::WorkflowConfig;
use crate::error::{Result, RqlError};

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

pub struct WebhookClient {
    client: Client,
    max_retries: u32,
}

impl WebhookClient {
    pub fn new(config: &WorkflowConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.default_timeout_secs))
            .user_agent(concat!("rql-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RqlError::Workflow(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
        })
    }

    fn backoff(attempt: u32) -> Duration {
        INITIAL_BACKOFF
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF)
    }

    async fn post_once(&self, url: &Url, args: &Map<String, Value>) -> Attempt {
        let response = match self.client.post(url.clone()).json(args).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(e.to_string()),
        };

        let status = response.status();
        if status.is_server_error() {
            return Attempt::Retry(format!("HTTP {}", status));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Attempt::Fatal(format!("HTTP {}: {}", status, body));
        }

        match response.json::<Value>().await {
            Ok(value) => Attempt::Done(value),
            Err(e) => Attempt::Fatal(format!("response is not JSON: {}", e)),
        }
    }
}

enum Attempt {
    Done(Value),
    Retry(String),
    Fatal(String),
}

/// Webhook URL from a source config (absolute http/https only)
pub fn webhook_url(endpoint_config: &Map<String, Value>) -> Result<Url> {
    let raw = endpoint_config
        .get("webhook")
        .and_then(Value::as_str)
        .ok_or_else(|| RqlError::InvalidWebhook {
            reason: "No webhook URL found in source config".to_string(),
        })?;

    let url = Url::parse(raw).map_err(|e| RqlError::InvalidWebhook {
        reason: format!("'{}' is not a valid URL: {}", raw, e),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RqlError::InvalidWebhook {
            reason: format!("unsupported scheme '{}' (use http or https)", other),
        }),
    }
}

#[async_trait]
impl WorkflowClient for WebhookClient {
    async fn invoke(
        &self,
        endpoint_config: &Map<String, Value>,
        args: &Map<String, Value>,
    ) -> Result<Value> {
        let url = webhook_url(endpoint_config)?;
        let mut attempt = 0;
        loop {
            match self.post_once(&url, args).await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fatal(reason) => return Err(RqlError::Workflow(reason)),
                Attempt::Retry(reason) if attempt >= self.max_retries => {
                    return Err(RqlError::Workflow(format!(
                        "{} (after {} attempts)",
                        reason,
                        attempt + 1
                    )));
                }
                Attempt::Retry(reason) => {
                    let delay = Self::backoff(attempt);
                    tracing::warn!(url = %url, attempt, %reason, ?delay, "workflow call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
