//! HTTP Generation Backend
//!
//! Sends each generation call as a JSON POST:
//!
//! ```text
//! {"text": "...", "max_length": 64, "temperature": 0.8, "top_p": 0.9}
//! ```
//!
//! The reply may be a JSON object with `generated_text` or `output`, a JSON
//! array whose first element has one of those fields, or plain text.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::{BackendError, BackendOutput, GenerationBackend, GenerationParams};

/// Time allowed to establish the backend connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP backend client
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// Reqwest HTTP client
    client: reqwest::Client,

    /// Generation endpoint URL
    url: String,
}

impl HttpBackend {
    /// Create a backend for `url`
    pub fn new(url: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Get the endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate(&self, params: &GenerationParams) -> Result<BackendOutput, BackendError> {
        tracing::debug!("Sending generation request to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .json(params)
            .send()
            .await
            .map_err(|e| send_error(e, CONNECT_TIMEOUT))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Unavailable(format!("failed to read body: {}", e)))?;

        // The rate-limit message may arrive with an error status
        if body.trim_start().starts_with(super::RATE_LIMIT_SENTINEL) {
            return Ok(BackendOutput::RateLimited);
        }

        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "backend returned status {}",
                status
            )));
        }

        Ok(BackendOutput::from_text(extract_text(body)))
    }
}

/// Classify a failed send; the only client-side timeout is `connect_timeout`
fn send_error(e: reqwest::Error, connect_timeout: Duration) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(connect_timeout.as_millis() as u64)
    } else {
        BackendError::Unavailable(format!("request failed: {}", e))
    }
}

/// Pull generated text out of a reply body
fn extract_text(body: String) -> String {
    let Ok(value) = serde_json::from_str::<Value>(&body) else {
        return body;
    };

    let object = match &value {
        Value::Array(items) => items.first(),
        other => Some(other),
    };

    object
        .and_then(|o| o.get("generated_text").or_else(|| o.get("output")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| value.as_str().map(str::to_string))
        .unwrap_or(body)
}
