//! Generation Backend
//!
//! The gateway forwards admitted requests to a text-generation backend
//! through the [`GenerationBackend`] trait. [`HttpBackend`] talks to a
//! remote endpoint; tests substitute their own implementations.

pub mod http;
pub mod timeout;

pub use http::HttpBackend;
pub use timeout::BackendTimeout;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Prefix of the message the public backend returns when it rate-limits us
pub const RATE_LIMIT_SENTINEL: &str =
    "Sorry, the public API is limited to around 20 queries per every 30 minutes.";

/// Parameters of one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub text: String,
    pub max_length: u32,
    pub temperature: f64,
    pub top_p: f64,
}

/// What the backend produced
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutput {
    /// Generated text
    Text(String),
    /// The provider's rate-limit message; there is no usable output
    RateLimited,
}

impl BackendOutput {
    /// Classify a raw backend reply
    pub fn from_text(text: String) -> Self {
        if text.starts_with(RATE_LIMIT_SENTINEL) {
            BackendOutput::RateLimited
        } else {
            BackendOutput::Text(text)
        }
    }
}

/// Backend call failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("backend call timed out after {0}ms")]
    Timeout(u64),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout(timeout_ms) => GatewayError::BackendTimeout { timeout_ms },
            BackendError::Unavailable(reason) => GatewayError::BackendUnavailable { reason },
        }
    }
}

/// Text-generation backend
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a continuation for `params.text`
    async fn generate(&self, params: &GenerationParams) -> Result<BackendOutput, BackendError>;
}
