//! Admission Control
//!
//! Decides whether a generation request may reach the backend. Checks run
//! in a fixed order and stop at the first failure:
//!
//! 1. token is registered
//! 2. token has quota left
//! 3. language is supported
//! 4. input is not blank
//!
//! A successful decision holds one reserved unit of the token's quota; the
//! pipeline commits it after calling the backend.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::registry::{Account, QuotaPermit, TokenRegistry};
use crate::text::TextProcessor;

/// Inbound generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub token: String,
    pub language: String,
    pub input: String,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
}

impl GenerationRequest {
    /// Request with no sampling overrides
    pub fn new(
        token: impl Into<String>,
        language: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            language: language.into(),
            input: input.into(),
            max_length: None,
            temperature: None,
            top_p: None,
        }
    }
}

/// A request that passed admission
#[derive(Debug)]
pub struct Admission {
    pub account: Account,
    pub permit: QuotaPermit,
}

/// Admission controller
#[derive(Clone)]
pub struct AdmissionController {
    registry: Arc<TokenRegistry>,
    text: Arc<dyn TextProcessor>,
}

impl AdmissionController {
    pub fn new(registry: Arc<TokenRegistry>, text: Arc<dyn TextProcessor>) -> Self {
        Self { registry, text }
    }

    /// Run the admission checks for `request`
    ///
    /// With `metered = false` the quota check is skipped and the returned
    /// permit charges nothing.
    pub fn decide(
        &self,
        request: &GenerationRequest,
        metered: bool,
    ) -> Result<Admission, GatewayError> {
        let account = self
            .registry
            .validate_token(&request.token)
            .map_err(|_| GatewayError::InvalidToken {
                token: request.token.clone(),
            })?;

        let permit = if metered {
            self.registry.reserve(&request.token)?
        } else {
            QuotaPermit::unmetered(request.token.clone())
        };

        if !self.text.is_supported(&request.language) {
            return Err(GatewayError::UnsupportedLanguage {
                language: request.language.clone(),
            });
        }

        if request.input.trim().is_empty() {
            return Err(GatewayError::EmptyInput);
        }

        Ok(Admission { account, permit })
    }
}
