//! Request Pipeline
//!
//! Sequences one generation request: admission, backend call, quota
//! commit, response envelope. No registry lock is held while the backend
//! call is in flight; the request only holds its quota reservation.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::admission::{AdmissionController, GenerationRequest};
use crate::backend::{BackendOutput, BackendTimeout, GenerationBackend, GenerationParams};
use crate::config::{Config, ConfigStore};
use crate::error::GatewayError;
use crate::metrics;
use crate::registry::{token_hint, TokenRegistry};
use crate::response::{GenerationResponse, RegistrationResponse};
use crate::text::TextProcessor;

/// Gateway request pipeline
#[derive(Clone)]
pub struct RequestPipeline {
    admission: AdmissionController,
    registry: Arc<TokenRegistry>,
    backend: Arc<dyn GenerationBackend>,
    text: Arc<dyn TextProcessor>,
    config: Arc<ConfigStore>,
}

impl RequestPipeline {
    pub fn new(
        registry: Arc<TokenRegistry>,
        backend: Arc<dyn GenerationBackend>,
        text: Arc<dyn TextProcessor>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            admission: AdmissionController::new(registry.clone(), text.clone()),
            registry,
            backend,
            text,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<TokenRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Handle one generation request
    pub async fn generate(&self, request: GenerationRequest) -> GenerationResponse {
        // One snapshot for the whole request
        let config = self.config.current_snapshot();

        match self.run(&request, &config).await {
            Ok(result) => {
                let outcome = if result.is_some() {
                    "success"
                } else {
                    "rate_limited"
                };
                metrics::REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
                GenerationResponse::success(result)
            }
            Err(err) => {
                metrics::REQUESTS_TOTAL
                    .with_label_values(&[err.kind()])
                    .inc();
                info!(kind = err.kind(), token = %token_hint(&request.token), "Generation request rejected");
                GenerationResponse::failure(&err)
            }
        }
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        config: &Config,
    ) -> Result<Option<Vec<String>>, GatewayError> {
        let admission = self.admission.decide(request, config.quota.enabled)?;

        let params = GenerationParams {
            text: self.text.process_input(&request.input, &request.language),
            max_length: request.max_length.unwrap_or(config.backend.max_length),
            temperature: request.temperature.unwrap_or(config.backend.temperature),
            top_p: request.top_p.unwrap_or(config.backend.top_p),
        };

        info!(
            token = %token_hint(&request.token),
            language = %request.language,
            input = %input_tail(&request.input),
            max_length = params.max_length,
            temperature = params.temperature,
            top_p = params.top_p,
            "Generation request admitted"
        );

        let timeout = BackendTimeout::new(config.backend.timeout());
        let started = Instant::now();
        let result = timeout.run(self.backend.generate(&params)).await;
        metrics::BACKEND_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        // Quota is spent on every attempt, whatever the backend did
        self.registry.commit(admission.permit);

        match result? {
            BackendOutput::RateLimited => {
                warn!(token = %token_hint(&request.token), "Backend rate limit hit, no output");
                Ok(None)
            }
            BackendOutput::Text(output) => Ok(Some(self.text.format_output(
                &request.input,
                &output,
                &request.language,
            ))),
        }
    }

    /// Handle one registration request
    pub async fn register(&self, email: &str) -> RegistrationResponse {
        self.registry.register(email).await.into()
    }
}

/// Last line of the input for request logs
fn input_tail(input: &str) -> String {
    match input.lines().last() {
        Some(line) => format!("... {}", line.trim()),
        None => "...".to_string(),
    }
}
