//! HTTP Server
//!
//! Exposes the request pipeline over HTTP:
//!
//! - `POST /generate` with a [`GenerationRequest`] body
//! - `POST /register` with `{"email": "..."}`
//! - `GET /health`
//! - `GET /stats` for the registry summary
//!
//! Generation and registration outcomes are carried in the JSON envelope,
//! so both routes answer 200 whether or not the request succeeded.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::admission::GenerationRequest;
use crate::pipeline::RequestPipeline;
use crate::registry::RegistrySummary;
use crate::response::{GenerationResponse, RegistrationResponse};

/// Body of `POST /register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub email: String,
}

/// Body of `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub config_generation: u64,
    pub quota_enabled: bool,
    #[serde(flatten)]
    pub registry: RegistrySummary,
}

/// Build the gateway router
pub fn router(pipeline: RequestPipeline) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/register", post(register))
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

/// Run the gateway on a bound listener until `cancel` fires
pub async fn serve(
    listener: TcpListener,
    pipeline: RequestPipeline,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Gateway shut down");
    Ok(())
}

async fn generate(
    State(pipeline): State<RequestPipeline>,
    Json(request): Json<GenerationRequest>,
) -> Json<GenerationResponse> {
    debug!("POST /generate");
    Json(pipeline.generate(request).await)
}

async fn register(
    State(pipeline): State<RequestPipeline>,
    Json(request): Json<RegistrationRequest>,
) -> Json<RegistrationResponse> {
    debug!("POST /register");
    Json(pipeline.register(&request.email).await)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn stats(State(pipeline): State<RequestPipeline>) -> Json<StatsResponse> {
    let config = pipeline.config().current_snapshot();
    Json(StatsResponse {
        config_generation: pipeline.config().generation(),
        quota_enabled: config.quota.enabled,
        registry: pipeline.registry().summary(),
    })
}
