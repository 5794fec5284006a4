// Prometheus metrics for the Codeforge gateway
//
// Exposes metrics on the /metrics HTTP endpoint:
// - Generation requests by outcome (counter)
// - Registrations by outcome (counter)
// - Backend call latency (histogram)
// - Config reloads by result (counter)
// - Quota window resets (counter)
// - Registered tokens (gauge)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::{Arc, Once};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Request metrics
    pub static ref REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("gateway_requests_total", "Generation requests by outcome"),
        &["outcome"]
    ).expect("Failed to create requests total metric");

    pub static ref REGISTRATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("gateway_registrations_total", "Registration attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create registrations total metric");

    // Backend metrics
    pub static ref BACKEND_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("backend_duration_seconds", "Generation backend call duration in seconds"),
    ).expect("Failed to create backend duration metric");

    // Config metrics
    pub static ref CONFIG_RELOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("config_reloads_total", "Config refresh cycles that swapped or failed"),
        &["result"]
    ).expect("Failed to create config reloads metric");

    // Quota metrics
    pub static ref QUOTA_REPLENISH_TOTAL: IntCounter = IntCounter::new(
        "quota_replenish_total",
        "Number of quota window resets"
    ).expect("Failed to create quota replenish metric");

    pub static ref REGISTERED_TOKENS: IntGauge = IntGauge::new(
        "registered_tokens",
        "Number of registered tokens"
    ).expect("Failed to create registered tokens metric");
}

static INIT: Once = Once::new();

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REGISTRATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BACKEND_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(CONFIG_RELOADS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUOTA_REPLENISH_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REGISTERED_TOKENS.clone()))?;
    Ok(())
}

/// Register all metrics with the registry; later calls are no-ops
pub fn init() -> prometheus::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| result = register_all());
    result
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
