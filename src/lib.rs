pub mod backend;
pub mod config;
pub mod errors;
pub mod failover;
pub mod fingerprint;
pub mod framing;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use backend::{openai::OpenAiAdapter, synthetic::SyntheticBackend, ChatBackend};
use config::{ConfigError, GatewayConfig};
use registry::{BackendDescriptor, BackendRegistry};
use tracing::info;

/// Production backends in priority order.
pub fn default_registry(config: &GatewayConfig) -> Result<BackendRegistry, ConfigError> {
    config
        .timeouts
        .check_stream_timeout("OpenAI", config.openai.request_timeout)?;
    let backends: Vec<Arc<dyn ChatBackend>> = vec![
        Arc::new(OpenAiAdapter::new(&config.openai)?),
        Arc::new(SyntheticBackend::vapi()),
        Arc::new(SyntheticBackend::retell()),
        Arc::new(SyntheticBackend::bland()),
        Arc::new(SyntheticBackend::free_fallback()),
    ];

    let descriptors = backends
        .into_iter()
        .enumerate()
        .map(|(index, backend)| BackendDescriptor::new(index as u32 + 1, backend))
        .collect();
    BackendRegistry::new(descriptors, &config.timeouts)
}

pub fn build_state(config: &GatewayConfig) -> Result<state::AppState, ConfigError> {
    let registry = default_registry(config)?;
    let status = registry.status();
    info!(
        backends = %registry
            .descriptors()
            .iter()
            .map(BackendDescriptor::name)
            .collect::<Vec<_>>()
            .join(","),
        available = %status.available_services.join(","),
        primary = %status.primary_service,
        ceiling_ms = config.timeouts.ceiling().as_millis() as u64,
        "backend registry configured"
    );
    Ok(state::AppState::new(registry, config.timeouts.clone()))
}

pub fn build_app(state: state::AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .route("/api/status", get(handlers::status))
        .route("/api/chat", post(handlers::chat))
        .with_state(state)
}
