use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use crate::{
    backend::FramedStream,
    errors::{apply_header, AppError},
    failover::FailoverOutcome,
    fingerprint::fingerprint_for,
    framing,
    models::{ChatRequest, ServiceStatus, ValidationError},
    state::AppState,
};

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => AppError::Internal(format!("metrics render failed: {error}")).into_response(),
    }
}

pub async fn status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.failover.registry().status())
}

/// The body is taken raw so that malformed JSON and shape errors both map
/// to the 400 validation response.
pub async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    let started = Instant::now();
    let _inflight = state.metrics.inflight_guard();

    let response = match process_chat(&state, &body).await {
        Ok(response) => response,
        Err(error) => {
            if let AppError::Validation(reason) = &error {
                warn!(error = %reason, "rejected chat request");
            }
            error.into_response()
        }
    };

    state.metrics.observe_request(
        "/api/chat",
        "POST",
        response.status().as_u16(),
        started.elapsed(),
    );

    response
}

async fn process_chat(state: &AppState, body: &[u8]) -> Result<Response, AppError> {
    let request: ChatRequest =
        serde_json::from_slice(body).map_err(|_| ValidationError::InvalidMessages)?;
    let turn = request.into_turn()?;

    info!(
        request_id = %turn.request_id,
        bot_name = %turn.persona.display_name,
        messages = turn.conversation.history().len(),
        preferred_service = %turn.preferred_service.as_deref().unwrap_or("auto"),
        fingerprint = %fingerprint_for(&turn),
        "chat request accepted"
    );

    match state.failover.route(&turn).await? {
        FailoverOutcome::Success { result, source } => {
            info!(request_id = %turn.request_id, backend = %source, "streaming reply");
            Ok(stream_response(&turn.request_id, framing::normalize(result)))
        }
        FailoverOutcome::Exhausted {
            last_failure,
            tried,
        } => {
            state.metrics.observe_exhausted(last_failure.kind.as_str());
            warn!(
                request_id = %turn.request_id,
                tried = %tried.join(", "),
                last = %last_failure,
                "request exhausted every candidate"
            );
            Err(AppError::Upstream(last_failure))
        }
    }
}

fn stream_response(request_id: &str, stream: FramedStream) -> Response {
    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    apply_header(headers, CONTENT_TYPE.as_str(), "text/plain; charset=utf-8");
    apply_header(headers, CACHE_CONTROL.as_str(), "no-cache");
    apply_header(headers, "x-request-id", request_id);
    response
}
