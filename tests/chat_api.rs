use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use persona_chat_gateway::{
    backend::{mock::ScriptedBackend, BackendError, BackendResult, ChatBackend},
    build_app,
    config::TimeoutPolicy,
    framing,
    registry::{BackendDescriptor, BackendRegistry},
    state::AppState,
};
use serde_json::Value;
use tower::util::ServiceExt;

const BUDGET: Duration = Duration::from_millis(200);

fn app_with(backends: Vec<ScriptedBackend>) -> Router {
    let mut timeouts = TimeoutPolicy::new(BUDGET, Duration::from_secs(30));
    for backend in &backends {
        timeouts = timeouts.with_budget(backend.name(), BUDGET);
    }
    let descriptors = backends
        .into_iter()
        .enumerate()
        .map(|(index, backend)| {
            let backend: Arc<dyn ChatBackend> = Arc::new(backend);
            BackendDescriptor::new(index as u32 + 1, backend)
        })
        .collect();
    let registry = BackendRegistry::new(descriptors, &timeouts).expect("registry");
    build_app(AppState::new(registry, timeouts))
}

fn chat_body(preferred: Option<&str>) -> String {
    let mut body = serde_json::json!({
        "messages": [{"role": "user", "content": "Hello, how are you?"}],
        "botPersonality": "You are a helpful assistant.",
        "botName": "TestBot"
    });
    if let Some(preferred) = preferred {
        body["preferredService"] = Value::String(preferred.to_owned());
    }
    body.to_string()
}

async fn post_chat(app: Router, body: impl Into<Body>) -> Response {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(body.into())
            .expect("request build"),
    )
    .await
    .expect("request execution")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body should be readable");
    String::from_utf8(bytes.to_vec()).expect("response body should be UTF-8")
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).expect("JSON body")
}

fn synthesized(content: &str) -> String {
    framing::synthesize(content)
        .expect("frames")
        .iter()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

#[tokio::test]
async fn messages_not_an_array_is_rejected_before_routing() {
    let backend = ScriptedBackend::replying("primary", "unused");
    let calls = backend.call_counter();
    let app = app_with(vec![backend]);

    let response = post_chat(
        app,
        r#"{"messages":"hello","botPersonality":"Kind.","botName":"Bo"}"#,
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid messages format");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_json_and_missing_persona_are_bad_requests() {
    let app = app_with(vec![ScriptedBackend::replying("primary", "unused")]);

    let malformed = post_chat(app.clone(), "{not json").await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let missing_persona = post_chat(
        app,
        r#"{"messages":[{"role":"user","content":"hi"}],"botName":"Bo"}"#,
    )
    .await;
    assert_eq!(missing_persona.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(missing_persona).await["error"],
        "Bot personality and name are required"
    );
}

#[tokio::test]
async fn zero_available_backends_is_a_configuration_error() {
    let app = app_with(vec![
        ScriptedBackend::replying("primary", "unused").unavailable(),
        ScriptedBackend::replying("secondary", "unused").unavailable(),
    ]);

    let response = post_chat(app, chat_body(None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = body_json(response).await["error"]
        .as_str()
        .expect("error string")
        .to_owned();
    assert!(error.contains("configured"), "error: {error}");
}

#[tokio::test]
async fn synthetic_reply_is_framed_as_three_records() {
    let app = app_with(vec![ScriptedBackend::replying(
        "primary",
        "Hi \"there\"\nfriend",
    )]);

    let response = post_chat(app, chat_body(None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok()),
        Some("text/plain; charset=utf-8")
    );
    assert!(response.headers().contains_key("x-request-id"));

    let body = body_text(response).await;
    let records = body.lines().collect::<Vec<_>>();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0], r#"0:"Hi \"there\"\nfriend""#);
    assert!(records[1].starts_with("d:{\"finishReason\":\"stop\""));
    assert_eq!(records[2], "e:null");
}

#[tokio::test(start_paused = true)]
async fn first_timeout_fails_over_to_second_backend() {
    let slow = ScriptedBackend::replying("slow", "too late").with_delay(BUDGET * 2);
    let steady = ScriptedBackend::replying("steady", "second backend reply");
    let app = app_with(vec![slow, steady]);

    let response = post_chat(app, chat_body(None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, synthesized("second backend reply"));
}

#[tokio::test(start_paused = true)]
async fn all_failing_with_final_timeout_is_gateway_timeout() {
    let app = app_with(vec![
        ScriptedBackend::failing("first", BackendError::Unavailable("down".to_owned())),
        ScriptedBackend::hanging("laggard"),
    ]);

    let response = post_chat(app, chat_body(None)).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = body_json(response).await;
    assert!(body["error"].as_str().expect("error").contains("laggard"));
    assert_eq!(body["service"], "laggard");
}

#[tokio::test(start_paused = true)]
async fn all_failing_with_final_error_is_internal_error() {
    let app = app_with(vec![
        ScriptedBackend::hanging("laggard"),
        ScriptedBackend::failing(
            "broken",
            BackendError::InvalidResponse("status 502: bad gateway".to_owned()),
        ),
    ]);

    let response = post_chat(app, chat_body(None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"].as_str().expect("error").contains("broken"));
    assert!(body["detail"].as_str().expect("detail").contains("502"));
}

#[tokio::test]
async fn final_quota_and_auth_failures_keep_their_statuses() {
    let quota = app_with(vec![ScriptedBackend::failing(
        "paid",
        BackendError::QuotaExceeded("insufficient_quota".to_owned()),
    )]);
    assert_eq!(
        post_chat(quota, chat_body(None)).await.status(),
        StatusCode::PAYMENT_REQUIRED
    );

    let auth = app_with(vec![ScriptedBackend::failing(
        "paid",
        BackendError::Unauthorized("invalid_api_key".to_owned()),
    )]);
    assert_eq!(
        post_chat(auth, chat_body(None)).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let limited = app_with(vec![ScriptedBackend::failing(
        "paid",
        BackendError::RateLimited("slow down".to_owned()),
    )]);
    assert_eq!(
        post_chat(limited, chat_body(None)).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn preferred_service_is_the_only_candidate() {
    let first = ScriptedBackend::replying("first", "from first");
    let second = ScriptedBackend::replying("Second", "from second");
    let first_calls = first.call_counter();
    let app = app_with(vec![first, second]);

    let response = post_chat(app, chat_body(Some("SECOND"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, synthesized("from second"));
    assert_eq!(first_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_preferred_service_uses_priority_order() {
    let app = app_with(vec![
        ScriptedBackend::replying("first", "from first"),
        ScriptedBackend::replying("second", "from second"),
    ]);

    let response = post_chat(app, chat_body(Some("nonexistent"))).await;
    assert_eq!(body_text(response).await, synthesized("from first"));
}

#[tokio::test]
async fn native_streams_pass_through_unchanged() {
    let chunks = vec![
        "0:\"Hel\"\n".to_owned(),
        "0:\"lo\"\n".to_owned(),
        "d:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":3,\"completionTokens\":2}}\n"
            .to_owned(),
        "e:null\n".to_owned(),
    ];
    let app = app_with(vec![ScriptedBackend::streaming("live", chunks.clone())]);

    let response = post_chat(app, chat_body(None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, chunks.concat());
}

#[tokio::test]
async fn status_endpoint_reports_availability() {
    let app = app_with(vec![
        ScriptedBackend::replying("OpenAI", "x").unavailable(),
        ScriptedBackend::replying("Vapi", "y"),
        ScriptedBackend::replying("Free Fallback", "z"),
    ]);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/status")
                .body(Body::empty())
                .expect("request build"),
        )
        .await
        .expect("request execution");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["configured"], true);
    assert_eq!(
        body["availableServices"],
        serde_json::json!(["Vapi", "Free Fallback"])
    );
    assert_eq!(body["serviceStatus"]["openai"], false);
    assert_eq!(body["serviceStatus"]["vapi"], true);
    assert_eq!(body["serviceStatus"]["free fallback"], true);
    assert!(body["serviceStatus"].get("OpenAI").is_none());
    assert_eq!(body["primaryService"], "Vapi");
}

#[tokio::test]
async fn metrics_count_attempts_after_a_request() {
    let app = app_with(vec![ScriptedBackend::replying("primary", "ok")]);
    let response = post_chat(app.clone(), chat_body(None)).await;
    let _ = body_text(response).await;

    let metrics = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .expect("request build"),
        )
        .await
        .expect("request execution");
    let text = body_text(metrics).await;
    assert!(text.contains("gateway_backend_attempts_total{backend=\"primary\",outcome=\"success\"} 1"));
}

#[test]
fn backend_result_debug_hides_stream_internals() {
    let payload = BackendResult::CompletePayload("x".to_owned());
    assert_eq!(format!("{payload:?}"), "CompletePayload(\"x\")");
}
