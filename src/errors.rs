use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    failover::{RouteError, TrialFailure},
    models::ValidationError,
};

const DETAIL_LIMIT: usize = 200;

/// Coarse classification of a failed backend trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Timeout,
    Auth,
    Quota,
    RateLimited,
    Generic,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Auth => "auth",
            FailureKind::Quota => "quota",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Generic => "error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            FailureKind::Auth => StatusCode::UNAUTHORIZED,
            FailureKind::Quota => StatusCode::PAYMENT_REQUIRED,
            FailureKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            FailureKind::Generic => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Maps upstream error text to a failure kind. Checked in order: timeout,
/// rate limit, quota, credentials.
pub fn classify_message(message: &str) -> FailureKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        FailureKind::Timeout
    } else if lower.contains("rate limit") || lower.contains("rate_limit") {
        FailureKind::RateLimited
    } else if lower.contains("quota") {
        FailureKind::Quota
    } else if lower.contains("invalid_api_key")
        || lower.contains("invalid api key")
        || lower.contains("unauthorized")
    {
        FailureKind::Auth
    } else {
        FailureKind::Generic
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("{0}")]
    Upstream(TrialFailure),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(error) => {
                make_error_response(StatusCode::BAD_REQUEST, error.to_string(), None, None)
            }
            AppError::Route(RouteError::NoBackendsConfigured) => make_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "No API services are configured. Please add at least one API key (OpenAI, Vapi, Retell, or Bland) to your environment variables.".to_owned(),
                None,
                None,
            ),
            AppError::Upstream(failure) => {
                let status = failure.kind.status();
                make_error_response(
                    status,
                    user_message(&failure),
                    Some(failure.backend),
                    Some(clip(&failure.cause, DETAIL_LIMIT)),
                )
            }
            AppError::Internal(message) => make_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                clip(&message, DETAIL_LIMIT),
                None,
                None,
            ),
        }
    }
}

fn user_message(failure: &TrialFailure) -> String {
    let name = &failure.backend;
    match failure.kind {
        FailureKind::Timeout => format!(
            "{name} service is taking too long to respond. The system attempted to use backup services but all available services are currently slow or unavailable. Please try again in a moment."
        ),
        FailureKind::Auth => {
            format!("Invalid API key for {name}. Please check your API key configuration.")
        }
        FailureKind::Quota => {
            format!("{name} quota exceeded. Please check your account usage.")
        }
        FailureKind::RateLimited => format!(
            "Rate limit exceeded ({name}). Please wait a moment before sending another message."
        ),
        FailureKind::Generic => format!(
            "All services failed. Last error from {name}. Please try again."
        ),
    }
}

fn make_error_response(
    status: StatusCode,
    error: String,
    service: Option<String>,
    detail: Option<String>,
) -> Response {
    let payload = ErrorBody {
        error,
        service,
        detail,
    };

    (status, Json(payload)).into_response()
}

pub fn clip(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let mut clipped = text.chars().take(limit).collect::<String>();
    clipped.push_str("...");
    clipped
}

pub fn apply_header(headers: &mut axum::http::HeaderMap, name: &str, value: &str) {
    let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
        return;
    };
    let Ok(header_value) = HeaderValue::from_str(value) else {
        return;
    };
    headers.insert(header_name, header_value);
}
