pub mod mock;
pub mod openai;
pub mod synthetic;
pub mod templates;

use std::fmt;

use async_trait::async_trait;
use axum::body::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::{
    errors::{classify_message, FailureKind},
    models::{Conversation, Persona},
};

/// Newline-terminated wire records, ready for the response body.
pub type FramedStream = BoxStream<'static, Result<Bytes, BackendError>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;
    /// Re-evaluated on every request; credentials may appear at runtime.
    fn is_available(&self) -> bool;
    async fn invoke(
        &self,
        conversation: &Conversation,
        persona: &Persona,
    ) -> Result<BackendResult, BackendError>;
}

pub enum BackendResult {
    NativeStream(FramedStream),
    CompletePayload(String),
}

impl fmt::Debug for BackendResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendResult::NativeStream(_) => f.write_str("NativeStream(..)"),
            BackendResult::CompletePayload(content) => {
                f.debug_tuple("CompletePayload").field(content).finish()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend timeout: {0}")]
    Timeout(String),
    #[error("invalid_api_key: {0}")]
    Unauthorized(String),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("rate limit: {0}")]
    RateLimited(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Builds an error from free-form upstream text, e.g. a transport failure
    /// that carries no status code.
    pub fn from_upstream_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_message(&message) {
            FailureKind::Timeout => BackendError::Timeout(message),
            FailureKind::Auth => BackendError::Unauthorized(message),
            FailureKind::Quota => BackendError::QuotaExceeded(message),
            FailureKind::RateLimited => BackendError::RateLimited(message),
            FailureKind::Generic => BackendError::Unavailable(message),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::Timeout(_) => FailureKind::Timeout,
            BackendError::Unauthorized(_) => FailureKind::Auth,
            BackendError::QuotaExceeded(_) => FailureKind::Quota,
            BackendError::RateLimited(_) => FailureKind::RateLimited,
            BackendError::Unavailable(_) | BackendError::InvalidResponse(_) => {
                FailureKind::Generic
            }
        }
    }
}
