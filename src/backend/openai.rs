use std::fmt::Display;

use async_trait::async_trait;
use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    backend::{BackendError, BackendResult, ChatBackend, FramedStream},
    config::{ConfigError, Credential, OpenAiConfig},
    errors::clip,
    framing::{Frame, FrameUsage},
    models::{Conversation, Persona},
};

const CREDENTIAL: Credential = Credential::new("OPENAI_API_KEY", "your-openai-api-key-here");

/// Pass-through backend for an OpenAI-compatible chat endpoint.
#[derive(Clone)]
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiAdapter {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| ConfigError::HttpClient(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ChatBackend for OpenAiAdapter {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn is_available(&self) -> bool {
        CREDENTIAL.is_present()
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        _persona: &Persona,
    ) -> Result<BackendResult, BackendError> {
        let api_key = CREDENTIAL.value().ok_or_else(|| {
            BackendError::Unauthorized("OPENAI_API_KEY is not configured".to_owned())
        })?;

        let payload = json!({
            "model": self.model,
            "messages": conversation.messages(),
            "temperature": 0.7,
            "max_tokens": 300,
            "stream": true,
            "stream_options": {
                "include_usage": true
            }
        });

        let response = self
            .client
            .post(self.url("/chat/completions"))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    BackendError::Timeout(error.to_string())
                } else {
                    BackendError::from_upstream_message(error.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(map_http_error(
                response.status(),
                response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown backend error".to_owned()),
            ));
        }

        debug!(backend = self.name(), model = %self.model, "stream prepared");
        Ok(BackendResult::NativeStream(frame_sse_stream(
            response.bytes_stream(),
        )))
    }
}

/// Translates an OpenAI SSE body into wire records as it arrives: one `0:`
/// record per content delta, then the completion record and terminator.
pub fn frame_sse_stream<S, E>(upstream: S) -> FramedStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut upstream = Box::pin(upstream);
        let mut buffer: Vec<u8> = Vec::new();
        let mut finish_reason: Option<String> = None;
        let mut usage = FrameUsage::PLACEHOLDER;
        let mut failed = false;

        'read: while let Some(next) = upstream.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(error) => {
                    yield Err(BackendError::from_upstream_message(error.to_string()));
                    failed = true;
                    break;
                }
            };

            buffer.extend_from_slice(&bytes);

            // Chunks may split a character; only whole lines are decoded.
            while let Some(index) = buffer.iter().position(|byte| *byte == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=index).collect();
                let line = match std::str::from_utf8(&raw) {
                    Ok(line) => line.trim().to_owned(),
                    Err(error) => {
                        yield Err(BackendError::InvalidResponse(error.to_string()));
                        failed = true;
                        break 'read;
                    }
                };

                let Some(payload) = line.strip_prefix("data:") else {
                    continue;
                };
                let payload = payload.trim();

                if payload == "[DONE]" {
                    break 'read;
                }

                let parsed: OpenAiStreamResponse = match serde_json::from_str(payload) {
                    Ok(parsed) => parsed,
                    Err(error) => {
                        yield Err(BackendError::InvalidResponse(error.to_string()));
                        failed = true;
                        break 'read;
                    }
                };

                if let Some(reported) = parsed.usage {
                    usage = FrameUsage {
                        prompt_tokens: reported.prompt_tokens,
                        completion_tokens: reported.completion_tokens,
                    };
                }

                if let Some(choice) = parsed.choices.into_iter().next() {
                    if let Some(content) = choice.delta.content.filter(|value| !value.is_empty()) {
                        yield Frame::Text(content)
                            .encode()
                            .map_err(|error| BackendError::InvalidResponse(error.to_string()));
                    }
                    if let Some(reason) = choice.finish_reason {
                        finish_reason = Some(reason);
                    }
                }
            }
        }

        if !failed {
            let closing = [
                Frame::Finish {
                    finish_reason: finish_reason.unwrap_or_else(|| "stop".to_owned()),
                    usage,
                },
                Frame::Terminator,
            ];
            for frame in closing {
                yield frame
                    .encode()
                    .map_err(|error| BackendError::InvalidResponse(error.to_string()));
            }
        }
    };

    stream.boxed()
}

fn map_http_error(status: StatusCode, body: String) -> BackendError {
    let trimmed = clip(&body, 400);
    let quota = body.contains("insufficient_quota");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BackendError::Unauthorized(format!("status {}: {trimmed}", status.as_u16()))
        }
        StatusCode::PAYMENT_REQUIRED => BackendError::QuotaExceeded(trimmed),
        StatusCode::TOO_MANY_REQUESTS if quota => BackendError::QuotaExceeded(trimmed),
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited(trimmed),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            BackendError::Timeout(format!("upstream timeout: {trimmed}"))
        }
        _ => BackendError::InvalidResponse(format!("status {}: {trimmed}", status.as_u16())),
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
