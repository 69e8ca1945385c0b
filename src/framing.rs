//! Wire framing shared by native and synthesized replies.
//!
//! Every successful reply is a sequence of newline-terminated records:
//! `0:` carries a JSON string of text, `d:` a JSON completion object and
//! `e:` closes the stream.

use axum::body::Bytes;
use futures_util::{stream, StreamExt};
use serde::Serialize;

use crate::backend::{BackendError, BackendResult, FramedStream};

pub const TERMINATOR: &str = "e:null\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl FrameUsage {
    /// Counters reported for synthesized replies, which have no real usage.
    pub const PLACEHOLDER: FrameUsage = FrameUsage {
        prompt_tokens: 0,
        completion_tokens: 1,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Finish {
        finish_reason: String,
        usage: FrameUsage,
    },
    Terminator,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinishRecord<'a> {
    finish_reason: &'a str,
    usage: FrameUsage,
}

impl Frame {
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        let line = match self {
            Frame::Text(text) => format!("0:{}\n", serde_json::to_string(text)?),
            Frame::Finish {
                finish_reason,
                usage,
            } => format!(
                "d:{}\n",
                serde_json::to_string(&FinishRecord {
                    finish_reason,
                    usage: *usage,
                })?
            ),
            Frame::Terminator => TERMINATOR.to_owned(),
        };
        Ok(Bytes::from(line))
    }
}

/// Encodes a complete payload as `[text, completion, terminator]`. All three
/// records are built before anything is emitted.
pub fn synthesize(content: &str) -> Result<Vec<Bytes>, serde_json::Error> {
    [
        Frame::Text(content.to_owned()),
        Frame::Finish {
            finish_reason: "stop".to_owned(),
            usage: FrameUsage::PLACEHOLDER,
        },
        Frame::Terminator,
    ]
    .iter()
    .map(Frame::encode)
    .collect()
}

pub fn normalize(result: BackendResult) -> FramedStream {
    match result {
        BackendResult::NativeStream(native) => native,
        BackendResult::CompletePayload(content) => match synthesize(&content) {
            Ok(records) => stream::iter(records.into_iter().map(Ok)).boxed(),
            Err(error) => stream::once(async move {
                Err(BackendError::InvalidResponse(format!(
                    "failed to frame payload: {error}"
                )))
            })
            .boxed(),
        },
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;

    async fn collect(stream: FramedStream) -> String {
        let chunks: Vec<Bytes> = stream.try_collect().await.expect("stream should succeed");
        chunks
            .iter()
            .map(|chunk| std::str::from_utf8(chunk).expect("utf-8 frame"))
            .collect()
    }

    #[tokio::test]
    async fn complete_payload_becomes_three_records() {
        let body = collect(normalize(BackendResult::CompletePayload(
            "Hello there".to_owned(),
        )))
        .await;

        assert_eq!(
            body,
            "0:\"Hello there\"\n\
             d:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":0,\"completionTokens\":1}}\n\
             e:null\n"
        );
    }

    #[test]
    fn text_record_escapes_quotes_and_newlines() {
        let records = synthesize("She said \"hi\"\nthen left").expect("frames");
        assert_eq!(records.len(), 3);
        assert_eq!(
            &records[0][..],
            b"0:\"She said \\\"hi\\\"\\nthen left\"\n".as_slice()
        );
    }

    #[test]
    fn synthesizing_twice_is_byte_identical() {
        let payload = "Line one\nLine \"two\" \u{1F600}";
        assert_eq!(
            synthesize(payload).expect("first"),
            synthesize(payload).expect("second")
        );
    }

    #[tokio::test]
    async fn native_stream_passes_through_untouched() {
        let native = stream::iter(vec![
            Ok(Bytes::from_static(b"0:\"a\"\n")),
            Ok(Bytes::from_static(b"0:\"b\"\n")),
        ])
        .boxed();

        let body = collect(normalize(BackendResult::NativeStream(native))).await;
        assert_eq!(body, "0:\"a\"\n0:\"b\"\n");
    }
}
