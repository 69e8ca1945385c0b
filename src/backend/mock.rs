use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::body::Bytes;
use futures_util::StreamExt;
use tokio::{sync::mpsc, time::sleep};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::backend::{BackendError, BackendResult, ChatBackend};
use crate::models::{Conversation, Persona};

#[derive(Debug, Clone)]
enum Script {
    Reply(String),
    Stream(Vec<String>),
    Fail(BackendError),
    Hang,
}

/// Backend with a fixed, scripted behaviour. Counts its invocations.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    name: String,
    script: Script,
    delay: Duration,
    available: bool,
    calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    fn new(name: impl Into<String>, script: Script) -> Self {
        Self {
            name: name.into(),
            script,
            delay: Duration::ZERO,
            available: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn replying(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::new(name, Script::Reply(reply.into()))
    }

    /// Emits each chunk verbatim as a native stream.
    pub fn streaming(name: impl Into<String>, chunks: Vec<String>) -> Self {
        Self::new(name, Script::Stream(chunks))
    }

    pub fn failing(name: impl Into<String>, error: BackendError) -> Self {
        Self::new(name, Script::Fail(error))
    }

    /// Never resolves.
    pub fn hanging(name: impl Into<String>) -> Self {
        Self::new(name, Script::Hang)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Shared counter, still readable after the backend moves into a registry.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn invoke(
        &self,
        _conversation: &Conversation,
        _persona: &Persona,
    ) -> Result<BackendResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match &self.script {
            Script::Reply(reply) => Ok(BackendResult::CompletePayload(reply.clone())),
            Script::Fail(error) => Err(error.clone()),
            Script::Hang => std::future::pending().await,
            Script::Stream(chunks) => {
                let chunks = chunks.clone();
                let (tx, rx) = mpsc::channel::<Result<Bytes, BackendError>>(8);
                tokio::spawn(async move {
                    for chunk in chunks {
                        if tx.send(Ok(Bytes::from(chunk))).await.is_err() {
                            return;
                        }
                    }
                });

                debug!(backend = %self.name, "scripted stream prepared");
                Ok(BackendResult::NativeStream(ReceiverStream::new(rx).boxed()))
            }
        }
    }
}
