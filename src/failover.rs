use std::{fmt, sync::Arc, time::Duration};

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    backend::{BackendError, BackendResult},
    config::TimeoutPolicy,
    errors::FailureKind,
    metrics::AppMetrics,
    models::ChatTurn,
    registry::{BackendDescriptor, BackendRegistry},
};

/// Timer source for trial budgets.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no chat backends are available")]
    NoBackendsConfigured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialFailure {
    pub backend: String,
    pub kind: FailureKind,
    pub cause: String,
}

impl TrialFailure {
    fn timed_out(backend: &str, budget: Duration) -> Self {
        Self {
            backend: backend.to_owned(),
            kind: FailureKind::Timeout,
            cause: format!("{backend} service timeout after {}ms", budget.as_millis()),
        }
    }

    fn from_error(backend: &str, error: &BackendError) -> Self {
        Self {
            backend: backend.to_owned(),
            kind: error.kind(),
            cause: error.to_string(),
        }
    }

    /// `timeout` or `error`, as logged per trial.
    pub fn label(&self) -> &'static str {
        match self.kind {
            FailureKind::Timeout => "timeout",
            _ => "error",
        }
    }
}

impl fmt::Display for TrialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.backend, self.label(), self.cause)
    }
}

#[derive(Debug)]
pub enum FailoverOutcome {
    Success {
        result: BackendResult,
        source: String,
    },
    Exhausted {
        last_failure: TrialFailure,
        tried: Vec<String>,
    },
}

/// Walks the candidate list one backend at a time, each trial racing its
/// own timeout.
pub struct Failover {
    registry: Arc<BackendRegistry>,
    timeouts: TimeoutPolicy,
    clock: Arc<dyn Clock>,
    metrics: Arc<AppMetrics>,
}

impl Failover {
    pub fn new(
        registry: Arc<BackendRegistry>,
        timeouts: TimeoutPolicy,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            registry,
            timeouts,
            clock: Arc::new(TokioClock),
            metrics,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub async fn route(&self, turn: &ChatTurn) -> Result<FailoverOutcome, RouteError> {
        let candidates = self
            .registry
            .candidates(turn.preferred_service.as_deref());
        if candidates.is_empty() {
            warn!(request_id = %turn.request_id, "no backends available");
            return Err(RouteError::NoBackendsConfigured);
        }

        info!(
            request_id = %turn.request_id,
            candidates = %candidates
                .iter()
                .map(BackendDescriptor::name)
                .collect::<Vec<_>>()
                .join(", "),
            "routing chat request"
        );
        self.run(&candidates, turn).await
    }

    async fn run(
        &self,
        candidates: &[BackendDescriptor],
        turn: &ChatTurn,
    ) -> Result<FailoverOutcome, RouteError> {
        let mut tried = Vec::with_capacity(candidates.len());

        for (index, candidate) in candidates.iter().enumerate() {
            let name = candidate.name();
            let budget = self.timeouts.for_backend(name);
            tried.push(name.to_owned());

            let started = Instant::now();
            match self.attempt(candidate, turn, budget).await {
                Ok(result) => {
                    self.metrics.observe_attempt(name, "success");
                    info!(
                        request_id = %turn.request_id,
                        backend = %name,
                        latency_ms = started.elapsed().as_millis() as u64,
                        attempts = tried.len(),
                        "backend completed successfully"
                    );
                    return Ok(FailoverOutcome::Success {
                        result,
                        source: name.to_owned(),
                    });
                }
                Err(failure) => {
                    self.metrics.observe_attempt(name, failure.label());
                    let Some(next) = candidates.get(index + 1) else {
                        warn!(
                            request_id = %turn.request_id,
                            failed = %name,
                            reason = failure.label(),
                            cause = %failure.cause,
                            tried = %tried.join(", "),
                            "all backends failed"
                        );
                        return Ok(FailoverOutcome::Exhausted {
                            last_failure: failure,
                            tried,
                        });
                    };

                    self.metrics.observe_failover();
                    warn!(
                        request_id = %turn.request_id,
                        failed = %name,
                        next = %next.name(),
                        reason = failure.label(),
                        cause = %failure.cause,
                        "backend failed, failing over"
                    );
                }
            }
        }

        Err(RouteError::NoBackendsConfigured)
    }

    /// The timer is polled first, so a backend finishing exactly at the
    /// budget counts as timed out. The losing future is dropped.
    async fn attempt(
        &self,
        candidate: &BackendDescriptor,
        turn: &ChatTurn,
        budget: Duration,
    ) -> Result<BackendResult, TrialFailure> {
        let name = candidate.name();
        let timer = self.clock.sleep(budget);
        let call = candidate
            .backend()
            .invoke(&turn.conversation, &turn.persona);

        tokio::select! {
            biased;
            _ = timer => Err(TrialFailure::timed_out(name, budget)),
            outcome = call => outcome.map_err(|error| TrialFailure::from_error(name, &error)),
        }
    }
}
