use std::sync::Arc;

use crate::{
    config::TimeoutPolicy,
    failover::{Clock, Failover},
    metrics::AppMetrics,
    registry::BackendRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub failover: Arc<Failover>,
    pub metrics: Arc<AppMetrics>,
}

impl AppState {
    pub fn new(registry: BackendRegistry, timeouts: TimeoutPolicy) -> Self {
        let metrics = Arc::new(AppMetrics::new());
        let failover = Failover::new(Arc::new(registry), timeouts, metrics.clone());
        Self {
            failover: Arc::new(failover),
            metrics,
        }
    }

    pub fn with_clock(
        registry: BackendRegistry,
        timeouts: TimeoutPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(AppMetrics::new());
        let failover =
            Failover::new(Arc::new(registry), timeouts, metrics.clone()).with_clock(clock);
        Self {
            failover: Arc::new(failover),
            metrics,
        }
    }
}
