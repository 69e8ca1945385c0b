use std::time::Duration;

use prometheus::{
    opts, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct AppMetrics {
    registry: Registry,
    request_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    inflight_requests: IntGauge,
    backend_attempts_total: IntCounterVec,
    failovers_total: IntCounter,
    exhausted_total: IntCounterVec,
}

pub struct InflightGuard<'a> {
    metrics: &'a AppMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let request_total = IntCounterVec::new(
            opts!(
                "gateway_http_requests_total",
                "Total HTTP requests processed by gateway"
            ),
            &["path", "method", "status"],
        )
        .expect("valid request_total metric");

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_http_request_duration_seconds",
                "HTTP request latency in seconds",
            ),
            &["path", "method"],
        )
        .expect("valid request_duration_seconds metric");

        let inflight_requests = IntGauge::new(
            "gateway_inflight_requests",
            "Current in-flight requests at gateway",
        )
        .expect("valid inflight_requests metric");

        let backend_attempts_total = IntCounterVec::new(
            opts!(
                "gateway_backend_attempts_total",
                "Backend trials by backend and outcome"
            ),
            &["backend", "outcome"],
        )
        .expect("valid backend_attempts_total metric");

        let failovers_total = IntCounter::new(
            "gateway_failovers_total",
            "Transitions from a failed backend to the next candidate",
        )
        .expect("valid failovers_total metric");

        let exhausted_total = IntCounterVec::new(
            opts!(
                "gateway_exhausted_requests_total",
                "Requests where every candidate failed, by final failure kind"
            ),
            &["kind"],
        )
        .expect("valid exhausted_total metric");

        registry
            .register(Box::new(request_total.clone()))
            .expect("register request_total");
        registry
            .register(Box::new(request_duration_seconds.clone()))
            .expect("register request_duration_seconds");
        registry
            .register(Box::new(inflight_requests.clone()))
            .expect("register inflight_requests");
        registry
            .register(Box::new(backend_attempts_total.clone()))
            .expect("register backend_attempts_total");
        registry
            .register(Box::new(failovers_total.clone()))
            .expect("register failovers_total");
        registry
            .register(Box::new(exhausted_total.clone()))
            .expect("register exhausted_total");

        Self {
            registry,
            request_total,
            request_duration_seconds,
            inflight_requests,
            backend_attempts_total,
            failovers_total,
            exhausted_total,
        }
    }

    pub fn inflight_guard(&self) -> InflightGuard<'_> {
        self.inflight_requests.inc();
        InflightGuard { metrics: self }
    }

    pub fn observe_request(&self, path: &str, method: &str, status: u16, duration: Duration) {
        let status_label = status.to_string();
        self.request_total
            .with_label_values(&[path, method, &status_label])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[path, method])
            .observe(duration.as_secs_f64());
    }

    pub fn observe_attempt(&self, backend: &str, outcome: &str) {
        self.backend_attempts_total
            .with_label_values(&[backend, outcome])
            .inc();
    }

    pub fn observe_failover(&self) {
        self.failovers_total.inc();
    }

    pub fn observe_exhausted(&self, kind: &str) {
        self.exhausted_total.with_label_values(&[kind]).inc();
    }

    pub fn render(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|error| error.to_string())?;
        String::from_utf8(buffer).map_err(|error| error.to_string())
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.inflight_requests.dec();
    }
}
