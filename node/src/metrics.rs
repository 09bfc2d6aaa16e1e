//! # Prometheus Metrics
//!
//! Operational metrics for the API server, scraped by Prometheus at the
//! `/metrics` endpoint on the configured metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] prefixed with
//! `bursar_`, so they never collide with the default global registry.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Prometheus handles are reference-counted internally, so cloning is cheap.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Calls that committed.
    pub calls_committed_total: IntCounter,
    /// Calls that reverted, labelled by error code.
    pub calls_reverted_total: IntCounterVec,
    /// Time spent executing a submitted call, in seconds.
    pub call_latency_seconds: Histogram,
    /// Current length of the event log.
    pub event_log_length: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("bursar".into()), None)?;

        let calls_committed_total =
            IntCounter::new("calls_committed_total", "Total number of committed calls")?;
        registry.register(Box::new(calls_committed_total.clone()))?;

        let calls_reverted_total = IntCounterVec::new(
            Opts::new("calls_reverted_total", "Total number of reverted calls by error code"),
            &["code"],
        )?;
        registry.register(Box::new(calls_reverted_total.clone()))?;

        let call_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "call_latency_seconds",
                "Time spent executing a submitted call, in seconds",
            )
            .buckets(vec![0.00001, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(call_latency_seconds.clone()))?;

        let event_log_length =
            IntGauge::new("event_log_length", "Number of records in the event log")?;
        registry.register(Box::new(event_log_length.clone()))?;

        Ok(Self {
            registry,
            calls_committed_total,
            calls_reverted_total,
            call_latency_seconds,
            event_log_length,
        })
    }

    /// Records a committed call.
    pub fn record_commit(&self, seconds: f64, log_length: usize) {
        self.calls_committed_total.inc();
        self.call_latency_seconds.observe(seconds);
        self.event_log_length.set(log_length as i64);
    }

    /// Records a reverted call.
    pub fn record_revert(&self, seconds: f64, code: &str) {
        self.calls_reverted_total.with_label_values(&[code]).inc();
        self.call_latency_seconds.observe(seconds);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
