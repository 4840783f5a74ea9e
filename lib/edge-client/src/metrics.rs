//! Prometheus metrics for one client handle

use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::error::{ClientError, Result};

/// Prometheus metrics collector for outbound requests and pooled connections.
///
/// Every handle owns its own registry; clones share it.
#[derive(Clone)]
pub struct ClientMetrics {
    /// Connections established, by host
    pub connections_opened_total: CounterVec,
    /// Connections currently alive (busy or idle), by host
    pub live_connections: IntGaugeVec,
    /// Completed requests by method and status
    pub requests_total: CounterVec,
    /// Requests that failed before a response was received
    pub request_errors_total: Counter,
    /// Request latency in seconds, by method
    pub request_duration_seconds: HistogramVec,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl ClientMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let connections_opened_total = CounterVec::new(
            Opts::new(
                "edge_client_connections_opened_total",
                "Total upstream connections opened",
            ),
            &["host"],
        )?;

        let live_connections = IntGaugeVec::new(
            Opts::new(
                "edge_client_live_connections",
                "Upstream connections currently open",
            ),
            &["host"],
        )?;

        let requests_total = CounterVec::new(
            Opts::new("edge_client_requests_total", "Total upstream requests"),
            &["method", "status"],
        )?;

        let request_errors_total = Counter::new(
            "edge_client_request_errors_total",
            "Total upstream requests failed at the transport",
        )?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "edge_client_request_duration_seconds",
                "Upstream request latency in seconds",
            ),
            &["method"],
        )?;

        registry.register(Box::new(connections_opened_total.clone()))?;
        registry.register(Box::new(live_connections.clone()))?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_errors_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        Ok(Self {
            connections_opened_total,
            live_connections,
            requests_total,
            request_errors_total,
            request_duration_seconds,
            registry,
        })
    }

    pub(crate) fn connection_opened(&self, host: &str) {
        self.connections_opened_total.with_label_values(&[host]).inc();
        self.live_connections.with_label_values(&[host]).inc();
    }

    pub(crate) fn connection_closed(&self, host: &str) {
        self.live_connections.with_label_values(&[host]).dec();
    }

    pub(crate) fn observe_response(&self, method: &str, status: u16, seconds: f64) {
        let status = status.to_string();
        self.requests_total
            .with_label_values(&[method, status.as_str()])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method])
            .observe(seconds);
    }

    pub(crate) fn observe_error(&self, method: &str, seconds: f64) {
        self.request_errors_total.inc();
        self.request_duration_seconds
            .with_label_values(&[method])
            .observe(seconds);
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| ClientError::InvalidConfiguration(format!("metrics are not UTF-8: {}", e)))
    }
}
