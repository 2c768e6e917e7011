//! # Prometheus Metrics
//!
//! Operational metrics for the gateway, scraped at `/metrics` on the
//! dedicated metrics port. Registered in a custom [`prometheus::Registry`]
//! so nothing collides with a default global registry consumer.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Shared handle passed into request handlers and background tasks.
pub type SharedMetrics = Arc<GatewayMetrics>;

/// All Prometheus metric handles for the gateway.
pub struct GatewayMetrics {
    /// Registry that owns every metric below.
    registry: Registry,
    /// Transactions staged (proxy + purchases), total.
    pub staged_total: IntCounter,
    /// Commits that resolved `Committed`, total.
    pub committed_total: IntCounter,
    /// Commits that resolved `Failed` (first leg, clean), total.
    pub failed_total: IntCounter,
    /// Commits that resolved `PartiallyFailed` — each of these is a
    /// reconciliation case an operator must look at.
    pub partial_failures_total: IntCounter,
    /// Descriptors expired by the sweeper, total.
    pub expired_total: IntCounter,
    /// Descriptors currently held in the store (any state).
    pub pending_descriptors: IntGauge,
    /// Wall time of the commit path, seconds.
    pub commit_latency_seconds: Histogram,
}

impl GatewayMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("marquee".into()), None)
            .expect("failed to create prometheus registry");

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let c = IntCounter::new(name, help).expect("metric creation");
            registry.register(Box::new(c.clone())).expect("metric registration");
            c
        }

        let staged_total = counter(&registry, "staged_total", "Total staged transactions");
        let committed_total = counter(&registry, "committed_total", "Total committed transactions");
        let failed_total = counter(
            &registry,
            "failed_total",
            "Total commits failed on the first leg (no ledger effects)",
        );
        let partial_failures_total = counter(
            &registry,
            "partial_failures_total",
            "Total partial commit failures requiring reconciliation",
        );
        let expired_total = counter(
            &registry,
            "expired_total",
            "Total descriptors expired by the sweeper",
        );

        let pending_descriptors = IntGauge::new(
            "pending_descriptors",
            "Descriptors currently held in the staging store",
        )
        .expect("metric creation");
        registry
            .register(Box::new(pending_descriptors.clone()))
            .expect("metric registration");

        let commit_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("commit_latency_seconds", "Commit path latency in seconds")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(commit_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            staged_total,
            committed_total,
            failed_total,
            partial_failures_total,
            expired_total,
            pending_descriptors,
            commit_latency_seconds,
        }
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::error!("failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /metrics` handler for the metrics listener.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    (StatusCode::OK, metrics.render())
}
