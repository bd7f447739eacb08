//! Prometheus metrics for the connectivity layer
//!
//! Callers scrape via [`Metrics::render`]; the crate itself never exposes an
//! HTTP endpoint.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::OnceLock;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    /// Probe results by verdict ("valid" / "invalid")
    pub probes_total: IntCounterVec,
    /// Monitors currently running a probe loop
    pub monitors_active: IntGauge,
    /// Monitoring sessions currently registered
    pub contexts_active: IntGauge,
    /// Guarded operations aborted on an unhealthy verdict
    pub operations_aborted_total: IntCounter,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        let probes_total = IntCounterVec::new(
            Opts::new("argus_probes_total", "Probe results by verdict"),
            &["result"],
        )
        .unwrap();

        let monitors_active = IntGauge::new(
            "argus_monitors_active",
            "Number of node monitors currently running",
        )
        .unwrap();

        let contexts_active = IntGauge::new(
            "argus_contexts_active",
            "Number of monitoring sessions currently registered",
        )
        .unwrap();

        let operations_aborted_total = IntCounter::new(
            "argus_operations_aborted_total",
            "Guarded operations aborted because their node was judged unhealthy",
        )
        .unwrap();

        registry.register(Box::new(probes_total.clone())).unwrap();
        registry.register(Box::new(monitors_active.clone())).unwrap();
        registry.register(Box::new(contexts_active.clone())).unwrap();
        registry
            .register(Box::new(operations_aborted_total.clone()))
            .unwrap();

        Self {
            registry,
            probes_total,
            monitors_active,
            contexts_active,
            operations_aborted_total,
        }
    }

    /// Render all metrics in Prometheus text exposition format
    pub fn render(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        if encoder.encode(&families, &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
