//! Metrics collection for TaskBridge
//!
//! This module provides Prometheus metrics for the request bridge and the
//! liveness reporter. The global registry is exposed on `/metrics`.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics registry for TaskBridge
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub bridge: BridgeMetrics,
    pub liveness: LivenessMetrics,
}

/// Request bridge metrics
#[derive(Debug, Clone)]
pub struct BridgeMetrics {
    /// Total number of task requests
    pub requests_total: IntCounter,

    /// Total number of completed tasks
    pub requests_success: IntCounter,

    /// Total number of failed tasks (timeouts included)
    pub requests_failed: IntCounter,

    /// Tasks that hit the deadline
    pub requests_timed_out: IntCounter,

    /// Request duration histogram
    pub request_duration: Histogram,

    /// Token units received from the backend
    pub tokens_received_total: IntCounter,

    /// Current in-flight tasks
    pub active_requests: IntGauge,
}

/// Liveness reporter metrics
#[derive(Debug, Clone)]
pub struct LivenessMetrics {
    pub heartbeats_sent: IntCounter,
    pub heartbeats_failed: IntCounter,
    pub registration_attempts: IntCounter,
    pub registration_failures: IntCounter,
}

lazy_static! {
    /// Global metrics registry instance
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let metric = IntCounter::new(name, help).expect("valid counter definition");
    registry
        .register(Box::new(metric.clone()))
        .expect("counter registered once");
    metric
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let metric = IntGauge::new(name, help).expect("valid gauge definition");
    registry
        .register(Box::new(metric.clone()))
        .expect("gauge registered once");
    metric
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        // Bridge metrics
        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "task_request_duration_seconds",
                "Task request duration in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
        )
        .expect("valid histogram definition");
        registry
            .register(Box::new(request_duration.clone()))
            .expect("histogram registered once");

        let bridge = BridgeMetrics {
            requests_total: counter(&registry, "task_requests_total", "Total number of task requests"),
            requests_success: counter(
                &registry,
                "task_requests_success_total",
                "Total number of completed task requests",
            ),
            requests_failed: counter(
                &registry,
                "task_requests_failed_total",
                "Total number of failed task requests",
            ),
            requests_timed_out: counter(
                &registry,
                "task_requests_timeout_total",
                "Total number of task requests that timed out",
            ),
            request_duration,
            tokens_received_total: counter(
                &registry,
                "task_tokens_received_total",
                "Total number of token units received for tasks",
            ),
            active_requests: gauge(
                &registry,
                "task_active_requests",
                "Current number of in-flight task requests",
            ),
        };

        // Liveness metrics
        let liveness = LivenessMetrics {
            heartbeats_sent: counter(
                &registry,
                "liveness_heartbeats_sent_total",
                "Heartbeats accepted by the registry",
            ),
            heartbeats_failed: counter(
                &registry,
                "liveness_heartbeats_failed_total",
                "Heartbeats that failed or were rejected",
            ),
            registration_attempts: counter(
                &registry,
                "liveness_registration_attempts_total",
                "Registration attempts made by this node",
            ),
            registration_failures: counter(
                &registry,
                "liveness_registration_failures_total",
                "Registration handshakes that failed",
            ),
        };

        MetricsRegistry {
            registry,
            bridge,
            liveness,
        }
    }

    /// Gather all metrics as text
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# failed to encode metrics: {}\n", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
