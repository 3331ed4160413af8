//! Observability infrastructure for the scheduler
//!
//! Provides:
//! - Prometheus metrics (round latency, optimizer latency, buffered pods, binding outcomes)
//! - Structured JSON logging with tracing

use crate::models::{MetricsSnapshot, Node, PodRef};
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_gauge, Gauge,
    Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for round and optimizer durations (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SchedulerMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct SchedulerMetricsInner {
    round_latency_seconds: Histogram,
    optimizer_latency_seconds: Histogram,
    buffered_pods: IntGauge,
    rounds_total: IntCounter,
    pods_scheduled: IntCounter,
    binding_failures: IntCounter,
    telemetry_fallbacks: IntCounter,
    best_fitness: Gauge,
}

impl SchedulerMetricsInner {
    fn new() -> Self {
        Self {
            round_latency_seconds: register_histogram!(
                "pso_scheduler_round_latency_seconds",
                "Time spent on a full scheduling round, from drain to last binding",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register round_latency_seconds"),

            optimizer_latency_seconds: register_histogram!(
                "pso_scheduler_optimizer_latency_seconds",
                "Time spent in the particle swarm search",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register optimizer_latency_seconds"),

            buffered_pods: register_int_gauge!(
                "pso_scheduler_buffered_pods",
                "Pods drained from the buffer at the last tick"
            )
            .expect("Failed to register buffered_pods"),

            rounds_total: register_int_counter!(
                "pso_scheduler_rounds_total",
                "Number of optimization rounds run"
            )
            .expect("Failed to register rounds_total"),

            pods_scheduled: register_int_counter!(
                "pso_scheduler_pods_scheduled_total",
                "Number of pods successfully bound"
            )
            .expect("Failed to register pods_scheduled"),

            binding_failures: register_int_counter!(
                "pso_scheduler_binding_failures_total",
                "Number of pod bindings rejected or failed"
            )
            .expect("Failed to register binding_failures"),

            telemetry_fallbacks: register_int_counter!(
                "pso_scheduler_telemetry_fallbacks_total",
                "Number of telemetry readings replaced by fallback values"
            )
            .expect("Failed to register telemetry_fallbacks"),

            best_fitness: register_gauge!(
                "pso_scheduler_best_fitness",
                "Best fitness found in the last optimization round"
            )
            .expect("Failed to register best_fitness"),
        }
    }
}

/// Scheduler metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct SchedulerMetrics {
    _private: (),
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SchedulerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SchedulerMetricsInner {
        GLOBAL_METRICS.get_or_init(SchedulerMetricsInner::new)
    }

    pub fn observe_round_latency(&self, duration_secs: f64) {
        self.inner().round_latency_seconds.observe(duration_secs);
    }

    pub fn observe_optimizer_latency(&self, duration_secs: f64) {
        self.inner().optimizer_latency_seconds.observe(duration_secs);
    }

    pub fn set_buffered_pods(&self, count: i64) {
        self.inner().buffered_pods.set(count);
    }

    pub fn inc_rounds(&self) {
        self.inner().rounds_total.inc();
    }

    pub fn inc_pods_scheduled(&self) {
        self.inner().pods_scheduled.inc();
    }

    pub fn inc_binding_failures(&self) {
        self.inner().binding_failures.inc();
    }

    pub fn inc_telemetry_fallbacks(&self) {
        self.inner().telemetry_fallbacks.inc();
    }

    pub fn set_best_fitness(&self, fitness: f64) {
        self.inner().best_fitness.set(fitness);
    }
}

/// Structured logger for scheduler events
///
/// Provides consistent JSON-formatted logging for rounds, bindings
/// and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    scheduler_name: String,
}

impl StructuredLogger {
    pub fn new(scheduler_name: impl Into<String>) -> Self {
        Self {
            scheduler_name: scheduler_name.into(),
        }
    }

    /// Log the start of an optimization round
    pub fn log_round_started(&self, batch_size: usize, snapshot: &MetricsSnapshot) {
        info!(
            event = "round_started",
            scheduler = %self.scheduler_name,
            batch_size = batch_size,
            snapshot = ?snapshot,
            "Pods ready to be scheduled"
        );
    }

    /// Log the optimizer result for a round
    pub fn log_round_result(&self, positions: &[f64], nodes: &[Node], best_fitness: f64) {
        let node_names: Vec<&str> = nodes.iter().map(|n| n.name()).collect();
        info!(
            event = "round_optimized",
            scheduler = %self.scheduler_name,
            positions = ?positions,
            nodes = ?node_names,
            best_fitness = best_fitness,
            "Swarm search produced assignment"
        );
    }

    /// Log a round's dispatch summary
    pub fn log_round_complete(&self, succeeded: usize, failed: usize, elapsed_ms: u128) {
        if failed > 0 {
            warn!(
                event = "round_complete",
                scheduler = %self.scheduler_name,
                succeeded = succeeded,
                failed = failed,
                elapsed_ms = elapsed_ms,
                "Scheduling round finished with binding failures"
            );
        } else {
            info!(
                event = "round_complete",
                scheduler = %self.scheduler_name,
                succeeded = succeeded,
                elapsed_ms = elapsed_ms,
                "Scheduling round finished"
            );
        }
    }

    /// Log a successful binding
    pub fn log_binding(&self, pod: &PodRef, node: Node) {
        info!(
            event = "pod_bound",
            scheduler = %self.scheduler_name,
            pod_name = %pod.name,
            namespace = %pod.namespace,
            node = %node,
            "Scheduled pod to node"
        );
    }

    /// Log a failed binding
    pub fn log_binding_failure(&self, pod: &PodRef, node: Node, error: &str) {
        warn!(
            event = "pod_bind_failed",
            scheduler = %self.scheduler_name,
            pod_name = %pod.name,
            namespace = %pod.namespace,
            node = %node,
            error = %error,
            "Failed to schedule pod to node"
        );
    }

    /// Log scheduler startup
    pub fn log_startup(&self, version: &str, config: &impl std::fmt::Debug) {
        info!(
            event = "scheduler_started",
            scheduler = %self.scheduler_name,
            version = %version,
            config = ?config,
            "PSO scheduler started"
        );
    }

    /// Log scheduler shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scheduler_shutdown",
            scheduler = %self.scheduler_name,
            reason = %reason,
            "PSO scheduler shutting down"
        );
    }
}
