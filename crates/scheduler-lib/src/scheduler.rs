//! Batch scheduling loop
//!
//! On every tick the loop drains the pod buffer, takes a fresh telemetry
//! snapshot, runs one swarm search for the whole batch and dispatches the
//! resulting bindings. Rounds run to completion inside the tick handler, so
//! two rounds never overlap.

use crate::buffer::PodBuffer;
use crate::dispatch::{Binder, DispatchReport, Dispatcher};
use crate::error::{Result, SchedulerError};
use crate::health::{components, HealthRegistry};
use crate::mapper::map_assignment;
use crate::models::{Assignment, PodRef};
use crate::observability::{SchedulerMetrics, StructuredLogger};
use crate::optimizer::{OptimizerConfig, ParticleSwarm};
use crate::telemetry::MetricsSource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Default time between scheduling rounds
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Default drained-batch size above which a warning is logged
pub const DEFAULT_BUFFER_HIGH_WATER: usize = 1000;

/// Configuration for the batch scheduling loop
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Time between drains of the pod buffer
    pub tick_interval: Duration,
    /// Drained batch size that triggers a backlog warning
    pub buffer_high_water: usize,
    /// Swarm and fitness parameters
    pub optimizer: OptimizerConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            buffer_high_water: DEFAULT_BUFFER_HIGH_WATER,
            optimizer: OptimizerConfig::default(),
        }
    }
}

/// Outcome of one non-empty scheduling round
#[derive(Debug)]
pub struct RoundReport {
    pub batch_size: usize,
    pub best_fitness: f64,
    pub dispatch: DispatchReport,
}

/// Periodic drain, optimize and dispatch loop
pub struct BatchScheduler {
    buffer: Arc<PodBuffer>,
    source: Arc<dyn MetricsSource>,
    dispatcher: Dispatcher,
    optimizer: ParticleSwarm,
    config: BatchConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: SchedulerMetrics,
}

impl BatchScheduler {
    pub fn new(
        buffer: Arc<PodBuffer>,
        source: Arc<dyn MetricsSource>,
        binder: Arc<dyn Binder>,
        config: BatchConfig,
        health: HealthRegistry,
    ) -> Self {
        let logger = StructuredLogger::new(buffer.scheduler_name());

        Self {
            dispatcher: Dispatcher::new(binder, logger.clone()),
            optimizer: ParticleSwarm::new(config.optimizer),
            buffer,
            source,
            config,
            health,
            logger,
            metrics: SchedulerMetrics::new(),
        }
    }

    /// Run rounds on every tick until shutdown
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.tick_interval.as_secs_f64(),
            iterations = self.config.optimizer.iterations,
            swarm_size = self.config.optimizer.swarm_size,
            "Starting batch scheduler"
        );

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_round().await {
                        Ok(Some(report)) => {
                            debug!(
                                batch_size = report.batch_size,
                                failed = report.dispatch.failure_count(),
                                "Round finished"
                            );
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!(error = %e, "Scheduling round failed");
                            self.health
                                .set_degraded(components::SCHEDULER, e.to_string())
                                .await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down batch scheduler");
                    break;
                }
            }
        }
    }

    /// Run one round over whatever is buffered
    ///
    /// Returns `Ok(None)` when the buffer was empty; the optimizer is not run
    /// and no telemetry is fetched.
    pub async fn run_round(&self) -> Result<Option<RoundReport>> {
        let pods = self.buffer.drain_all();
        self.metrics.set_buffered_pods(pods.len() as i64);
        if pods.is_empty() {
            return Ok(None);
        }

        let start = Instant::now();
        if pods.len() > self.config.buffer_high_water {
            warn!(
                batch_size = pods.len(),
                high_water = self.config.buffer_high_water,
                "Pod backlog above high-water mark"
            );
        }

        let snapshot = self.source.snapshot().await;
        self.logger.log_round_started(pods.len(), &snapshot);

        let optimizer = self.optimizer.clone();
        let batch_size = pods.len();
        let search_start = Instant::now();
        let outcome = tokio::task::spawn_blocking(move || optimizer.optimize(&snapshot, batch_size))
            .await
            .map_err(|e| {
                let names: Vec<String> = pods.iter().map(PodRef::to_string).collect();
                error!(pods = ?names, "Dropping batch after optimizer failure");
                SchedulerError::Optimizer(e.to_string())
            })?;
        self.metrics
            .observe_optimizer_latency(search_start.elapsed().as_secs_f64());
        self.metrics.set_best_fitness(outcome.best_fitness);
        self.metrics.inc_rounds();

        let nodes = map_assignment(&outcome.best_position);
        self.logger
            .log_round_result(&outcome.best_position, &nodes, outcome.best_fitness);

        let assignments: Vec<Assignment> = pods
            .into_iter()
            .zip(nodes)
            .map(|(pod, node)| Assignment { pod, node })
            .collect();

        let dispatch = self.dispatcher.dispatch_batch(assignments).await;
        self.update_health(&dispatch).await;

        let elapsed = start.elapsed();
        self.metrics.observe_round_latency(elapsed.as_secs_f64());
        self.logger.log_round_complete(
            dispatch.success_count(),
            dispatch.failure_count(),
            elapsed.as_millis(),
        );

        Ok(Some(RoundReport {
            batch_size,
            best_fitness: outcome.best_fitness,
            dispatch,
        }))
    }

    async fn update_health(&self, dispatch: &DispatchReport) {
        self.health.set_healthy(components::SCHEDULER).await;

        let failed = dispatch.failure_count();
        if failed == 0 {
            self.health.set_healthy(components::DISPATCHER).await;
        } else {
            let total = failed + dispatch.success_count();
            self.health
                .set_degraded(
                    components::DISPATCHER,
                    format!("{} of {} bindings failed in last round", failed, total),
                )
                .await;
        }
    }
}

/// Builder for creating the batch scheduler
pub struct BatchSchedulerBuilder {
    buffer: Option<Arc<PodBuffer>>,
    source: Option<Arc<dyn MetricsSource>>,
    binder: Option<Arc<dyn Binder>>,
    health: Option<HealthRegistry>,
    config: BatchConfig,
}

impl BatchSchedulerBuilder {
    pub fn new() -> Self {
        Self {
            buffer: None,
            source: None,
            binder: None,
            health: None,
            config: BatchConfig::default(),
        }
    }

    pub fn buffer(mut self, buffer: Arc<PodBuffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn metrics_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn binder(mut self, binder: Arc<dyn Binder>) -> Self {
        self.binder = Some(binder);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    pub fn buffer_high_water(mut self, high_water: usize) -> Self {
        self.config.buffer_high_water = high_water;
        self
    }

    pub fn optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.config.optimizer = optimizer;
        self
    }

    pub fn build(self) -> anyhow::Result<BatchScheduler> {
        let buffer = self
            .buffer
            .ok_or_else(|| anyhow::anyhow!("Pod buffer is required"))?;
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Metrics source is required"))?;
        let binder = self
            .binder
            .ok_or_else(|| anyhow::anyhow!("Binder is required"))?;

        Ok(BatchScheduler::new(
            buffer,
            source,
            binder,
            self.config,
            self.health.unwrap_or_default(),
        ))
    }
}

impl Default for BatchSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricsSnapshot, Node, NodeLoads, RegionLatencies};
    use crate::telemetry::StaticMetricsSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const SCHEDULER: &str = "custom-scheduler";

    /// Static source that counts snapshot requests
    struct CountingSource {
        inner: StaticMetricsSource,
        calls: AtomicUsize,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                inner: StaticMetricsSource::new(MetricsSnapshot::new(
                    RegionLatencies::new(10.0, 500.0, 1000.0),
                    NodeLoads::new([50.0; 6]),
                )),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetricsSource for CountingSource {
        async fn region_latencies(&self) -> RegionLatencies {
            self.inner.region_latencies().await
        }

        async fn node_loads(&self) -> NodeLoads {
            self.inner.node_loads().await
        }

        async fn snapshot(&self) -> MetricsSnapshot {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.snapshot().await
        }
    }

    /// Records bind attempts, failing for the named pods
    struct MockBinder {
        attempts: Mutex<Vec<(String, Node)>>,
        failing: Vec<String>,
    }

    impl MockBinder {
        fn new(failing: &[&str]) -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                failing: failing.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn attempted(&self) -> Vec<String> {
            self.attempts
                .lock()
                .unwrap()
                .iter()
                .map(|(name, _)| name.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Binder for MockBinder {
        async fn bind(&self, pod: &PodRef, node: Node) -> Result<()> {
            self.attempts.lock().unwrap().push((pod.name.clone(), node));
            if self.failing.contains(&pod.name) {
                return Err(SchedulerError::Binding {
                    pod: pod.to_string(),
                    node: node.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        scheduler: BatchScheduler,
        buffer: Arc<PodBuffer>,
        source: Arc<CountingSource>,
        binder: Arc<MockBinder>,
        health: HealthRegistry,
    }

    fn fixture(failing: &[&str], tick: Duration) -> Fixture {
        let buffer = Arc::new(PodBuffer::new(SCHEDULER));
        let source = Arc::new(CountingSource::new());
        let binder = Arc::new(MockBinder::new(failing));
        let health = HealthRegistry::new();

        let scheduler = BatchSchedulerBuilder::new()
            .buffer(buffer.clone())
            .metrics_source(source.clone())
            .binder(binder.clone())
            .health(health.clone())
            .tick_interval(tick)
            .optimizer(OptimizerConfig {
                iterations: 20,
                ..OptimizerConfig::default()
            })
            .build()
            .unwrap();

        Fixture {
            scheduler,
            buffer,
            source,
            binder,
            health,
        }
    }

    fn pod(name: &str) -> PodRef {
        PodRef::new(name, "app", SCHEDULER)
    }

    #[test]
    fn test_batch_config_default() {
        let config = BatchConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(5));
        assert_eq!(config.optimizer.iterations, 100);
        assert_eq!(config.optimizer.swarm_size, 10);
    }

    #[test]
    fn test_builder_requires_binder() {
        let result = BatchSchedulerBuilder::new()
            .buffer(Arc::new(PodBuffer::new(SCHEDULER)))
            .metrics_source(Arc::new(StaticMetricsSource::default()))
            .build();

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_buffer_skips_round() {
        let f = fixture(&[], DEFAULT_TICK_INTERVAL);

        let report = f.scheduler.run_round().await.unwrap();

        assert!(report.is_none());
        assert_eq!(f.source.calls.load(Ordering::SeqCst), 0);
        assert!(f.binder.attempted().is_empty());
    }

    #[tokio::test]
    async fn test_round_binds_every_drained_pod_in_order() {
        let f = fixture(&[], DEFAULT_TICK_INTERVAL);
        for name in ["a", "b", "c", "d"] {
            f.buffer.enqueue(pod(name));
        }

        let report = f.scheduler.run_round().await.unwrap().unwrap();

        assert_eq!(report.batch_size, 4);
        assert_eq!(report.dispatch.success_count(), 4);
        assert_eq!(f.binder.attempted(), vec!["a", "b", "c", "d"]);
        assert!(f.buffer.is_empty());
        assert!(report.best_fitness.is_finite());
    }

    #[tokio::test]
    async fn test_failed_binding_is_isolated() {
        let f = fixture(&["pod-2"], DEFAULT_TICK_INTERVAL);
        for name in ["pod-1", "pod-2", "pod-3"] {
            f.buffer.enqueue(pod(name));
        }

        let report = f.scheduler.run_round().await.unwrap().unwrap();

        assert_eq!(f.binder.attempted(), vec!["pod-1", "pod-2", "pod-3"]);
        assert_eq!(report.dispatch.success_count(), 2);
        assert_eq!(report.dispatch.failed[0].0.pod.name, "pod-2");

        // Failed pods are not re-buffered
        assert!(f.buffer.is_empty());

        let health = f.health.health().await;
        assert_eq!(
            health.components[components::DISPATCHER].status,
            crate::health::ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_each_round_takes_fresh_snapshot() {
        let f = fixture(&[], DEFAULT_TICK_INTERVAL);

        f.buffer.enqueue(pod("first"));
        f.scheduler.run_round().await.unwrap();
        f.buffer.enqueue(pod("second"));
        f.scheduler.run_round().await.unwrap();

        assert_eq!(f.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_loop_schedules_until_shutdown() {
        let f = fixture(&[], Duration::from_millis(20));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        f.buffer.enqueue(pod("early"));
        let binder = f.binder.clone();
        let buffer = f.buffer.clone();
        let handle = tokio::spawn(f.scheduler.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        buffer.enqueue(pod("late"));

        let deadline = Instant::now() + Duration::from_secs(5);
        while binder.attempted().len() < 2 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(binder.attempted(), vec!["early", "late"]);
    }
}
