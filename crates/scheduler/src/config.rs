//! Scheduler configuration
//!
//! Optimizer tunables are read from the unprefixed environment keys
//! `latency_weight`, `load_weight`, `omega`, `c1` and `c2`. Service settings
//! use the `SCHEDULER_` prefix. A malformed value never aborts startup: it is
//! logged and replaced by that key's default.

use anyhow::Result;
use scheduler_lib::optimizer::{OptimizerConfig, MAX_ITERATIONS, MAX_SWARM_SIZE};
use scheduler_lib::scheduler::{DEFAULT_BUFFER_HIGH_WATER, DEFAULT_TICK_INTERVAL};
use scheduler_lib::telemetry::DEFAULT_METRICS_NAMESPACE;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::time::Duration;
use tracing::warn;

/// Scheduler configuration
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerConfig {
    /// Scheduler name pods must request in `spec.schedulerName`
    pub scheduler_name: String,

    /// Namespace watched for unscheduled pods
    pub watch_namespace: String,

    /// Namespace holding the DatadogMetric resources
    pub metrics_namespace: String,

    /// Seconds between scheduling rounds
    pub tick_interval_secs: u64,

    /// Drained batch size that triggers a backlog warning
    pub buffer_high_water: usize,

    /// API server port for health/metrics
    pub api_port: u16,

    /// Fitness weights and swarm parameters
    pub optimizer: OptimizerConfig,
}

fn default_scheduler_name() -> String {
    "custom-scheduler".to_string()
}

fn default_watch_namespace() -> String {
    "app".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_name: default_scheduler_name(),
            watch_namespace: default_watch_namespace(),
            metrics_namespace: DEFAULT_METRICS_NAMESPACE.to_string(),
            tick_interval_secs: DEFAULT_TICK_INTERVAL.as_secs(),
            buffer_high_water: DEFAULT_BUFFER_HIGH_WATER,
            api_port: default_api_port(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let tunables = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;
        let service = config::Config::builder()
            .add_source(config::Environment::with_prefix("SCHEDULER"))
            .build()?;

        Ok(Self::from_sources(&service, &tunables))
    }

    /// Resolve every setting key by key, falling back per key
    pub fn from_sources(service: &config::Config, tunables: &config::Config) -> Self {
        let defaults = Self::default();
        let optimizer_defaults = defaults.optimizer;

        let optimizer = OptimizerConfig {
            latency_weight: finite_or(tunables, "latency_weight", optimizer_defaults.latency_weight),
            load_weight: finite_or(tunables, "load_weight", optimizer_defaults.load_weight),
            inertia: finite_or(tunables, "omega", optimizer_defaults.inertia),
            cognitive: finite_or(tunables, "c1", optimizer_defaults.cognitive),
            social: finite_or(tunables, "c2", optimizer_defaults.social),
            iterations: bounded_or(
                service,
                "iterations",
                optimizer_defaults.iterations,
                MAX_ITERATIONS,
            ),
            swarm_size: bounded_or(
                service,
                "swarm_size",
                optimizer_defaults.swarm_size,
                MAX_SWARM_SIZE,
            ),
        };

        let mut tick_interval_secs =
            value_or(service, "tick_interval_secs", defaults.tick_interval_secs);
        if tick_interval_secs == 0 {
            warn!(
                key = "tick_interval_secs",
                default = defaults.tick_interval_secs,
                "Tick interval must be positive, using default"
            );
            tick_interval_secs = defaults.tick_interval_secs;
        }

        Self {
            scheduler_name: value_or(service, "scheduler_name", defaults.scheduler_name),
            watch_namespace: value_or(service, "watch_namespace", defaults.watch_namespace),
            metrics_namespace: value_or(service, "metrics_namespace", defaults.metrics_namespace),
            tick_interval_secs,
            buffer_high_water: value_or(service, "buffer_high_water", defaults.buffer_high_water),
            api_port: value_or(service, "api_port", defaults.api_port),
            optimizer,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

/// Read `key`, or `default` when absent or malformed
fn value_or<T: DeserializeOwned + Debug>(source: &config::Config, key: &str, default: T) -> T {
    match source.get::<T>(key) {
        Ok(value) => value,
        Err(config::ConfigError::NotFound(_)) => default,
        Err(e) => {
            warn!(key = %key, error = %e, default = ?default, "Malformed configuration value, using default");
            default
        }
    }
}

/// Like [`value_or`], additionally requiring `1 <= value <= max`
fn bounded_or(source: &config::Config, key: &str, default: usize, max: usize) -> usize {
    let value = value_or(source, key, default);
    if (1..=max).contains(&value) {
        value
    } else {
        warn!(key = %key, value, max, default, "Configuration value out of range, using default");
        default
    }
}

/// Like [`value_or`], additionally rejecting NaN and infinities
fn finite_or(source: &config::Config, key: &str, default: f64) -> f64 {
    let value = value_or(source, key, default);
    if value.is_finite() {
        value
    } else {
        warn!(key = %key, default, "Non-finite configuration value, using default");
        default
    }
}
