//! Latency and load telemetry
//!
//! Readings come from `DatadogMetric` custom resources published by the
//! Datadog cluster agent. A missing or unparsable reading never fails a
//! round: the region or node keeps its fallback value.

use crate::error::{Result, SchedulerError};
use crate::health::{components, HealthRegistry};
use crate::models::{MetricsSnapshot, Node, NodeLoads, Region, RegionLatencies};
use crate::observability::SchedulerMetrics;
use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use tracing::{debug, warn};

/// Default namespace holding the DatadogMetric resources
pub const DEFAULT_METRICS_NAMESPACE: &str = "datadog";

/// Source of per-round telemetry readings
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Latency per region, falling back to `FALLBACK_LATENCY` when unavailable
    async fn region_latencies(&self) -> RegionLatencies;

    /// Load per node, falling back to `FALLBACK_LOAD` when unavailable
    async fn node_loads(&self) -> NodeLoads;

    /// Fresh snapshot combining both readings
    async fn snapshot(&self) -> MetricsSnapshot {
        let latencies = self.region_latencies().await;
        let loads = self.node_loads().await;
        MetricsSnapshot::new(latencies, loads)
    }
}

/// Reads telemetry from DatadogMetric resources
pub struct DatadogMetricsSource {
    api: Api<DynamicObject>,
    metrics: SchedulerMetrics,
    health: Option<HealthRegistry>,
}

impl DatadogMetricsSource {
    pub fn new(client: Client, namespace: &str) -> Self {
        let gvk = GroupVersionKind::gvk("datadoghq.com", "v1alpha1", "DatadogMetric");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "datadogmetrics");

        Self {
            api: Api::namespaced_with(client, namespace, &resource),
            metrics: SchedulerMetrics::new(),
            health: None,
        }
    }

    /// Report fallback usage on the telemetry health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Fetch and parse one metric by resource name
    async fn read(&self, name: &str) -> Result<f64> {
        let object = self.api.get(name).await?;
        parse_current_value(name, &object.data)
    }

    /// Reading for `name`, or `None` after logging why it is unavailable
    async fn read_logged(&self, name: &str) -> Option<f64> {
        match self.read(name).await {
            Ok(value) => {
                debug!(metric = %name, value, "Read telemetry");
                Some(value)
            }
            Err(e) => {
                warn!(metric = %name, error = %e, "Telemetry unavailable, using fallback");
                self.metrics.inc_telemetry_fallbacks();
                None
            }
        }
    }

    async fn read_latencies(&self) -> (RegionLatencies, Vec<String>) {
        let mut latencies = RegionLatencies::fallback();
        let mut missing = Vec::new();
        for region in Region::ALL {
            let name = region.metric_name();
            match self.read_logged(&name).await {
                Some(value) => latencies.set(region, value),
                None => missing.push(name),
            }
        }
        (latencies, missing)
    }

    async fn read_loads(&self) -> (NodeLoads, Vec<String>) {
        let mut loads = NodeLoads::fallback();
        let mut missing = Vec::new();
        for node in Node::ALL {
            match self.read_logged(node.name()).await {
                Some(value) => loads.set(node, value),
                None => missing.push(node.name().to_string()),
            }
        }
        (loads, missing)
    }

    async fn report_health(&self, missing: &[String]) {
        let Some(health) = &self.health else {
            return;
        };

        if missing.is_empty() {
            health.set_healthy(components::TELEMETRY).await;
        } else {
            health
                .set_degraded(
                    components::TELEMETRY,
                    format!("Using fallback values for {}", missing.join(", ")),
                )
                .await;
        }
    }
}

#[async_trait]
impl MetricsSource for DatadogMetricsSource {
    async fn region_latencies(&self) -> RegionLatencies {
        self.read_latencies().await.0
    }

    async fn node_loads(&self) -> NodeLoads {
        self.read_loads().await.0
    }

    async fn snapshot(&self) -> MetricsSnapshot {
        let (latencies, mut missing) = self.read_latencies().await;
        let (loads, missing_loads) = self.read_loads().await;
        missing.extend(missing_loads);

        self.report_health(&missing).await;
        MetricsSnapshot::new(latencies, loads)
    }
}

/// Extract `status.currentValue` from a DatadogMetric body
///
/// The agent publishes the value as a string; plain numbers are accepted too.
pub fn parse_current_value(metric: &str, data: &serde_json::Value) -> Result<f64> {
    let unavailable = |reason: &str| SchedulerError::Telemetry {
        metric: metric.to_string(),
        reason: reason.to_string(),
    };

    let raw = data
        .get("status")
        .and_then(|s| s.get("currentValue"))
        .ok_or_else(|| unavailable("status.currentValue not found"))?;

    let value = match raw {
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| unavailable(&e.to_string()))?,
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| unavailable("value out of range"))?,
        _ => return Err(unavailable("currentValue is not a number")),
    };

    if !value.is_finite() {
        return Err(unavailable("value is not finite"));
    }

    Ok(value)
}

/// Fixed readings, for tests and clusters without telemetry
#[derive(Debug, Clone, Default)]
pub struct StaticMetricsSource {
    snapshot: MetricsSnapshot,
}

impl StaticMetricsSource {
    pub fn new(snapshot: MetricsSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl MetricsSource for StaticMetricsSource {
    async fn region_latencies(&self) -> RegionLatencies {
        self.snapshot.latencies
    }

    async fn node_loads(&self) -> NodeLoads {
        self.snapshot.loads
    }
}
