//! Core data models for the scheduler
//!
//! The cluster topology is fixed: three regions hosting six worker nodes.
//! Nodes and regions are closed enumerations indexed into fixed-size arrays,
//! so an unrecognized name can never reach the optimizer.

use crate::error::SchedulerError;
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fallback latency for a region whose reading is unavailable
pub const FALLBACK_LATENCY: f64 = 1000.0;

/// Fallback load for a node whose reading is unavailable
pub const FALLBACK_LOAD: f64 = 50.0;

/// Number of regions in the cluster
pub const REGION_COUNT: usize = 3;

/// Number of schedulable nodes in the cluster
pub const NODE_COUNT: usize = 6;

/// Network region hosting one or more nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Tokyo,
    Sydney,
    Singapore,
}

impl Region {
    pub const ALL: [Region; REGION_COUNT] = [Region::Tokyo, Region::Sydney, Region::Singapore];

    pub fn index(self) -> usize {
        match self {
            Region::Tokyo => 0,
            Region::Sydney => 1,
            Region::Singapore => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Region::Tokyo => "tokyo",
            Region::Sydney => "sydney",
            Region::Singapore => "singapore",
        }
    }

    /// Name of the latency metric published for this region
    pub fn metric_name(self) -> String {
        format!("latency-{}", self.name())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Region {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or_else(|| SchedulerError::UnknownRegion(s.to_string()))
    }
}

/// Schedulable worker node, in position-axis order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Node {
    #[serde(rename = "tokyo-worker1")]
    TokyoWorker1,
    #[serde(rename = "masters-slave")]
    MastersSlave,
    #[serde(rename = "masters-slave2")]
    MastersSlave2,
    #[serde(rename = "singapore-worker1")]
    SingaporeWorker1,
    #[serde(rename = "singapore-worker2")]
    SingaporeWorker2,
    #[serde(rename = "singapore-worker3")]
    SingaporeWorker3,
}

impl Node {
    pub const ALL: [Node; NODE_COUNT] = [
        Node::TokyoWorker1,
        Node::MastersSlave,
        Node::MastersSlave2,
        Node::SingaporeWorker1,
        Node::SingaporeWorker2,
        Node::SingaporeWorker3,
    ];

    pub fn index(self) -> usize {
        match self {
            Node::TokyoWorker1 => 0,
            Node::MastersSlave => 1,
            Node::MastersSlave2 => 2,
            Node::SingaporeWorker1 => 3,
            Node::SingaporeWorker2 => 4,
            Node::SingaporeWorker3 => 5,
        }
    }

    /// Kubernetes node name
    pub fn name(self) -> &'static str {
        match self {
            Node::TokyoWorker1 => "tokyo-worker1",
            Node::MastersSlave => "masters-slave",
            Node::MastersSlave2 => "masters-slave2",
            Node::SingaporeWorker1 => "singapore-worker1",
            Node::SingaporeWorker2 => "singapore-worker2",
            Node::SingaporeWorker3 => "singapore-worker3",
        }
    }

    /// Region whose latency is charged for pods placed on this node
    pub fn region(self) -> Region {
        match self {
            Node::TokyoWorker1 => Region::Tokyo,
            Node::MastersSlave | Node::MastersSlave2 => Region::Sydney,
            Node::SingaporeWorker1 | Node::SingaporeWorker2 | Node::SingaporeWorker3 => {
                Region::Singapore
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Node {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Node::ALL
            .into_iter()
            .find(|n| n.name() == s)
            .ok_or_else(|| SchedulerError::UnknownNode(s.to_string()))
    }
}

/// Per-region latency readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionLatencies([f64; REGION_COUNT]);

impl RegionLatencies {
    pub fn new(tokyo: f64, sydney: f64, singapore: f64) -> Self {
        Self([tokyo, sydney, singapore])
    }

    /// All regions at the fallback value
    pub fn fallback() -> Self {
        Self([FALLBACK_LATENCY; REGION_COUNT])
    }

    pub fn get(&self, region: Region) -> f64 {
        self.0[region.index()]
    }

    pub fn set(&mut self, region: Region, value: f64) {
        self.0[region.index()] = value;
    }

    pub fn min(&self) -> f64 {
        self.0.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.0.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

impl Default for RegionLatencies {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Per-node load readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeLoads([f64; NODE_COUNT]);

impl NodeLoads {
    pub fn new(loads: [f64; NODE_COUNT]) -> Self {
        Self(loads)
    }

    /// All nodes at the fallback value
    pub fn fallback() -> Self {
        Self([FALLBACK_LOAD; NODE_COUNT])
    }

    pub fn get(&self, node: Node) -> f64 {
        self.0[node.index()]
    }

    pub fn set(&mut self, node: Node, value: f64) {
        self.0[node.index()] = value;
    }

    pub fn as_array(&self) -> [f64; NODE_COUNT] {
        self.0
    }
}

impl Default for NodeLoads {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Telemetry readings used as the stationary input to one optimization round
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub latencies: RegionLatencies,
    pub loads: NodeLoads,
}

impl MetricsSnapshot {
    pub fn new(latencies: RegionLatencies, loads: NodeLoads) -> Self {
        Self { latencies, loads }
    }
}

/// Reference to a pending pod
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
    pub scheduler_name: String,
}

impl PodRef {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        scheduler_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            scheduler_name: scheduler_name.into(),
        }
    }

    /// Build a reference from a Kubernetes pod object
    ///
    /// Returns `None` for pods without a name. Pods with no scheduler name
    /// are reported under `default-scheduler`, matching the API server default.
    pub fn from_pod(pod: &Pod) -> Option<Self> {
        let name = pod.metadata.name.clone()?;
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let scheduler_name = pod
            .spec
            .as_ref()
            .and_then(|s| s.scheduler_name.clone())
            .unwrap_or_else(|| "default-scheduler".to_string());

        Some(Self {
            name,
            namespace,
            scheduler_name,
        })
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A scheduling decision for one pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub pod: PodRef,
    pub node: Node,
}
