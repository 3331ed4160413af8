//! Error types for the scheduler library

use thiserror::Error;

/// Errors surfaced by scheduler components
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A node name outside the fixed cluster topology
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// A region name outside the fixed cluster topology
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    /// The binding call for a pod was rejected or failed in transit
    #[error("failed to bind {pod} to {node}: {reason}")]
    Binding {
        pod: String,
        node: String,
        reason: String,
    },

    /// A telemetry reading could not be fetched or parsed
    #[error("telemetry unavailable for {metric}: {reason}")]
    Telemetry { metric: String, reason: String },

    /// The swarm search task did not complete
    #[error("optimizer task failed: {0}")]
    Optimizer(String),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
