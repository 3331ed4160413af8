//! Scheduler library for particle-swarm pod placement
//!
//! This crate provides the core functionality for:
//! - Buffering pending pods delivered by the pod watch
//! - Scoring and searching node assignments with a particle swarm
//! - Mapping optimizer output onto the fixed node set
//! - Dispatching bindings with per-pod failure isolation
//! - Telemetry, health checks and observability

pub mod buffer;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod mapper;
pub mod models;
pub mod observability;
pub mod optimizer;
pub mod scheduler;
pub mod telemetry;
pub mod watch;

pub use buffer::PodBuffer;
pub use error::SchedulerError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SchedulerMetrics, StructuredLogger};
