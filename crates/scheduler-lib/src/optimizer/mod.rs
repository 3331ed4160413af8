//! Particle swarm placement optimizer
//!
//! Assigns a batch of pods to the fixed node set by searching a continuous
//! 1-D axis `[0, 6]` per pod. Each coordinate is later quantized to a node
//! by [`crate::mapper::map_to_node`].

mod fitness;
mod swarm;


pub use fitness::{fitness, latency_term, load_term, FitnessWeights, POD_LOAD_INCREMENT};
pub use swarm::{Particle, ParticleSwarm, SwarmOutcome, AXIS_MAX, AXIS_MIN, VELOCITY_LIMIT};

use serde::{Deserialize, Serialize};

/// Default number of swarm iterations per scheduling round
pub const DEFAULT_ITERATIONS: usize = 100;

/// Default number of particles in the swarm
pub const DEFAULT_SWARM_SIZE: usize = 10;

/// Upper bound on iterations per round; larger settings are capped
pub const MAX_ITERATIONS: usize = 10_000;

/// Upper bound on particles per swarm; larger settings are capped
pub const MAX_SWARM_SIZE: usize = 1_000;

/// Tunable parameters for the fitness function and swarm dynamics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Weight applied to the normalized latency term
    pub latency_weight: f64,
    /// Weight applied to the load-balance term
    pub load_weight: f64,
    /// Inertia coefficient (omega)
    pub inertia: f64,
    /// Cognitive coefficient, attraction to the particle's own best (c1)
    pub cognitive: f64,
    /// Social coefficient, attraction to the swarm best (c2)
    pub social: f64,
    /// Iterations per round, no early stopping; at most [`MAX_ITERATIONS`]
    pub iterations: usize,
    /// Particles per swarm, between 1 and [`MAX_SWARM_SIZE`]
    pub swarm_size: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            latency_weight: 1.0,
            load_weight: 5.0,
            inertia: 1.0,
            cognitive: 0.5,
            social: 0.5,
            iterations: DEFAULT_ITERATIONS,
            swarm_size: DEFAULT_SWARM_SIZE,
        }
    }
}

impl OptimizerConfig {
    pub fn weights(&self) -> FitnessWeights {
        FitnessWeights {
            latency: self.latency_weight,
            load: self.load_weight,
        }
    }
}
