//! Particle swarm search over per-pod axis positions

use super::fitness::{fitness, FitnessWeights};
use super::{OptimizerConfig, MAX_ITERATIONS, MAX_SWARM_SIZE};
use crate::models::MetricsSnapshot;
use rand::Rng;
use tracing::debug;

/// Lower bound of the placement axis
pub const AXIS_MIN: f64 = 0.0;

/// Upper bound of the placement axis (one unit per node)
pub const AXIS_MAX: f64 = 6.0;

/// Magnitude bound for any velocity coordinate
pub const VELOCITY_LIMIT: f64 = 6.0;

/// One candidate solution in the swarm
#[derive(Debug, Clone)]
pub struct Particle {
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    pub best_position: Vec<f64>,
    pub best_fitness: f64,
}

impl Particle {
    /// Random particle with `dims` coordinates, scored against the snapshot
    fn spawn<R: Rng>(
        rng: &mut R,
        dims: usize,
        snapshot: &MetricsSnapshot,
        weights: FitnessWeights,
    ) -> Self {
        let position: Vec<f64> = (0..dims).map(|_| rng.gen_range(AXIS_MIN..=AXIS_MAX)).collect();
        let velocity: Vec<f64> = (0..dims)
            .map(|_| rng.gen_range(-VELOCITY_LIMIT..=VELOCITY_LIMIT))
            .collect();
        let best_fitness = fitness(&position, snapshot, weights);

        Self {
            best_position: position.clone(),
            position,
            velocity,
            best_fitness,
        }
    }

    /// Move every coordinate toward the personal and swarm bests
    fn step<R: Rng>(&mut self, rng: &mut R, global_best: &[f64], config: &OptimizerConfig) {
        for j in 0..self.position.len() {
            let r1: f64 = rng.gen();
            let r2: f64 = rng.gen();

            let velocity = config.inertia * self.velocity[j]
                + config.cognitive * r1 * (self.best_position[j] - self.position[j])
                + config.social * r2 * (global_best[j] - self.position[j]);
            self.velocity[j] = velocity.clamp(-VELOCITY_LIMIT, VELOCITY_LIMIT);

            self.position[j] = (self.position[j] + self.velocity[j]).clamp(AXIS_MIN, AXIS_MAX);
        }
    }

    /// Rescore the current position, returning its fitness
    fn evaluate(&mut self, snapshot: &MetricsSnapshot, weights: FitnessWeights) -> f64 {
        let fit = fitness(&self.position, snapshot, weights);
        if fit < self.best_fitness {
            self.best_fitness = fit;
            self.best_position.clone_from(&self.position);
        }
        fit
    }
}

/// Result of one optimization round
#[derive(Debug, Clone)]
pub struct SwarmOutcome {
    /// Swarm best position, one coordinate per pod in batch order
    pub best_position: Vec<f64>,
    /// Fitness of `best_position`
    pub best_fitness: f64,
    /// Swarm best fitness after initialization and after every iteration
    pub history: Vec<f64>,
}

/// Population of particles plus the best position any of them has found
struct Swarm {
    particles: Vec<Particle>,
    best_position: Vec<f64>,
    best_fitness: f64,
}

impl Swarm {
    fn new<R: Rng>(
        rng: &mut R,
        size: usize,
        dims: usize,
        snapshot: &MetricsSnapshot,
        weights: FitnessWeights,
    ) -> Self {
        let mut swarm = Self {
            particles: Vec::new(),
            best_position: Vec::new(),
            best_fitness: f64::INFINITY,
        };

        for _ in 0..size {
            let particle = Particle::spawn(rng, dims, snapshot, weights);
            swarm.offer(&particle.position, particle.best_fitness);
            swarm.particles.push(particle);
        }

        swarm
    }

    /// Replace the swarm best if `fit` improves on it
    fn offer(&mut self, position: &[f64], fit: f64) {
        if fit < self.best_fitness || self.best_position.is_empty() {
            self.best_fitness = fit;
            self.best_position = position.to_vec();
        }
    }

    fn iterate<R: Rng>(
        &mut self,
        rng: &mut R,
        snapshot: &MetricsSnapshot,
        config: &OptimizerConfig,
    ) {
        let weights = config.weights();
        for particle in &mut self.particles {
            particle.step(rng, &self.best_position, config);
            let fit = particle.evaluate(snapshot, weights);

            if fit < self.best_fitness {
                self.best_fitness = fit;
                self.best_position.clone_from(&particle.position);
            }
        }
    }
}

/// Swarm optimizer bound to one configuration
#[derive(Debug, Clone)]
pub struct ParticleSwarm {
    config: OptimizerConfig,
}

impl Default for ParticleSwarm {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl ParticleSwarm {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Search for a low-cost placement of `batch_size` pods
    pub fn optimize(&self, snapshot: &MetricsSnapshot, batch_size: usize) -> SwarmOutcome {
        self.optimize_with_rng(&mut rand::thread_rng(), snapshot, batch_size)
    }

    /// Same as [`ParticleSwarm::optimize`] with a caller-supplied RNG
    pub fn optimize_with_rng<R: Rng>(
        &self,
        rng: &mut R,
        snapshot: &MetricsSnapshot,
        batch_size: usize,
    ) -> SwarmOutcome {
        if batch_size == 0 {
            return SwarmOutcome {
                best_position: Vec::new(),
                best_fitness: 0.0,
                history: Vec::new(),
            };
        }

        let config = &self.config;
        let swarm_size = config.swarm_size.clamp(1, MAX_SWARM_SIZE);
        let iterations = config.iterations.min(MAX_ITERATIONS);
        let mut swarm = Swarm::new(rng, swarm_size, batch_size, snapshot, config.weights());

        let mut history = Vec::new();
        history.push(swarm.best_fitness);

        for _ in 0..iterations {
            swarm.iterate(rng, snapshot, config);
            history.push(swarm.best_fitness);
        }

        debug!(
            batch_size,
            swarm_size,
            iterations,
            best_fitness = swarm.best_fitness,
            "Swarm search complete"
        );

        SwarmOutcome {
            best_position: swarm.best_position,
            best_fitness: swarm.best_fitness,
            history,
        }
    }
}
