//! Fitness evaluation for candidate assignments
//!
//! Scores a candidate (one axis position per pod) against a metrics snapshot.
//! Lower is better. The score is the weighted sum of a normalized latency
//! term in `[1, 6]` and a load-balance term `>= 1`.

use crate::mapper::map_to_node;
use crate::models::{MetricsSnapshot, NODE_COUNT};

/// Load a newly placed pod is assumed to add to its node
pub const POD_LOAD_INCREMENT: f64 = 10.0;

/// Lower and upper bound of the normalized latency term
const LATENCY_SCALE_MIN: f64 = 1.0;
const LATENCY_SCALE_MAX: f64 = 6.0;

/// Weights applied to the two fitness terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessWeights {
    pub latency: f64,
    pub load: f64,
}

impl FitnessWeights {
    /// Both terms contribute equally
    pub fn unit() -> Self {
        Self {
            latency: 1.0,
            load: 1.0,
        }
    }
}

/// Score a candidate assignment; lower is better
pub fn fitness(position: &[f64], snapshot: &MetricsSnapshot, weights: FitnessWeights) -> f64 {
    weights.latency * latency_term(position, snapshot) + weights.load * load_term(position, snapshot)
}

/// Summed region latency of the candidate, min-max scaled onto `[1, 6]`
///
/// The bounds are the sums obtained by placing every pod in the fastest or
/// slowest region. When all regions report the same latency the bounds
/// coincide and the midpoint is returned.
pub fn latency_term(position: &[f64], snapshot: &MetricsSnapshot) -> f64 {
    let latencies = &snapshot.latencies;
    let total: f64 = position
        .iter()
        .map(|&p| latencies.get(map_to_node(p).region()))
        .sum();

    let pods = position.len() as f64;
    let min_total = latencies.min() * pods;
    let max_total = latencies.max() * pods;
    let range = max_total - min_total;

    if range <= 0.0 {
        return (LATENCY_SCALE_MIN + LATENCY_SCALE_MAX) / 2.0;
    }

    (total - min_total) / range * (LATENCY_SCALE_MAX - LATENCY_SCALE_MIN) + LATENCY_SCALE_MIN
}

/// Peak node load over mean node load after placing the candidate's pods
pub fn load_term(position: &[f64], snapshot: &MetricsSnapshot) -> f64 {
    let mut loads = snapshot.loads.as_array();
    for &p in position {
        loads[map_to_node(p).index()] += POD_LOAD_INCREMENT;
    }

    let ideal = loads.iter().sum::<f64>() / NODE_COUNT as f64;
    if ideal < f64::EPSILON {
        return 1.0;
    }

    let peak = loads.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    peak / ideal
}
