//! Quantization of optimizer output into node identities
//!
//! The axis `[0, 6]` is split into six unit partitions with inclusive upper
//! bounds: `[0,1]`, `(1,2]`, `(2,3]`, `(3,4]`, `(4,5]`, `(5,6]`.

use crate::models::{Node, NODE_COUNT};

/// Map an axis position to the node owning that partition
///
/// Total over every `f64`: values at or below zero (and NaN) map to the first
/// node, values above the top boundary map to the last.
pub fn map_to_node(value: f64) -> Node {
    if value.is_nan() || value <= 1.0 {
        return Node::ALL[0];
    }

    let slot = (value.ceil() as usize).saturating_sub(1).min(NODE_COUNT - 1);
    Node::ALL[slot]
}

/// Map every coordinate of a candidate assignment, preserving order
pub fn map_assignment(position: &[f64]) -> Vec<Node> {
    position.iter().copied().map(map_to_node).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_map_to_lower_partition() {
        assert_eq!(map_to_node(1.0), Node::TokyoWorker1);
        assert_eq!(map_to_node(2.0), Node::MastersSlave);
        assert_eq!(map_to_node(3.0), Node::MastersSlave2);
        assert_eq!(map_to_node(4.0), Node::SingaporeWorker1);
        assert_eq!(map_to_node(5.0), Node::SingaporeWorker2);
        assert_eq!(map_to_node(6.0), Node::SingaporeWorker3);
    }

    #[test]
    fn test_interior_values() {
        assert_eq!(map_to_node(0.0), Node::TokyoWorker1);
        assert_eq!(map_to_node(0.5), Node::TokyoWorker1);
        assert_eq!(map_to_node(1.0001), Node::MastersSlave);
        assert_eq!(map_to_node(2.5), Node::MastersSlave2);
        assert_eq!(map_to_node(3.9), Node::SingaporeWorker1);
        assert_eq!(map_to_node(4.1), Node::SingaporeWorker2);
        assert_eq!(map_to_node(5.999), Node::SingaporeWorker3);
    }

    #[test]
    fn test_out_of_range_values_do_not_fail() {
        assert_eq!(map_to_node(-3.0), Node::TokyoWorker1);
        assert_eq!(map_to_node(f64::NEG_INFINITY), Node::TokyoWorker1);
        assert_eq!(map_to_node(f64::NAN), Node::TokyoWorker1);
        assert_eq!(map_to_node(6.5), Node::SingaporeWorker3);
        assert_eq!(map_to_node(1e12), Node::SingaporeWorker3);
        assert_eq!(map_to_node(f64::INFINITY), Node::SingaporeWorker3);
    }

    #[test]
    fn test_dense_sweep_is_total_and_monotonic() {
        let mut previous = 0;
        for step in 0..=6000 {
            let value = step as f64 / 1000.0;
            let index = map_to_node(value).index();
            assert!(index < NODE_COUNT);
            assert!(index >= previous, "mapping decreased at {}", value);
            previous = index;
        }
    }

    #[test]
    fn test_map_assignment_preserves_order() {
        let nodes = map_assignment(&[5.5, 0.2, 3.0]);
        assert_eq!(
            nodes,
            vec![Node::SingaporeWorker3, Node::TokyoWorker1, Node::MastersSlave2]
        );
    }
}
