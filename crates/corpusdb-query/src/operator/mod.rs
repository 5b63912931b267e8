//! Binary operators over matches.
//!
//! An operator relates a left and a right operand node. It can either
//! *retrieve* all candidates reachable from a given left match, or
//! *filter* a concrete pair; the planner decides which side is exercised.
//! Selectivity estimates steer the join order and join kinds.

pub mod edge_op;
pub mod identical_cov;
pub mod identical_node;
pub mod inclusion;
pub mod overlap;
pub mod precedence;

use std::fmt;

use corpusdb_core::Match;
use corpusdb_graph::GraphStatistic;

pub use edge_op::BaseEdgeOp;
pub use identical_cov::IdenticalCoverage;
pub use identical_node::IdenticalNode;
pub use inclusion::Inclusion;
pub use overlap::Overlap;
pub use precedence::Precedence;

/// How the planner estimates an operator's output size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimationType {
    /// Scale the cross product of the operands by a selectivity in
    /// `[0, 1]`.
    Selectivity(f64),
    /// The output is bounded by the smaller operand (identity-like
    /// operators).
    Min,
}

/// Selectivity assumed when a component has no statistics.
pub const DEFAULT_OPERATOR_SELECTIVITY: f64 = 0.1;

/// A binary relation between two matched nodes.
///
/// Retrieved candidates carry the default "any" annotation; the join layer
/// resolves the concrete annotations of the right-hand side.
pub trait BinaryOperator: Send + Sync + fmt::Display {
    /// All candidates related to `lhs`, in operator-defined order.
    fn retrieve_matches<'b>(&'b self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'b>;

    /// Whether the concrete pair is related.
    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool;

    /// Whether a node may be related to itself. Non-reflexive operators
    /// never emit a pair matching the same node with the same annotation
    /// key.
    fn is_reflexive(&self) -> bool {
        true
    }

    /// Whether operands can be swapped without changing the result set.
    fn is_commutative(&self) -> bool {
        false
    }

    /// Estimated probability in `[0, 1]` that a random pair satisfies the
    /// operator.
    fn selectivity(&self) -> f64;

    /// How the planner should size this operator's output.
    fn estimation_type(&self) -> EstimationType {
        EstimationType::Selectivity(self.selectivity())
    }

    /// Additional selectivity of an edge-annotation requirement, if the
    /// operator carries one.
    fn edge_anno_selectivity(&self) -> Option<f64> {
        None
    }
}

/// Selectivity of walking a component's edges between `min_distance` and
/// `max_distance` steps.
///
/// `reachable = avg_fan_out * (min(max, max_depth) - max(0, min - 1))`,
/// scaled by the component size; cyclic components can reach everything.
#[must_use]
pub fn edge_reachability_selectivity(
    stats: Option<&GraphStatistic>,
    min_distance: usize,
    max_distance: usize,
) -> f64 {
    let Some(stats) = stats else {
        return DEFAULT_OPERATOR_SELECTIVITY;
    };
    if stats.cyclic {
        return 1.0;
    }
    if stats.nodes == 0 {
        return 0.0;
    }

    let max_path = max_distance.min(stats.max_depth);
    let min_path = min_distance.saturating_sub(1);
    let steps = max_path.saturating_sub(min_path);

    let reachable = stats.avg_fan_out * steps as f64;
    (reachable / stats.nodes as f64).clamp(0.0, 1.0)
}

/// Formats the `,min,max` / `*` range suffix of an operator description.
#[must_use]
pub fn format_range(min_distance: usize, max_distance: usize) -> String {
    if min_distance == 1 && max_distance == 1 {
        String::new()
    } else if min_distance == 1 && max_distance == usize::MAX {
        String::from("*")
    } else {
        format!("{min_distance},{max_distance}")
    }
}
