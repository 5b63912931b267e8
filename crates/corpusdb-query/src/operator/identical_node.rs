//! The identical-node operator (`_ident_`).
//!
//! `a _ident_ b` holds when both operands are the same node. Front-ends
//! use it to require two annotation predicates of one node.

use std::fmt;

use corpusdb_core::{Annotation, Match};

use super::{BinaryOperator, EstimationType};

/// Node identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdenticalNode;

impl IdenticalNode {
    /// Creates the operator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl fmt::Display for IdenticalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_ident_")
    }
}

impl BinaryOperator for IdenticalNode {
    fn retrieve_matches<'b>(&'b self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'b> {
        Box::new(std::iter::once(Match::new(lhs.node, Annotation::default())))
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        lhs.node == rhs.node
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn selectivity(&self) -> f64 {
        // only the operand itself can match
        0.0
    }

    fn estimation_type(&self) -> EstimationType {
        EstimationType::Min
    }
}
