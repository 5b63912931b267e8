//! The overlap operator (`_o_`).
//!
//! `a _o_ b` holds when at least one token covered by `a` is also covered
//! by `b`. Commutative and non-reflexive.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use corpusdb_core::{Annotation, Component, ComponentType, Match, NodeId, ANNIS_NS};
use corpusdb_graph::{AnnotationGraph, GraphStorage};

use crate::token_helper::TokenHelper;

use super::{BinaryOperator, DEFAULT_OPERATOR_SELECTIVITY};

/// Shared-token overlap.
pub struct Overlap<'a> {
    gs_order: Arc<dyn GraphStorage>,
    gs_cov: Arc<dyn GraphStorage>,
    tok_helper: TokenHelper<'a>,
}

impl<'a> Overlap<'a> {
    /// Creates the operator; `None` when the corpus lacks the required
    /// components.
    #[must_use]
    pub fn new(graph: &'a AnnotationGraph) -> Option<Self> {
        let ordering = Component::new(ComponentType::Ordering, ANNIS_NS, "");
        let cov = Component::new(ComponentType::Coverage, ANNIS_NS, "");
        Some(Self {
            gs_order: graph.get_graphstorage(&ordering)?,
            gs_cov: graph.get_graphstorage(&cov)?,
            tok_helper: TokenHelper::new(graph)?,
        })
    }
}

impl fmt::Display for Overlap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_o_")
    }
}

impl BinaryOperator for Overlap<'_> {
    fn retrieve_matches<'b>(&'b self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'b> {
        // an ordered set both deduplicates and makes the order stable
        let mut result: BTreeSet<NodeId> = BTreeSet::new();

        let covered: Vec<NodeId> = if self.tok_helper.is_token(lhs.node) {
            vec![lhs.node]
        } else {
            self.gs_cov.find_connected(lhs.node, 1, 1).collect()
        };

        for token in covered {
            result.insert(token);
            for covering in self.gs_cov.find_connected_inverse(token, 1, 1) {
                result.insert(covering);
            }
        }

        Box::new(result.into_iter().map(|n| Match::new(n, Annotation::default())))
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        let (Some((l_lhs, r_lhs)), Some((l_rhs, r_rhs))) =
            (self.tok_helper.span_for(lhs.node), self.tok_helper.span_for(rhs.node))
        else {
            return false;
        };
        // the spans intersect iff each one starts before the other ends
        self.gs_order.distance(l_lhs, r_rhs).is_some()
            && self.gs_order.distance(l_rhs, r_lhs).is_some()
    }

    fn is_reflexive(&self) -> bool {
        false
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn selectivity(&self) -> f64 {
        let (Some(cov_stats), Some(order_stats)) =
            (self.gs_cov.get_statistics(), self.gs_order.get_statistics())
        else {
            return DEFAULT_OPERATOR_SELECTIVITY;
        };
        if order_stats.nodes == 0 {
            return DEFAULT_OPERATOR_SELECTIVITY;
        }
        if cov_stats.nodes == 0 {
            // a corpus of bare tokens: only identity overlaps
            return 1.0 / order_stats.nodes as f64;
        }
        // per covered token one aligned non-token node per coverage edge
        let covered_per_node = cov_stats.fan_out_99_percentile as f64;
        let aligned = covered_per_node + covered_per_node * covered_per_node;
        (aligned / cov_stats.nodes as f64).clamp(0.0, 1.0)
    }
}
