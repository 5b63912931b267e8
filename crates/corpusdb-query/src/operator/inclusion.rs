//! The inclusion operator (`_i_`).
//!
//! `a _i_ b` holds when the token span of `b` lies inside the token span
//! of `a`: `L(a) <= L(b)` and `R(b) <= R(a)`, both measured along the
//! reserved ORDERING component.

use std::fmt;
use std::sync::Arc;

use corpusdb_core::{Annotation, Component, ComponentType, Match, ANNIS_NS};
use corpusdb_graph::{AnnotationGraph, GraphStorage};

use crate::token_helper::TokenHelper;

use super::{BinaryOperator, DEFAULT_OPERATOR_SELECTIVITY};

/// Token-span containment.
pub struct Inclusion<'a> {
    gs_order: Arc<dyn GraphStorage>,
    gs_left: Arc<dyn GraphStorage>,
    gs_cov: Arc<dyn GraphStorage>,
    tok_helper: TokenHelper<'a>,
}

impl<'a> Inclusion<'a> {
    /// Creates the operator; `None` when the corpus lacks the required
    /// components.
    #[must_use]
    pub fn new(graph: &'a AnnotationGraph) -> Option<Self> {
        let ordering = Component::new(ComponentType::Ordering, ANNIS_NS, "");
        let left = Component::new(ComponentType::LeftToken, ANNIS_NS, "");
        let cov = Component::new(ComponentType::Coverage, ANNIS_NS, "");
        Some(Self {
            gs_order: graph.get_graphstorage(&ordering)?,
            gs_left: graph.get_graphstorage(&left)?,
            gs_cov: graph.get_graphstorage(&cov)?,
            tok_helper: TokenHelper::new(graph)?,
        })
    }
}

impl fmt::Display for Inclusion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_i_")
    }
}

impl BinaryOperator for Inclusion<'_> {
    fn retrieve_matches<'b>(&'b self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'b> {
        let Some((left_tok, right_tok)) = self.tok_helper.span_for(lhs.node) else {
            return Box::new(std::iter::empty());
        };
        let Some(span_length) = self.gs_order.distance(left_tok, right_tok) else {
            return Box::new(std::iter::empty());
        };

        let mut result: Vec<Match> = Vec::new();
        // every token inside the span is a candidate, and so is every
        // node left-aligned with it whose span ends inside ours
        for token in self.gs_order.find_connected(left_tok, 0, span_length) {
            result.push(Match::new(token, Annotation::default()));
            for aligned in self.gs_left.get_ingoing_edges(token) {
                if let Some(aligned_end) = self.tok_helper.right_token_for(aligned) {
                    if self.gs_order.is_connected(aligned_end, right_tok, 0, usize::MAX) {
                        result.push(Match::new(aligned, Annotation::default()));
                    }
                }
            }
        }
        Box::new(result.into_iter())
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        let (Some((l_lhs, r_lhs)), Some((l_rhs, r_rhs))) =
            (self.tok_helper.span_for(lhs.node), self.tok_helper.span_for(rhs.node))
        else {
            return false;
        };
        self.gs_order.distance(l_lhs, l_rhs).is_some()
            && self.gs_order.distance(r_rhs, r_lhs).is_some()
    }

    fn selectivity(&self) -> f64 {
        // the coverage fan-out approximates the span length distribution,
        // scaled by the number of tokens
        match (self.gs_cov.get_statistics(), self.gs_order.get_statistics()) {
            (Some(cov_stats), Some(order_stats)) if order_stats.nodes > 0 => {
                (cov_stats.avg_fan_out.max(1.0) / order_stats.nodes as f64).clamp(0.0, 1.0)
            }
            _ => DEFAULT_OPERATOR_SELECTIVITY,
        }
    }
}
