//! The identical-coverage operator (`_=_`).
//!
//! `a _=_ b` holds when both spans have the same left and the same right
//! token. Commutative and non-reflexive.

use std::fmt;
use std::sync::Arc;

use corpusdb_core::{Annotation, Component, ComponentType, Match, ANNIS_NS};
use corpusdb_graph::{AnnotationGraph, GraphStorage};

use crate::token_helper::TokenHelper;

use super::{BinaryOperator, DEFAULT_OPERATOR_SELECTIVITY};

/// Equal token spans.
pub struct IdenticalCoverage<'a> {
    gs_left: Arc<dyn GraphStorage>,
    gs_order: Arc<dyn GraphStorage>,
    tok_helper: TokenHelper<'a>,
}

impl<'a> IdenticalCoverage<'a> {
    /// Creates the operator; `None` when the corpus lacks the required
    /// components.
    #[must_use]
    pub fn new(graph: &'a AnnotationGraph) -> Option<Self> {
        let left = Component::new(ComponentType::LeftToken, ANNIS_NS, "");
        let ordering = Component::new(ComponentType::Ordering, ANNIS_NS, "");
        Some(Self {
            gs_left: graph.get_graphstorage(&left)?,
            gs_order: graph.get_graphstorage(&ordering)?,
            tok_helper: TokenHelper::new(graph)?,
        })
    }
}

impl fmt::Display for IdenticalCoverage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_=_")
    }
}

impl BinaryOperator for IdenticalCoverage<'_> {
    fn retrieve_matches<'b>(&'b self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'b> {
        let Some((left_tok, right_tok)) = self.tok_helper.span_for(lhs.node) else {
            return Box::new(std::iter::empty());
        };

        let mut result: Vec<Match> = Vec::new();
        if left_tok == right_tok {
            // the span is a single token, which trivially covers itself
            result.push(Match::new(left_tok, Annotation::default()));
        }
        for candidate in self.gs_left.get_ingoing_edges(left_tok) {
            if self.tok_helper.right_token_for(candidate) == Some(right_tok) {
                result.push(Match::new(candidate, Annotation::default()));
            }
        }
        Box::new(result.into_iter())
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        match (self.tok_helper.span_for(lhs.node), self.tok_helper.span_for(rhs.node)) {
            (Some(span_lhs), Some(span_rhs)) => span_lhs == span_rhs,
            _ => false,
        }
    }

    fn is_reflexive(&self) -> bool {
        false
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn selectivity(&self) -> f64 {
        // two nodes share a coverage iff they share the left token and the
        // span length; assume the length matches once the start does
        match self.gs_order.get_statistics() {
            Some(stats) if stats.nodes > 0 => 1.0 / stats.nodes as f64,
            _ => DEFAULT_OPERATOR_SELECTIVITY,
        }
    }
}
