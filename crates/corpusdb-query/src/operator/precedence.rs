//! The precedence operator (`.`).
//!
//! `a . b` holds when the right-most token of `a` precedes the left-most
//! token of `b` within the configured token distance, measured in the
//! reserved ORDERING component.

use std::fmt;
use std::sync::Arc;

use corpusdb_core::{Annotation, Component, ComponentType, Match, ANNIS_NS};
use corpusdb_graph::{AnnotationGraph, GraphStorage};

use crate::token_helper::TokenHelper;

use super::{edge_reachability_selectivity, format_range, BinaryOperator};

/// Token precedence within a distance window.
pub struct Precedence<'a> {
    gs_order: Arc<dyn GraphStorage>,
    gs_left: Arc<dyn GraphStorage>,
    tok_helper: TokenHelper<'a>,
    min_dist: usize,
    max_dist: usize,
}

impl<'a> Precedence<'a> {
    /// Creates the operator; `None` when the corpus lacks the ORDERING or
    /// LEFT_TOKEN component.
    #[must_use]
    pub fn new(graph: &'a AnnotationGraph, min_dist: usize, max_dist: usize) -> Option<Self> {
        let ordering = Component::new(ComponentType::Ordering, ANNIS_NS, "");
        let left = Component::new(ComponentType::LeftToken, ANNIS_NS, "");
        Some(Self {
            gs_order: graph.get_graphstorage(&ordering)?,
            gs_left: graph.get_graphstorage(&left)?,
            tok_helper: TokenHelper::new(graph)?,
            min_dist,
            max_dist,
        })
    }
}

impl fmt::Display for Precedence<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", format_range(self.min_dist, self.max_dist))
    }
}

impl BinaryOperator for Precedence<'_> {
    fn retrieve_matches<'b>(&'b self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'b> {
        let Some(lhs_token) = self.tok_helper.right_token_for(lhs.node) else {
            return Box::new(std::iter::empty());
        };

        // every token in the window, plus every node left-aligned with it
        let mut result: Vec<Match> = Vec::new();
        for token in self.gs_order.find_connected(lhs_token, self.min_dist, self.max_dist) {
            result.push(Match::new(token, Annotation::default()));
            for aligned in self.gs_left.get_ingoing_edges(token) {
                result.push(Match::new(aligned, Annotation::default()));
            }
        }
        Box::new(result.into_iter())
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        let (Some(lhs_token), Some(rhs_token)) = (
            self.tok_helper.right_token_for(lhs.node),
            self.tok_helper.left_token_for(rhs.node),
        ) else {
            return false;
        };
        self.gs_order
            .is_connected(lhs_token, rhs_token, self.min_dist, self.max_dist)
    }

    fn is_reflexive(&self) -> bool {
        false
    }

    fn selectivity(&self) -> f64 {
        edge_reachability_selectivity(self.gs_order.get_statistics(), self.min_dist, self.max_dist)
    }
}
