//! Span borders over the reserved alignment components.
//!
//! The span of a node is the token interval `[L, R]` reachable through the
//! `LEFT_TOKEN` and `RIGHT_TOKEN` components; a token spans itself. Every
//! span operator shares this helper.

use std::sync::Arc;

use corpusdb_core::{AnnoKey, AnnoStorage, Component, ComponentType, NodeId, ANNIS_NS};
use corpusdb_graph::{AnnotationGraph, GraphStorage};

/// Resolves token alignment questions against one corpus image.
#[derive(Clone)]
pub struct TokenHelper<'a> {
    node_annos: &'a AnnoStorage<NodeId>,
    tok_key: AnnoKey,
    left_edges: Arc<dyn GraphStorage>,
    right_edges: Arc<dyn GraphStorage>,
    cov_edges: Arc<dyn GraphStorage>,
}

impl<'a> TokenHelper<'a> {
    /// Creates a helper; `None` when the corpus lacks the alignment
    /// components.
    #[must_use]
    pub fn new(graph: &'a AnnotationGraph) -> Option<Self> {
        let left = Component::new(ComponentType::LeftToken, ANNIS_NS, "");
        let right = Component::new(ComponentType::RightToken, ANNIS_NS, "");
        let cov = Component::new(ComponentType::Coverage, ANNIS_NS, "");

        Some(Self {
            node_annos: graph.node_annos(),
            tok_key: graph.token_key(),
            left_edges: graph.get_graphstorage(&left)?,
            right_edges: graph.get_graphstorage(&right)?,
            cov_edges: graph.get_graphstorage(&cov)?,
        })
    }

    /// True when the node is a surface token.
    ///
    /// A token carries the reserved `annis::tok` annotation and does not
    /// cover any other node.
    #[must_use]
    pub fn is_token(&self, node: NodeId) -> bool {
        self.node_annos.get(&node, &self.tok_key).is_some()
            && self.cov_edges.get_outgoing_edges(node).next().is_none()
    }

    /// The left-most token covered by the node.
    #[must_use]
    pub fn left_token_for(&self, node: NodeId) -> Option<NodeId> {
        if self.is_token(node) {
            Some(node)
        } else {
            self.left_edges.get_outgoing_edges(node).next()
        }
    }

    /// The right-most token covered by the node.
    #[must_use]
    pub fn right_token_for(&self, node: NodeId) -> Option<NodeId> {
        if self.is_token(node) {
            Some(node)
        } else {
            self.right_edges.get_outgoing_edges(node).next()
        }
    }

    /// Both span borders at once.
    #[must_use]
    pub fn span_for(&self, node: NodeId) -> Option<(NodeId, NodeId)> {
        Some((self.left_token_for(node)?, self.right_token_for(node)?))
    }
}
