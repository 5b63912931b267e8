//! The parsed-query contract.
//!
//! Front-ends hand the engine a [`Query`]: an ordered list of node
//! searches plus operator entries referring to them by index. The planner
//! turns this into an execution DAG; see [`plan`](crate::plan).

use std::fmt;

use corpusdb_graph::AnnotationGraph;

use crate::operator::{
    BaseEdgeOp, BinaryOperator, IdenticalCoverage, IdenticalNode, Inclusion, Overlap, Precedence,
};
use crate::search::NodeSearchSpec;

/// An edge-annotation requirement of a dominance or pointing operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeAnnoSpec {
    /// Optional namespace of the edge annotation.
    pub ns: Option<String>,
    /// Name of the edge annotation.
    pub name: String,
    /// Optional required value; `None` only requires the key.
    pub val: Option<String>,
}

/// The operator of one [`OperatorEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorKind {
    /// Token precedence within a distance window (`.`).
    Precedence {
        /// Minimum token distance.
        min_dist: usize,
        /// Maximum token distance; `usize::MAX` is unbounded.
        max_dist: usize,
    },
    /// Dominance over syntax trees (`>`).
    Dominance {
        /// Optional layer restriction.
        layer: Option<String>,
        /// Optional component name; `None` unions all dominance components.
        name: Option<String>,
        /// Minimum path length.
        min_dist: usize,
        /// Maximum path length; `usize::MAX` is unbounded.
        max_dist: usize,
        /// Optional edge-annotation requirement.
        edge_anno: Option<EdgeAnnoSpec>,
    },
    /// Pointing relations (`->`).
    Pointing {
        /// Optional layer restriction.
        layer: Option<String>,
        /// Optional component name; `None` unions all pointing components.
        name: Option<String>,
        /// Minimum path length.
        min_dist: usize,
        /// Maximum path length; `usize::MAX` is unbounded.
        max_dist: usize,
        /// Optional edge-annotation requirement.
        edge_anno: Option<EdgeAnnoSpec>,
    },
    /// Token-span containment (`_i_`).
    Inclusion,
    /// Shared-token overlap (`_o_`).
    Overlap,
    /// Equal token spans (`_=_`).
    IdenticalCoverage,
    /// Node identity (`_ident_`), requiring two predicates of one node.
    IdenticalNode,
}

impl OperatorKind {
    /// Whether the operands of this operator can be swapped without
    /// changing the result set.
    #[must_use]
    pub fn is_commutative(&self) -> bool {
        matches!(self, Self::Overlap | Self::IdenticalCoverage | Self::IdenticalNode)
    }

    /// Instantiates the operator against a corpus image.
    ///
    /// `None` when the corpus lacks a component the operator needs.
    pub(crate) fn create_operator<'a>(
        &self,
        graph: &'a AnnotationGraph,
    ) -> Option<Box<dyn BinaryOperator + 'a>> {
        match self {
            Self::Precedence { min_dist, max_dist } => Precedence::new(graph, *min_dist, *max_dist)
                .map(|op| Box::new(op) as Box<dyn BinaryOperator>),
            Self::Dominance { layer, name, min_dist, max_dist, edge_anno } => {
                Some(Box::new(BaseEdgeOp::dominance(
                    graph,
                    layer.as_deref(),
                    name.as_deref(),
                    *min_dist,
                    *max_dist,
                    edge_anno.as_ref(),
                )))
            }
            Self::Pointing { layer, name, min_dist, max_dist, edge_anno } => {
                Some(Box::new(BaseEdgeOp::pointing(
                    graph,
                    layer.as_deref(),
                    name.as_deref(),
                    *min_dist,
                    *max_dist,
                    edge_anno.as_ref(),
                )))
            }
            Self::Inclusion => {
                Inclusion::new(graph).map(|op| Box::new(op) as Box<dyn BinaryOperator>)
            }
            Self::Overlap => Overlap::new(graph).map(|op| Box::new(op) as Box<dyn BinaryOperator>),
            Self::IdenticalCoverage => {
                IdenticalCoverage::new(graph).map(|op| Box::new(op) as Box<dyn BinaryOperator>)
            }
            Self::IdenticalNode => Some(Box::new(IdenticalNode::new())),
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precedence { .. } => write!(f, "."),
            Self::Dominance { .. } => write!(f, ">"),
            Self::Pointing { .. } => write!(f, "->"),
            Self::Inclusion => write!(f, "_i_"),
            Self::Overlap => write!(f, "_o_"),
            Self::IdenticalCoverage => write!(f, "_=_"),
            Self::IdenticalNode => write!(f, "_ident_"),
        }
    }
}

/// One operator application between two query nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorEntry {
    /// The operator.
    pub kind: OperatorKind,
    /// Index of the left operand node.
    pub idx_left: usize,
    /// Index of the right operand node.
    pub idx_right: usize,
    /// Forces a nested-loop join for this entry.
    pub force_nested_loop: bool,
}

/// One node search of a query together with its output flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryNode {
    /// What qualifies a node as this operand.
    pub spec: NodeSearchSpec,
    /// Rewrites every match to the bare node, deduplicated, so the search
    /// behaves like "any node with this property".
    pub wrap_as_node: bool,
}

/// A parsed query: node searches plus operator entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    nodes: Vec<QueryNode>,
    operators: Vec<OperatorEntry>,
}

impl Query {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node search, returning its index.
    pub fn add_node(&mut self, spec: NodeSearchSpec) -> usize {
        self.add_node_with_wrap(spec, false)
    }

    /// Adds a node search with an explicit wrap flag, returning its index.
    pub fn add_node_with_wrap(&mut self, spec: NodeSearchSpec, wrap_as_node: bool) -> usize {
        self.nodes.push(QueryNode { spec, wrap_as_node });
        self.nodes.len() - 1
    }

    /// Adds an operator entry between two node indices.
    pub fn add_operator(&mut self, kind: OperatorKind, idx_left: usize, idx_right: usize) {
        self.add_operator_entry(OperatorEntry { kind, idx_left, idx_right, force_nested_loop: false });
    }

    /// Adds a fully specified operator entry.
    pub fn add_operator_entry(&mut self, entry: OperatorEntry) {
        self.operators.push(entry);
    }

    /// The node searches, in index order.
    #[must_use]
    pub fn nodes(&self) -> &[QueryNode] {
        &self.nodes
    }

    /// The operator entries, in application order.
    #[must_use]
    pub fn operators(&self) -> &[OperatorEntry] {
        &self.operators
    }
}
