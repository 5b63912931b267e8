//! Pull-based execution nodes.
//!
//! Every node of an execution DAG is an iterator over match tuples
//! ([`MatchGroup`]); tuple columns are assigned at plan time and recorded
//! in each node's [`Desc`]. The join kinds:
//!
//! - [`nodesearch::NodeSearch`] - base annotation searches
//! - [`nestedloop::NestedLoop`] - cross product with a filter
//! - [`seedjoin`] - seeds from the operator, probed against annotation
//!   sets
//! - [`indexjoin::IndexJoin`] - seeds probed through a match-generator
//!   function
//! - [`parallel::TaskIndexJoin`] - the same, fanned out on a worker pool
//! - [`filter::Filter`] - same-component condition without new tuples

pub mod filter;
pub mod indexjoin;
pub mod nestedloop;
pub mod nodesearch;
pub mod parallel;
pub mod seedjoin;

use std::collections::BTreeMap;

use corpusdb_core::Match;

/// One match tuple; columns are query-node positions assigned by the
/// planner.
pub type MatchGroup = Vec<Match>;

/// Cardinality estimate of one execution node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostEstimate {
    /// Estimated number of tuples this node outputs.
    pub output: usize,
    /// Estimated number of tuples processed to produce the output.
    pub processed_in_step: usize,
    /// `processed_in_step` summed over this node and all inputs.
    pub intermediate_sum: usize,
}

/// Plan-time description of an execution node.
#[derive(Debug, Clone, Default)]
pub struct Desc {
    /// The connected component of the execution graph this node belongs
    /// to.
    pub component_nr: usize,
    /// Maps query-node indices to tuple columns.
    pub node_pos: BTreeMap<usize, usize>,
    /// Short name of the join/search implementation.
    pub impl_description: String,
    /// Human-readable fragment of the query this node computes.
    pub query_fragment: String,
    /// The cardinality estimate, when statistics allowed one.
    pub cost: Option<CostEstimate>,
    /// Description of the left input.
    pub lhs: Option<Box<Desc>>,
    /// Description of the right input.
    pub rhs: Option<Box<Desc>>,
}

impl Desc {
    /// Description of a base search for one query node.
    #[must_use]
    pub fn base(node_nr: usize, impl_description: &str, query_fragment: &str) -> Self {
        let mut node_pos = BTreeMap::new();
        node_pos.insert(node_nr, 0);
        Self {
            component_nr: node_nr,
            node_pos,
            impl_description: impl_description.to_string(),
            query_fragment: query_fragment.to_string(),
            cost: None,
            lhs: None,
            rhs: None,
        }
    }

    /// Description of a join of two inputs; the right columns are shifted
    /// behind the left ones.
    #[must_use]
    pub fn join(impl_description: &str, query_fragment: &str, lhs: &Desc, rhs: &Desc) -> Self {
        let mut node_pos = lhs.node_pos.clone();
        let offset = lhs.node_pos.len();
        for (node, pos) in &rhs.node_pos {
            node_pos.insert(*node, pos + offset);
        }
        Self {
            component_nr: lhs.component_nr,
            node_pos,
            impl_description: impl_description.to_string(),
            query_fragment: query_fragment.to_string(),
            cost: None,
            lhs: Some(Box::new(lhs.clone())),
            rhs: Some(Box::new(rhs.clone())),
        }
    }

    /// Description of a filter over one input; columns are unchanged.
    #[must_use]
    pub fn filter(query_fragment: &str, input: &Desc) -> Self {
        Self {
            component_nr: input.component_nr,
            node_pos: input.node_pos.clone(),
            impl_description: String::from("filter"),
            query_fragment: query_fragment.to_string(),
            cost: None,
            lhs: Some(Box::new(input.clone())),
            rhs: None,
        }
    }

    /// Indented multi-line rendering of the plan below this node.
    #[must_use]
    pub fn debug_string(&self, indent: &str) -> String {
        let mut out = format!("{indent}+|{}", self.impl_description);
        if !self.query_fragment.is_empty() {
            out.push_str(&format!(" ({})", self.query_fragment));
        }
        if let Some(cost) = &self.cost {
            out.push_str(&format!(
                " [out: {} sum: {}]",
                cost.output, cost.intermediate_sum
            ));
        }
        out.push('\n');
        let deeper = format!("{indent}    ");
        if let Some(lhs) = &self.lhs {
            out.push_str(&lhs.debug_string(&deeper));
        }
        if let Some(rhs) = &self.rhs {
            out.push_str(&rhs.debug_string(&deeper));
        }
        out
    }
}

/// An execution node: a pull iterator over match tuples plus its plan
/// description.
pub trait ExecutionNode: Iterator<Item = MatchGroup> {
    /// The plan-time description of this node.
    fn get_desc(&self) -> Option<&Desc>;
}

/// A boxed execution node.
pub type BoxedExecutionNode<'a> = Box<dyn ExecutionNode<Item = MatchGroup> + 'a>;

/// Shared reflexivity rule: a non-reflexive operator never pairs a node
/// with itself under the same annotation key.
#[must_use]
pub fn reflexivity_allows(op_is_reflexive: bool, lhs: &Match, rhs: &Match) -> bool {
    op_is_reflexive || !lhs.same_node_and_key(rhs)
}
