//! Per-component graph storages.
//!
//! Every edge component of a corpus is held by exactly one storage. All
//! storages answer the same reachability questions through
//! [`GraphStorage`]; they differ in how much they precompute:
//!
//! - [`adjacency::AdjacencyListStorage`] - ordered edge sets, reachability
//!   by DFS. The writable fallback; also serves COVERAGE components via its
//!   built-in inverse index.
//! - [`linear::LinearStorage`] - for ORDERING chains; connectivity is an
//!   integer subtraction. Parameterized by the position width.
//! - [`prepost::PrePostOrderStorage`] - for DOMINANCE trees and DAGs;
//!   ancestorship is an interval containment test. Parameterized by order
//!   and level width.
//!
//! The [`registry`](crate::registry) picks a representation from component
//! statistics.

pub mod adjacency;
pub mod linear;
pub mod prepost;

use std::io::Write;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use corpusdb_core::{AnnoKey, AnnoStorage, Annotation, Edge, NodeId};

use crate::error::GraphResult;
use crate::graph::AnnotationGraph;

/// Edge expansion, the minimal interface traversal algorithms need.
pub trait EdgeContainer: Send + Sync {
    /// Nodes reachable over a single outgoing edge.
    fn get_outgoing_edges<'a>(&'a self, node: NodeId) -> Box<dyn Iterator<Item = NodeId> + 'a>;

    /// Nodes with an edge pointing at `node`.
    fn get_ingoing_edges<'a>(&'a self, node: NodeId) -> Box<dyn Iterator<Item = NodeId> + 'a>;
}

/// The uniform contract of a per-component graph storage.
///
/// Distances count edges: `min = max = 1` describes the direct edge
/// relation, `max = usize::MAX` is unbounded.
pub trait GraphStorage: EdgeContainer {
    /// Nodes reachable from `node` with a path length in
    /// `[min_distance, max_distance]`, each yielded once.
    fn find_connected<'a>(
        &'a self,
        node: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeId> + 'a>;

    /// Nodes from which `node` is reachable with a path length in
    /// `[min_distance, max_distance]`, each yielded once.
    fn find_connected_inverse<'a>(
        &'a self,
        node: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeId> + 'a>;

    /// Whether a path of length in `[min_distance, max_distance]` leads
    /// from `source` to `target`.
    fn is_connected(
        &self,
        source: NodeId,
        target: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> bool;

    /// Length of the shortest path from `source` to `target`, if any.
    fn distance(&self, source: NodeId, target: NodeId) -> Option<usize>;

    /// All annotations of a direct edge.
    fn get_edge_annos(&self, edge: &Edge) -> Vec<Annotation>;

    /// The edge-annotation storage of this component.
    fn get_anno_storage(&self) -> &AnnoStorage<Edge>;

    /// The statistics of this component, if they have been computed.
    fn get_statistics(&self) -> Option<&GraphStatistic>;

    /// Rebuilds this storage from another representation of the same
    /// component.
    fn copy_from(&mut self, graph: &AnnotationGraph, orig: &dyn GraphStorage) -> GraphResult<()>;

    /// Access to the mutation interface, for storages that have one.
    fn as_writeable(&mut self) -> Option<&mut dyn WriteableGraphStorage> {
        None
    }

    /// This storage as a bare edge container, for traversal algorithms.
    fn as_edge_container(&self) -> &dyn EdgeContainer;

    /// The stable name this storage is registered and serialized under.
    fn serialization_id(&self) -> &'static str;

    /// Writes the storage contents for a snapshot.
    fn save_data(&self, out: &mut dyn Write) -> GraphResult<()>;

    /// Byte-level estimate of the heap memory held by this storage.
    fn estimated_memory_size(&self) -> usize;
}

/// Mutation interface of the writable (adjacency) storage.
pub trait WriteableGraphStorage: GraphStorage {
    /// Adds an edge. Loops (`source == target`) are ignored.
    fn add_edge(&mut self, edge: Edge);
    /// Annotates an existing edge.
    fn add_edge_annotation(&mut self, edge: Edge, anno: Annotation);
    /// Removes an edge and its annotations.
    fn delete_edge(&mut self, edge: &Edge);
    /// Removes one annotation of an edge.
    fn delete_edge_annotation(&mut self, edge: &Edge, key: &AnnoKey);
    /// Removes all edges touching a node.
    fn delete_node(&mut self, node: NodeId);
    /// Recomputes the component statistics.
    fn calculate_statistics(&mut self);
    /// Removes all edges and annotations.
    fn clear(&mut self);
}

/// Statistics of one component, the input to representation selection and
/// operator selectivity estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistic {
    /// Number of distinct nodes that are source or target of an edge.
    pub nodes: usize,
    /// Average fan-out over the nodes with outgoing edges.
    pub avg_fan_out: f64,
    /// Largest fan-out of any node.
    pub max_fan_out: usize,
    /// 99th percentile of the fan-out distribution.
    pub fan_out_99_percentile: usize,
    /// Maximum DFS depth from any root; 0 for cyclic components.
    pub max_depth: usize,
    /// True when the component contains a cycle.
    pub cyclic: bool,
    /// True when every target node has exactly one incoming edge.
    pub rooted_tree: bool,
    /// DFS visits divided by the number of nodes; > 1 means shared
    /// subtrees.
    pub dfs_visit_ratio: f64,
}

impl Default for GraphStatistic {
    fn default() -> Self {
        Self {
            nodes: 0,
            avg_fan_out: 0.0,
            max_fan_out: 0,
            fan_out_99_percentile: 0,
            max_depth: 1,
            cyclic: false,
            rooted_tree: true,
            dfs_visit_ratio: 0.0,
        }
    }
}

/// Unsigned width parameter of the compact storages.
///
/// Implemented for `u8` through `u64`; the registry picks the narrowest
/// width the component statistics allow.
pub trait NumValue:
    Copy
    + Ord
    + Eq
    + std::hash::Hash
    + std::fmt::Debug
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// The zero value.
    const ZERO: Self;
    /// The largest representable value.
    const MAX: Self;
    /// The width in bits, used for registry names.
    const BITS: u32;
    /// Conversion from `usize`, `None` on overflow.
    fn from_usize(value: usize) -> Option<Self>;
    /// Widening conversion to `usize`.
    fn to_usize(self) -> usize;
}

macro_rules! impl_num_value {
    ($($t:ty),*) => {
        $(
            impl NumValue for $t {
                const ZERO: Self = 0;
                const MAX: Self = <$t>::MAX;
                const BITS: u32 = <$t>::BITS;

                fn from_usize(value: usize) -> Option<Self> {
                    Self::try_from(value).ok()
                }

                fn to_usize(self) -> usize {
                    self as usize
                }
            }
        )*
    };
}

impl_num_value!(u8, u16, u32);
