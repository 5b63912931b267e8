//! The pre/post-order storage.
//!
//! Specialized for DOMINANCE-like trees and DAGs. A left-first DFS assigns
//! every (node, subtree-root) pair an interval `[pre, post]` and a level;
//! `target` is a descendant of `source` iff `source.pre <= target.pre` and
//! `target.post <= source.post`, and the level difference is the path
//! length. `find_connected` scans the order index inside the `[pre, post]`
//! window of each source entry.
//!
//! Order and level widths are type parameters; the registry selects them
//! from node count and maximum depth.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::io::Write;
use std::ops::Bound::Included;

use serde::{Deserialize, Serialize};

use corpusdb_core::{AnnoStorage, Annotation, Edge, NodeId};

use crate::error::{GraphError, GraphResult};
use crate::graph::AnnotationGraph;
use crate::registry;
use crate::traversal::CycleSafeDfs;

use super::{EdgeContainer, GraphStatistic, GraphStorage, NumValue};

/// The DFS interval and depth of one (node, subtree-root) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(bound(deserialize = "O: NumValue, L: NumValue"))]
pub struct PrePost<O, L> {
    /// Preorder number.
    pub pre: O,
    /// Postorder number.
    pub post: O,
    /// Depth below the subtree root.
    pub level: L,
}

/// Pre/post-order storage with order width `O` and level width `L`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "O: NumValue, L: NumValue"))]
pub struct PrePostOrderStorage<O: NumValue, L: NumValue> {
    node_to_order: BTreeMap<NodeId, Vec<PrePost<O, L>>>,
    order_to_node: BTreeMap<PrePost<O, L>, NodeId>,
    annos: AnnoStorage<Edge>,
    stats: Option<GraphStatistic>,
}

struct NodeStackEntry<O, L> {
    node: NodeId,
    order: PrePost<O, L>,
}

impl<O: NumValue, L: NumValue> Default for PrePostOrderStorage<O, L> {
    fn default() -> Self {
        Self {
            node_to_order: BTreeMap::new(),
            order_to_node: BTreeMap::new(),
            annos: AnnoStorage::new(),
            stats: None,
        }
    }
}

impl<O: NumValue, L: NumValue> PrePostOrderStorage<O, L> {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn capacity_error() -> GraphError {
        GraphError::CapacityExceeded { storage: registry::prepost_id::<O, L>() }
    }

    fn enter_node(
        current_order: &mut usize,
        node: NodeId,
        level: usize,
        stack: &mut Vec<NodeStackEntry<O, L>>,
    ) -> GraphResult<()> {
        let order = PrePost {
            pre: O::from_usize(*current_order).ok_or_else(Self::capacity_error)?,
            post: O::ZERO,
            level: L::from_usize(level).ok_or_else(Self::capacity_error)?,
        };
        *current_order += 1;
        stack.push(NodeStackEntry { node, order });
        Ok(())
    }

    fn exit_node(
        &mut self,
        current_order: &mut usize,
        stack: &mut Vec<NodeStackEntry<O, L>>,
    ) -> GraphResult<()> {
        if let Some(mut entry) = stack.pop() {
            entry.order.post = O::from_usize(*current_order).ok_or_else(Self::capacity_error)?;
            *current_order += 1;

            self.node_to_order.entry(entry.node).or_default().push(entry.order);
            self.order_to_node.insert(entry.order, entry.node);
        }
        Ok(())
    }

    /// Level difference when `source_order` dominates `target_order`.
    fn level_diff(source_order: &PrePost<O, L>, target_order: &PrePost<O, L>) -> Option<usize> {
        if source_order.pre <= target_order.pre && target_order.post <= source_order.post {
            target_order.level.to_usize().checked_sub(source_order.level.to_usize())
        } else {
            None
        }
    }
}

impl<O: NumValue, L: NumValue> EdgeContainer for PrePostOrderStorage<O, L> {
    fn get_outgoing_edges<'a>(&'a self, node: NodeId) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        self.find_connected(node, 1, 1)
    }

    fn get_ingoing_edges<'a>(&'a self, node: NodeId) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        self.find_connected_inverse(node, 1, 1)
    }
}

impl<O: NumValue, L: NumValue> GraphStorage for PrePostOrderStorage<O, L> {
    fn find_connected<'a>(
        &'a self,
        node: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        let Some(start_orders) = self.node_to_order.get(&node) else {
            return Box::new(std::iter::empty());
        };

        let mut visited = HashSet::<NodeId>::new();
        let it = start_orders
            .iter()
            .flat_map(move |root_order| {
                let window_start = PrePost { pre: root_order.pre, post: O::ZERO, level: L::ZERO };
                let window_end = PrePost { pre: root_order.post, post: O::MAX, level: L::MAX };
                self.order_to_node
                    .range((Included(window_start), Included(window_end)))
                    .map(move |(order, node)| (*root_order, *order, *node))
            })
            .filter(move |(root_order, order, _)| {
                Self::level_diff(root_order, order)
                    .map_or(false, |diff| diff >= min_distance && diff <= max_distance)
            })
            .map(|(_, _, node)| node)
            .filter(move |n| visited.insert(*n));
        Box::new(it)
    }

    fn find_connected_inverse<'a>(
        &'a self,
        node: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        let Some(target_orders) = self.node_to_order.get(&node) else {
            return Box::new(std::iter::empty());
        };

        // ancestors have a smaller preorder, so scanning up to the
        // target's preorder covers all candidates
        let mut visited = HashSet::<NodeId>::new();
        let it = target_orders
            .iter()
            .flat_map(move |target_order| {
                let window_end = PrePost { pre: target_order.pre, post: O::MAX, level: L::MAX };
                self.order_to_node
                    .range(..=window_end)
                    .map(move |(order, node)| (*target_order, *order, *node))
            })
            .filter(move |(target_order, order, _)| {
                Self::level_diff(order, target_order)
                    .map_or(false, |diff| diff >= min_distance && diff <= max_distance)
            })
            .map(|(_, _, node)| node)
            .filter(move |n| visited.insert(*n));
        Box::new(it)
    }

    fn is_connected(
        &self,
        source: NodeId,
        target: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> bool {
        if let (Some(source_orders), Some(target_orders)) =
            (self.node_to_order.get(&source), self.node_to_order.get(&target))
        {
            for source_order in source_orders {
                for target_order in target_orders {
                    if let Some(diff) = Self::level_diff(source_order, target_order) {
                        if diff >= min_distance && diff <= max_distance {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    fn distance(&self, source: NodeId, target: NodeId) -> Option<usize> {
        if source == target {
            return Some(0);
        }
        let source_orders = self.node_to_order.get(&source)?;
        let target_orders = self.node_to_order.get(&target)?;

        let mut min_level: Option<usize> = None;
        for source_order in source_orders {
            for target_order in target_orders {
                if let Some(diff) = Self::level_diff(source_order, target_order) {
                    min_level = Some(min_level.map_or(diff, |m| m.min(diff)));
                }
            }
        }
        min_level
    }

    fn get_edge_annos(&self, edge: &Edge) -> Vec<Annotation> {
        self.annos.get_all(edge).to_vec()
    }

    fn get_anno_storage(&self) -> &AnnoStorage<Edge> {
        &self.annos
    }

    fn get_statistics(&self) -> Option<&GraphStatistic> {
        self.stats.as_ref()
    }

    fn copy_from(&mut self, graph: &AnnotationGraph, orig: &dyn GraphStorage) -> GraphResult<()> {
        self.node_to_order.clear();
        self.order_to_node.clear();
        self.annos.clear();

        let mut roots: std::collections::BTreeSet<NodeId> = std::collections::BTreeSet::new();
        for node in graph.all_nodes() {
            if orig.get_outgoing_edges(node).next().is_some() {
                roots.insert(node);
            }
        }
        for source in graph.all_nodes() {
            for target in orig.get_outgoing_edges(source) {
                roots.remove(&target);
                let edge = Edge { source, target };
                for anno in orig.get_edge_annos(&edge) {
                    self.annos.insert(edge, anno);
                }
            }
        }

        let mut current_order = 0usize;
        for root in roots {
            let mut stack: Vec<NodeStackEntry<O, L>> = Vec::new();
            let mut last_distance = 0usize;

            Self::enter_node(&mut current_order, root, 0, &mut stack)?;

            for step in CycleSafeDfs::new(orig.as_edge_container(), root, 1, usize::MAX) {
                if step.distance <= last_distance {
                    // the previous subtree is complete: everything deeper
                    // than the new node's parent gets its post-order now
                    while stack.len() > step.distance {
                        self.exit_node(&mut current_order, &mut stack)?;
                    }
                }
                Self::enter_node(&mut current_order, step.node, step.distance, &mut stack)?;
                last_distance = step.distance;
            }
            while !stack.is_empty() {
                self.exit_node(&mut current_order, &mut stack)?;
            }
        }

        self.stats = orig.get_statistics().cloned();
        Ok(())
    }

    fn serialization_id(&self) -> &'static str {
        registry::prepost_id::<O, L>()
    }

    fn as_edge_container(&self) -> &dyn EdgeContainer {
        self
    }

    fn save_data(&self, out: &mut dyn Write) -> GraphResult<()> {
        bincode::serialize_into(out, self)?;
        Ok(())
    }

    fn estimated_memory_size(&self) -> usize {
        let entry = std::mem::size_of::<PrePost<O, L>>() + std::mem::size_of::<NodeId>();
        2 * self.order_to_node.len() * entry + self.annos.estimated_memory_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::adjacency::AdjacencyListStorage;
    use crate::storage::WriteableGraphStorage;

    /// The DAG from the adjacency tests:
    /// 1 -> {2, 3}, 2 -> 4, 3 -> {4, 5}, 5 -> {6, 7}
    fn dag(graph: &mut AnnotationGraph) -> AdjacencyListStorage {
        let mut orig = AdjacencyListStorage::new();
        for n in 1..=7u32 {
            graph.add_node(n, &format!("n{n}"));
        }
        for (s, t) in [(1, 2), (2, 4), (1, 3), (3, 4), (3, 5), (5, 6), (5, 7)] {
            orig.add_edge(Edge::new(s, t));
        }
        orig
    }

    fn prepost(graph: &AnnotationGraph, orig: &AdjacencyListStorage) -> PrePostOrderStorage<u32, u32> {
        let mut gs = PrePostOrderStorage::new();
        gs.copy_from(graph, orig).expect("copy");
        gs
    }

    #[test]
    fn connectivity_matches_explicit_dfs() {
        let mut graph = AnnotationGraph::new();
        let orig = dag(&mut graph);
        let gs = prepost(&graph, &orig);

        for source in 1..=7u32 {
            for target in 1..=7u32 {
                for (min, max) in [(1, 1), (1, 3), (2, 2), (0, usize::MAX)] {
                    let expected = orig.is_connected(source, target, min, max);
                    assert_eq!(
                        expected,
                        gs.is_connected(source, target, min, max),
                        "{source} ->[{min},{max}] {target}"
                    );
                }
            }
        }
    }

    #[test]
    fn distance_is_minimal_level_difference() {
        let mut graph = AnnotationGraph::new();
        let orig = dag(&mut graph);
        let gs = prepost(&graph, &orig);

        assert_eq!(Some(1), gs.distance(1, 2));
        assert_eq!(Some(2), gs.distance(1, 4));
        assert_eq!(Some(3), gs.distance(1, 6));
        assert_eq!(Some(0), gs.distance(4, 4));
        assert_eq!(None, gs.distance(4, 1));
    }

    #[test]
    fn find_connected_deduplicates_across_orders() {
        let mut graph = AnnotationGraph::new();
        let orig = dag(&mut graph);
        let gs = prepost(&graph, &orig);

        let mut reachable: Vec<NodeId> = gs.find_connected(1, 1, usize::MAX).collect();
        reachable.sort_unstable();
        assert_eq!(vec![2, 3, 4, 5, 6, 7], reachable);

        let mut reachable: Vec<NodeId> = gs.find_connected(3, 1, 1).collect();
        reachable.sort_unstable();
        assert_eq!(vec![4, 5], reachable);
    }

    #[test]
    fn inverse_reaches_ancestors() {
        let mut graph = AnnotationGraph::new();
        let orig = dag(&mut graph);
        let gs = prepost(&graph, &orig);

        let mut ancestors: Vec<NodeId> = gs.find_connected_inverse(6, 1, usize::MAX).collect();
        ancestors.sort_unstable();
        assert_eq!(vec![1, 3, 5], ancestors);

        let mut parents: Vec<NodeId> = gs.find_connected_inverse(4, 1, 1).collect();
        parents.sort_unstable();
        assert_eq!(vec![2, 3], parents);
    }

    #[test]
    fn small_widths_reject_large_components() {
        let mut graph = AnnotationGraph::new();
        let mut orig = AdjacencyListStorage::new();
        // a path deeper than a u8 level can hold
        for n in 0..300u32 {
            graph.add_node(n, &format!("n{n}"));
            if n > 0 {
                orig.add_edge(Edge::new(n - 1, n));
            }
        }
        let mut gs: PrePostOrderStorage<u32, u8> = PrePostOrderStorage::new();
        assert!(gs.copy_from(&graph, &orig).is_err());
    }
}
