//! The linear storage.
//!
//! Specialized for ORDERING components, where every node has at most one
//! outgoing edge and cycles are absent. Each node stores the root of its
//! chain and its position inside it; connectivity and distance reduce to
//! an integer subtraction, and `find_connected` is a slice of the chain.
//!
//! The position width is a type parameter so short chains pay one byte per
//! position; the registry selects it from the component's maximum depth.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use corpusdb_core::{AnnoStorage, Annotation, Edge, NodeId};

use crate::error::{GraphError, GraphResult};
use crate::graph::AnnotationGraph;
use crate::registry;

use super::{EdgeContainer, GraphStatistic, GraphStorage, NumValue};

/// Position of a node inside its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: NumValue"))]
pub struct RelativePosition<P> {
    /// The first node of the chain.
    pub root: NodeId,
    /// The distance from the root.
    pub pos: P,
}

/// Chain storage with positions of width `P`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: NumValue"))]
pub struct LinearStorage<P: NumValue> {
    node_to_pos: BTreeMap<NodeId, RelativePosition<P>>,
    node_chains: BTreeMap<NodeId, Vec<NodeId>>,
    annos: AnnoStorage<Edge>,
    stats: Option<GraphStatistic>,
}

impl<P: NumValue> Default for LinearStorage<P> {
    fn default() -> Self {
        Self {
            node_to_pos: BTreeMap::new(),
            node_chains: BTreeMap::new(),
            annos: AnnoStorage::new(),
            stats: None,
        }
    }
}

impl<P: NumValue> LinearStorage<P> {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn chain_window(
        &self,
        node: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> Option<&[NodeId]> {
        let pos = self.node_to_pos.get(&node)?;
        let chain = self.node_chains.get(&pos.root)?;
        let start = pos.pos.to_usize().checked_add(min_distance)?;
        if start >= chain.len() {
            return None;
        }
        let end = pos.pos.to_usize().saturating_add(max_distance).min(chain.len() - 1);
        Some(&chain[start..=end])
    }
}

impl<P: NumValue> EdgeContainer for LinearStorage<P> {
    fn get_outgoing_edges<'a>(&'a self, node: NodeId) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        self.find_connected(node, 1, 1)
    }

    fn get_ingoing_edges<'a>(&'a self, node: NodeId) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        self.find_connected_inverse(node, 1, 1)
    }
}

impl<P: NumValue> GraphStorage for LinearStorage<P> {
    fn find_connected<'a>(
        &'a self,
        node: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        match self.chain_window(node, min_distance, max_distance) {
            Some(window) => Box::new(window.iter().copied()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn find_connected_inverse<'a>(
        &'a self,
        node: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        let window = self.node_to_pos.get(&node).and_then(|pos| {
            let chain = self.node_chains.get(&pos.root)?;
            let here = pos.pos.to_usize();
            let end = here.checked_sub(min_distance)?;
            let start = here.saturating_sub(max_distance);
            Some(&chain[start..=end])
        });
        match window {
            // walk outward from the node, nearest predecessor first
            Some(window) => Box::new(window.iter().rev().copied()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn is_connected(
        &self,
        source: NodeId,
        target: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> bool {
        if let (Some(s), Some(t)) = (self.node_to_pos.get(&source), self.node_to_pos.get(&target)) {
            if s.root == t.root && s.pos <= t.pos {
                let diff = t.pos.to_usize() - s.pos.to_usize();
                return diff >= min_distance && diff <= max_distance;
            }
        }
        false
    }

    fn distance(&self, source: NodeId, target: NodeId) -> Option<usize> {
        let s = self.node_to_pos.get(&source)?;
        let t = self.node_to_pos.get(&target)?;
        if s.root == t.root && s.pos <= t.pos {
            Some(t.pos.to_usize() - s.pos.to_usize())
        } else {
            None
        }
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
        self.node_to_pos.clear();
        self.node_chains.clear();
        self.annos.clear();

        // roots: sources that are not the target of any edge
        let mut roots: std::collections::BTreeSet<NodeId> = std::collections::BTreeSet::new();
        for node in graph.all_nodes() {
            if orig.get_outgoing_edges(node).next().is_some() {
                roots.insert(node);
            }
        }
        for node in graph.all_nodes() {
            for target in orig.get_outgoing_edges(node) {
                roots.remove(&target);
                let edge = Edge { source: node, target };
                for anno in orig.get_edge_annos(&edge) {
                    self.annos.insert(edge, anno);
                }
            }
        }

        for root in roots {
            let mut chain: Vec<NodeId> = Vec::new();
            let mut current = Some(root);
            while let Some(node) = current {
                if self.node_to_pos.contains_key(&node) {
                    break;
                }
                let pos = P::from_usize(chain.len()).ok_or(GraphError::CapacityExceeded {
                    storage: registry::linear_id::<P>(),
                })?;
                self.node_to_pos.insert(node, RelativePosition { root, pos });
                chain.push(node);
                current = orig.get_outgoing_edges(node).next();
            }
            self.node_chains.insert(root, chain);
        }

        self.stats = orig.get_statistics().cloned();
        Ok(())
    }

    fn serialization_id(&self) -> &'static str {
        registry::linear_id::<P>()
    }

    fn as_edge_container(&self) -> &dyn EdgeContainer {
        self
    }

    fn save_data(&self, out: &mut dyn Write) -> GraphResult<()> {
        bincode::serialize_into(out, self)?;
        Ok(())
    }

    fn estimated_memory_size(&self) -> usize {
        self.node_to_pos.len()
            * (std::mem::size_of::<NodeId>() + std::mem::size_of::<RelativePosition<P>>())
            + self
                .node_chains
                .values()
                .map(|c| c.len() * std::mem::size_of::<NodeId>())
                .sum::<usize>()
            + self.annos.estimated_memory_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::adjacency::AdjacencyListStorage;
    use crate::storage::WriteableGraphStorage;

    fn token_chain(graph: &mut AnnotationGraph, len: NodeId) -> AdjacencyListStorage {
        let mut orig = AdjacencyListStorage::new();
        for n in 0..len {
            graph.add_node(n, &format!("tok{n}"));
            if n + 1 < len {
                orig.add_edge(Edge::new(n, n + 1));
            }
        }
        orig
    }

    #[test]
    fn chain_connectivity_is_subtraction() {
        let mut graph = AnnotationGraph::new();
        let orig = token_chain(&mut graph, 10);

        let mut gs: LinearStorage<u8> = LinearStorage::new();
        gs.copy_from(&graph, &orig).expect("copy");

        assert!(gs.is_connected(0, 5, 5, 5));
        assert!(gs.is_connected(2, 4, 1, 10));
        assert!(!gs.is_connected(4, 2, 1, 10));
        assert_eq!(Some(7), gs.distance(1, 8));
        assert_eq!(Some(0), gs.distance(3, 3));
        assert_eq!(None, gs.distance(8, 1));
    }

    #[test]
    fn find_connected_slices_the_chain() {
        let mut graph = AnnotationGraph::new();
        let orig = token_chain(&mut graph, 10);
        let mut gs: LinearStorage<u32> = LinearStorage::new();
        gs.copy_from(&graph, &orig).expect("copy");

        assert_eq!(vec![4, 5, 6], gs.find_connected(2, 2, 4).collect::<Vec<_>>());
        assert_eq!(vec![9], gs.find_connected(8, 1, 100).collect::<Vec<_>>());
        assert_eq!(0, gs.find_connected(9, 1, 100).count());

        assert_eq!(vec![1, 0], gs.find_connected_inverse(2, 1, 5).collect::<Vec<_>>());
        assert_eq!(0, gs.find_connected_inverse(0, 1, 5).count());
    }

    #[test]
    fn narrow_width_overflows_cleanly() {
        let mut graph = AnnotationGraph::new();
        let orig = token_chain(&mut graph, 300);
        let mut gs: LinearStorage<u8> = LinearStorage::new();
        assert!(gs.copy_from(&graph, &orig).is_err());

        let mut gs: LinearStorage<u16> = LinearStorage::new();
        assert!(gs.copy_from(&graph, &orig).is_ok());
        assert_eq!(Some(299), gs.distance(0, 299));
    }

    #[test]
    fn multiple_chains_stay_separate() {
        let mut graph = AnnotationGraph::new();
        for n in 0..6u32 {
            graph.add_node(n, &format!("n{n}"));
        }
        let mut orig = AdjacencyListStorage::new();
        orig.add_edge(Edge::new(0, 1));
        orig.add_edge(Edge::new(1, 2));
        orig.add_edge(Edge::new(3, 4));
        orig.add_edge(Edge::new(4, 5));

        let mut gs: LinearStorage<u8> = LinearStorage::new();
        gs.copy_from(&graph, &orig).expect("copy");

        assert!(gs.is_connected(0, 2, 2, 2));
        assert!(gs.is_connected(3, 5, 2, 2));
        assert!(!gs.is_connected(0, 5, 0, usize::MAX));
        assert_eq!(None, gs.distance(2, 3));
    }
}
