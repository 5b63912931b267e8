//! The adjacency-list storage.
//!
//! Ordered edge set plus an ordered inverse edge set and an
//! edge-annotation storage. Every reachability question is answered by a
//! cycle-safe DFS, which makes this the representation of last resort: it
//! can hold any component, it is the only writable storage, and its
//! inverse index lets COVERAGE components use it directly.

use std::collections::BTreeSet;
use std::io::Write;

use serde::{Deserialize, Serialize};

use corpusdb_core::{AnnoKey, AnnoStorage, Annotation, Edge, NodeId};

use crate::error::GraphResult;
use crate::graph::AnnotationGraph;
use crate::registry;
use crate::traversal::{CycleSafeDfs, UniqueDfs};

use super::{EdgeContainer, GraphStatistic, GraphStorage, WriteableGraphStorage};

/// The writable fallback storage.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AdjacencyListStorage {
    edges: BTreeSet<Edge>,
    inverse_edges: BTreeSet<Edge>,
    annos: AnnoStorage<Edge>,
    stats: Option<GraphStatistic>,
}

/// View of an adjacency storage with all edges reversed.
///
/// Lets the inverse reachability queries reuse the plain DFS.
struct InverseView<'a>(&'a AdjacencyListStorage);

impl<'a> EdgeContainer for InverseView<'a> {
    fn get_outgoing_edges<'b>(&'b self, node: NodeId) -> Box<dyn Iterator<Item = NodeId> + 'b> {
        self.0.get_ingoing_edges(node)
    }

    fn get_ingoing_edges<'b>(&'b self, node: NodeId) -> Box<dyn Iterator<Item = NodeId> + 'b> {
        self.0.get_outgoing_edges(node)
    }
}

impl AdjacencyListStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of edges.
    #[must_use]
    pub fn num_of_edges(&self) -> usize {
        self.edges.len()
    }

    fn targets_of<'a>(
        edges: &'a BTreeSet<Edge>,
        source: NodeId,
    ) -> impl Iterator<Item = NodeId> + 'a {
        edges
            .range(Edge { source, target: NodeId::MIN }..=Edge { source, target: NodeId::MAX })
            .map(|e| e.target)
    }
}

impl EdgeContainer for AdjacencyListStorage {
    fn get_outgoing_edges<'a>(&'a self, node: NodeId) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        Box::new(Self::targets_of(&self.edges, node))
    }

    fn get_ingoing_edges<'a>(&'a self, node: NodeId) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        Box::new(Self::targets_of(&self.inverse_edges, node))
    }
}

impl GraphStorage for AdjacencyListStorage {
    fn find_connected<'a>(
        &'a self,
        node: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        Box::new(UniqueDfs::new(self, node, min_distance, max_distance))
    }

    fn find_connected_inverse<'a>(
        &'a self,
        node: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> Box<dyn Iterator<Item = NodeId> + 'a> {
        let mut visited = std::collections::HashSet::new();
        let steps: Vec<NodeId> = CycleSafeDfs::new(&InverseView(self), node, min_distance, max_distance)
            .map(|s| s.node)
            .filter(|n| visited.insert(*n))
            .collect();
        Box::new(steps.into_iter())
    }

    fn is_connected(
        &self,
        source: NodeId,
        target: NodeId,
        min_distance: usize,
        max_distance: usize,
    ) -> bool {
        CycleSafeDfs::new(self, source, min_distance, max_distance)
            .any(|step| step.node == target)
    }

    fn distance(&self, source: NodeId, target: NodeId) -> Option<usize> {
        CycleSafeDfs::new(self, source, 0, usize::MAX)
            .filter(|step| step.node == target)
            .map(|step| step.distance)
            .min()
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
        self.clear();
        for source in graph.all_nodes() {
            for target in orig.get_outgoing_edges(source) {
                let edge = Edge { source, target };
                self.add_edge(edge);
                for anno in orig.get_edge_annos(&edge) {
                    self.add_edge_annotation(edge, anno);
                }
            }
        }
        self.stats = orig.get_statistics().cloned();
        Ok(())
    }

    fn as_writeable(&mut self) -> Option<&mut dyn WriteableGraphStorage> {
        Some(self)
    }

    fn serialization_id(&self) -> &'static str {
        registry::ADJACENCY
    }

    fn as_edge_container(&self) -> &dyn EdgeContainer {
        self
    }

    fn save_data(&self, out: &mut dyn Write) -> GraphResult<()> {
        bincode::serialize_into(out, self)?;
        Ok(())
    }

    fn estimated_memory_size(&self) -> usize {
        2 * self.edges.len() * std::mem::size_of::<Edge>()
            + self.annos.estimated_memory_size()
    }
}

impl WriteableGraphStorage for AdjacencyListStorage {
    fn add_edge(&mut self, edge: Edge) {
        if edge.source != edge.target {
            self.inverse_edges.insert(edge.inverse());
            self.edges.insert(edge);
            self.stats = None;
        }
    }

    fn add_edge_annotation(&mut self, edge: Edge, anno: Annotation) {
        if self.edges.contains(&edge) {
            self.annos.insert(edge, anno);
        }
    }

    fn delete_edge(&mut self, edge: &Edge) {
        self.edges.remove(edge);
        self.inverse_edges.remove(&edge.inverse());
        for anno in self.annos.get_all(edge).to_vec() {
            self.annos.remove(edge, &anno.key);
        }
        self.stats = None;
    }

    fn delete_edge_annotation(&mut self, edge: &Edge, key: &AnnoKey) {
        self.annos.remove(edge, key);
    }

    fn delete_node(&mut self, node: NodeId) {
        let mut to_delete: Vec<Edge> = Self::targets_of(&self.edges, node)
            .map(|target| Edge { source: node, target })
            .collect();
        to_delete.extend(
            Self::targets_of(&self.inverse_edges, node)
                .map(|source| Edge { source, target: node }),
        );
        for edge in to_delete {
            self.delete_edge(&edge);
        }
    }

    fn calculate_statistics(&mut self) {
        let mut stats = GraphStatistic::default();

        let mut all_nodes: BTreeSet<NodeId> = BTreeSet::new();
        let mut has_incoming: BTreeSet<NodeId> = BTreeSet::new();
        let mut roots: BTreeSet<NodeId> = BTreeSet::new();

        for edge in &self.edges {
            roots.insert(edge.source);
            all_nodes.insert(edge.source);
            all_nodes.insert(edge.target);
            if !has_incoming.insert(edge.target) {
                stats.rooted_tree = false;
            }
        }
        stats.nodes = all_nodes.len();

        // fan-outs over the sorted edge set: one run per source
        let mut fan_outs: Vec<usize> = Vec::new();
        let mut sum_fan_out = 0usize;
        let mut last_source: Option<NodeId> = None;
        let mut current_fan_out = 0usize;
        for edge in &self.edges {
            roots.remove(&edge.target);
            if last_source != Some(edge.source) {
                if last_source.is_some() {
                    stats.max_fan_out = stats.max_fan_out.max(current_fan_out);
                    sum_fan_out += current_fan_out;
                    fan_outs.push(current_fan_out);
                }
                last_source = Some(edge.source);
                current_fan_out = 0;
            }
            current_fan_out += 1;
        }
        if last_source.is_some() {
            stats.max_fan_out = stats.max_fan_out.max(current_fan_out);
            sum_fan_out += current_fan_out;
            fan_outs.push(current_fan_out);
        }

        fan_outs.sort_unstable();
        if let Some(largest) = fan_outs.last() {
            stats.fan_out_99_percentile = *largest;
        }
        if fan_outs.len() >= 100 {
            let idx = fan_outs.len() - fan_outs.len() / 100;
            stats.fan_out_99_percentile = fan_outs[idx.min(fan_outs.len() - 1)];
        }

        let mut number_of_visits = 0usize;
        if roots.is_empty() && !self.edges.is_empty() {
            // edges but no roots: everything is on a cycle
            stats.cyclic = true;
        } else {
            for root in &roots {
                let mut dfs = CycleSafeDfs::new(self, *root, 0, usize::MAX);
                for step in dfs.by_ref() {
                    number_of_visits += 1;
                    stats.max_depth = stats.max_depth.max(step.distance);
                }
                if dfs.is_cyclic() {
                    stats.cyclic = true;
                }
            }
        }

        if stats.cyclic {
            stats.rooted_tree = false;
            stats.max_depth = 0;
            stats.dfs_visit_ratio = 0.0;
        } else if stats.nodes > 0 {
            stats.dfs_visit_ratio = number_of_visits as f64 / stats.nodes as f64;
        }

        if !fan_outs.is_empty() {
            stats.avg_fan_out = sum_fan_out as f64 / fan_outs.len() as f64;
        }

        self.stats = Some(stats);
    }

    fn clear(&mut self) {
        self.edges.clear();
        self.inverse_edges.clear();
        self.annos.clear();
        self.stats = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dag() -> AdjacencyListStorage {
        //  1 -> 2 -> 4
        //  1 -> 3 -> 4
        //       3 -> 5 -> 6
        //            5 -> 7
        let mut gs = AdjacencyListStorage::new();
        for (s, t) in [(1, 2), (2, 4), (1, 3), (3, 4), (3, 5), (5, 6), (5, 7)] {
            gs.add_edge(Edge::new(s, t));
        }
        gs
    }

    #[test]
    fn outgoing_is_ordered() {
        let gs = dag();
        assert_eq!(vec![2, 3], gs.get_outgoing_edges(1).collect::<Vec<_>>());
        assert_eq!(vec![4, 5], gs.get_outgoing_edges(3).collect::<Vec<_>>());
        assert_eq!(0, gs.get_outgoing_edges(6).count());
    }

    #[test]
    fn ingoing_uses_inverse_index() {
        let gs = dag();
        assert_eq!(vec![2, 3], gs.get_ingoing_edges(4).collect::<Vec<_>>());
        assert_eq!(0, gs.get_ingoing_edges(1).count());
    }

    #[test]
    fn find_connected_windows() {
        let gs = dag();

        let mut reachable: Vec<NodeId> = gs.find_connected(1, 1, 100).collect();
        reachable.sort_unstable();
        assert_eq!(vec![2, 3, 4, 5, 6, 7], reachable);

        let mut reachable: Vec<NodeId> = gs.find_connected(3, 2, 100).collect();
        reachable.sort_unstable();
        assert_eq!(vec![6, 7], reachable);

        assert_eq!(0, gs.find_connected(7, 1, 100).count());
    }

    #[test]
    fn distance_is_shortest_path() {
        let mut gs = AdjacencyListStorage::new();
        // long way 1->2->3->4 and shortcut 1->4
        for (s, t) in [(1, 2), (2, 3), (3, 4), (1, 4)] {
            gs.add_edge(Edge::new(s, t));
        }
        assert_eq!(Some(1), gs.distance(1, 4));
        assert_eq!(Some(0), gs.distance(1, 1));
        assert_eq!(None, gs.distance(4, 1));
    }

    #[test]
    fn edge_annotations_follow_edges() {
        let mut gs = AdjacencyListStorage::new();
        let e = Edge::new(1, 2);
        gs.add_edge(e);
        gs.add_edge_annotation(e, Annotation::new(1, 2, 3));
        assert_eq!(1, gs.get_edge_annos(&e).len());

        gs.delete_edge(&e);
        assert!(gs.get_edge_annos(&e).is_empty());
        assert_eq!(0, gs.get_anno_storage().total_len());
    }

    #[test]
    fn delete_node_removes_both_directions() {
        let mut gs = dag();
        gs.delete_node(4);
        assert_eq!(vec![5], gs.get_outgoing_edges(3).collect::<Vec<_>>());
        assert_eq!(vec![2, 3], gs.get_outgoing_edges(1).collect::<Vec<_>>());
        assert_eq!(0, gs.get_ingoing_edges(4).count());
    }

    #[test]
    fn statistics_of_dag() {
        let mut gs = dag();
        gs.calculate_statistics();
        let stats = gs.get_statistics().expect("statistics computed");

        assert_eq!(7, stats.nodes);
        assert!(!stats.cyclic);
        // node 4 has two incoming edges
        assert!(!stats.rooted_tree);
        assert_eq!(3, stats.max_depth);
        assert_eq!(2, stats.max_fan_out);
        assert!(stats.avg_fan_out > 1.0);
        assert!(stats.dfs_visit_ratio >= 1.0);
    }

    #[test]
    fn statistics_of_cycle() {
        let mut gs = AdjacencyListStorage::new();
        for (s, t) in [(1, 2), (2, 3), (3, 1)] {
            gs.add_edge(Edge::new(s, t));
        }
        gs.calculate_statistics();
        let stats = gs.get_statistics().expect("statistics computed");
        assert!(stats.cyclic);
        assert!(!stats.rooted_tree);
        assert_eq!(0, stats.max_depth);
    }

    #[test]
    fn statistics_of_tree() {
        let mut gs = AdjacencyListStorage::new();
        for (s, t) in [(1, 2), (1, 3), (2, 4), (2, 5)] {
            gs.add_edge(Edge::new(s, t));
        }
        gs.calculate_statistics();
        let stats = gs.get_statistics().expect("statistics computed");
        assert!(stats.rooted_tree);
        assert!(!stats.cyclic);
        assert_eq!(2, stats.max_depth);
    }
}
