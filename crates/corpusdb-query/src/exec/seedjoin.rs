//! Seed joins.
//!
//! A seed join never iterates the right-hand side: for every left tuple it
//! asks the operator for all reachable candidates and probes each against
//! the right search's annotation condition. The two variants differ in
//! that condition: a set of concrete annotations
//! ([`MaterializedSeedJoin`]) or a set of annotation keys
//! ([`AnnoKeySeedJoin`]).

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use corpusdb_core::{AnnoKey, Annotation, Match};
use corpusdb_graph::AnnotationGraph;

use crate::operator::BinaryOperator;

use super::nodesearch::{NodeSearchDesc, SearchKind};
use super::{reflexivity_allows, BoxedExecutionNode, Desc, ExecutionNode, MatchGroup};

struct SeedCore<'a> {
    graph: &'a AnnotationGraph,
    op: Box<dyn BinaryOperator + 'a>,
    left: BoxedExecutionNode<'a>,
    lhs_idx: usize,
    search: Arc<NodeSearchDesc>,

    current_lhs: Option<MatchGroup>,
    candidates: VecDeque<Match>,
    rhs_buffer: VecDeque<Match>,
    desc: Desc,
}

impl<'a> SeedCore<'a> {
    fn step(&mut self) -> Option<MatchGroup> {
        loop {
            if let Some(rhs) = self.rhs_buffer.pop_front() {
                let mut result = self.current_lhs.clone()?;
                result.push(rhs);
                return Some(result);
            }

            if let Some(candidate) = self.candidates.pop_front() {
                let lhs_match = *self.current_lhs.as_ref()?.get(self.lhs_idx)?;
                for rhs in self.search.matches_for_node(self.graph, candidate.node) {
                    if reflexivity_allows(self.op.is_reflexive(), &lhs_match, &rhs) {
                        self.rhs_buffer.push_back(rhs);
                    }
                }
                continue;
            }

            let lhs = self.left.next()?;
            let lhs_match = *lhs.get(self.lhs_idx)?;
            self.candidates = self.op.retrieve_matches(&lhs_match).collect();
            self.current_lhs = Some(lhs);
        }
    }
}

/// Seed join against a set of concrete annotations, the right side of an
/// exact-value (or regex) search.
pub struct MaterializedSeedJoin<'a> {
    core: SeedCore<'a>,
}

impl<'a> MaterializedSeedJoin<'a> {
    /// Creates the join.
    pub fn new(
        graph: &'a AnnotationGraph,
        op: Box<dyn BinaryOperator + 'a>,
        left: BoxedExecutionNode<'a>,
        lhs_idx: usize,
        valid_annotations: BTreeSet<Annotation>,
        const_anno: Option<Annotation>,
        desc: Desc,
    ) -> Self {
        Self {
            core: SeedCore {
                graph,
                op,
                left,
                lhs_idx,
                search: Arc::new(NodeSearchDesc {
                    kind: SearchKind::Value(valid_annotations),
                    const_anno,
                }),
                current_lhs: None,
                candidates: VecDeque::new(),
                rhs_buffer: VecDeque::new(),
                desc,
            },
        }
    }
}

impl ExecutionNode for MaterializedSeedJoin<'_> {
    fn get_desc(&self) -> Option<&Desc> {
        Some(&self.core.desc)
    }
}

impl Iterator for MaterializedSeedJoin<'_> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        self.core.step()
    }
}

/// Seed join against a set of annotation keys, the right side of an
/// exact-key search; values are whatever the corpus stores.
pub struct AnnoKeySeedJoin<'a> {
    core: SeedCore<'a>,
}

impl<'a> AnnoKeySeedJoin<'a> {
    /// Creates the join.
    pub fn new(
        graph: &'a AnnotationGraph,
        op: Box<dyn BinaryOperator + 'a>,
        left: BoxedExecutionNode<'a>,
        lhs_idx: usize,
        valid_keys: BTreeSet<AnnoKey>,
        const_anno: Option<Annotation>,
        desc: Desc,
    ) -> Self {
        Self {
            core: SeedCore {
                graph,
                op,
                left,
                lhs_idx,
                search: Arc::new(NodeSearchDesc { kind: SearchKind::Key(valid_keys), const_anno }),
                current_lhs: None,
                candidates: VecDeque::new(),
                rhs_buffer: VecDeque::new(),
                desc,
            },
        }
    }
}

impl ExecutionNode for AnnoKeySeedJoin<'_> {
    fn get_desc(&self) -> Option<&Desc> {
        Some(&self.core.desc)
    }
}

impl Iterator for AnnoKeySeedJoin<'_> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        self.core.step()
    }
}
