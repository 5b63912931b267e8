//! The single-threaded index join.
//!
//! Like a seed join, but the per-candidate probe is an opaque match
//! generator function. The planner builds that function from the right
//! search's annotation condition; the task-parallel variant in
//! [`parallel`](super::parallel) ships the same function to a worker
//! pool.

use std::collections::VecDeque;

use corpusdb_core::{Match, NodeId};

use crate::operator::BinaryOperator;

use super::{reflexivity_allows, BoxedExecutionNode, Desc, ExecutionNode, MatchGroup};

/// The per-candidate probe of an index join.
pub type MatchGenerator<'a> = Box<dyn Fn(NodeId) -> Vec<Match> + Send + Sync + 'a>;

/// Function-probing seed join.
pub struct IndexJoin<'a> {
    op: Box<dyn BinaryOperator + 'a>,
    left: BoxedExecutionNode<'a>,
    lhs_idx: usize,
    match_gen: MatchGenerator<'a>,

    current_lhs: Option<MatchGroup>,
    candidates: VecDeque<Match>,
    rhs_buffer: VecDeque<Match>,
    desc: Desc,
}

impl<'a> IndexJoin<'a> {
    /// Creates the join.
    pub fn new(
        op: Box<dyn BinaryOperator + 'a>,
        left: BoxedExecutionNode<'a>,
        lhs_idx: usize,
        match_gen: MatchGenerator<'a>,
        desc: Desc,
    ) -> Self {
        Self {
            op,
            left,
            lhs_idx,
            match_gen,
            current_lhs: None,
            candidates: VecDeque::new(),
            rhs_buffer: VecDeque::new(),
            desc,
        }
    }
}

impl ExecutionNode for IndexJoin<'_> {
    fn get_desc(&self) -> Option<&Desc> {
        Some(&self.desc)
    }
}

impl Iterator for IndexJoin<'_> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        loop {
            if let Some(rhs) = self.rhs_buffer.pop_front() {
                let mut result = self.current_lhs.clone()?;
                result.push(rhs);
                return Some(result);
            }

            if let Some(candidate) = self.candidates.pop_front() {
                let lhs_match = *self.current_lhs.as_ref()?.get(self.lhs_idx)?;
                for rhs in (self.match_gen)(candidate.node) {
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
