//! The nested-loop join.
//!
//! Checks the operator's filter for every pair of input tuples. The
//! planner puts the smaller estimated side on the outer loop; the inner
//! side is materialized after its first pass so it can be re-iterated.

use std::iter::Peekable;

use crate::operator::BinaryOperator;

use super::{reflexivity_allows, BoxedExecutionNode, Desc, ExecutionNode, MatchGroup};

/// Filtering cross product of two execution nodes.
pub struct NestedLoop<'a> {
    op: Box<dyn BinaryOperator + 'a>,
    outer: Peekable<BoxedExecutionNode<'a>>,
    inner: BoxedExecutionNode<'a>,
    /// Column of the left operand inside the left tuple, and of the right
    /// operand inside the right tuple.
    lhs_idx: usize,
    rhs_idx: usize,
    /// True when the left input drives the outer loop.
    left_is_outer: bool,

    inner_cache: Vec<MatchGroup>,
    pos_inner_cache: Option<usize>,
    desc: Desc,
}

impl<'a> NestedLoop<'a> {
    /// Creates a nested-loop join.
    ///
    /// `left_is_outer` decides which input drives the outer loop; the
    /// emitted tuples are always `left ++ right`.
    pub fn new(
        op: Box<dyn BinaryOperator + 'a>,
        lhs: BoxedExecutionNode<'a>,
        rhs: BoxedExecutionNode<'a>,
        lhs_idx: usize,
        rhs_idx: usize,
        left_is_outer: bool,
        desc: Desc,
    ) -> Self {
        let (outer, inner) = if left_is_outer { (lhs, rhs) } else { (rhs, lhs) };
        Self {
            op,
            outer: outer.peekable(),
            inner,
            lhs_idx,
            rhs_idx,
            left_is_outer,
            inner_cache: Vec::new(),
            pos_inner_cache: None,
            desc,
        }
    }

    fn try_pair(&self, outer_tuple: &MatchGroup, inner_tuple: &MatchGroup) -> Option<MatchGroup> {
        let (left, right) = if self.left_is_outer {
            (outer_tuple, inner_tuple)
        } else {
            (inner_tuple, outer_tuple)
        };
        let lhs = &left[self.lhs_idx];
        let rhs = &right[self.rhs_idx];

        if reflexivity_allows(self.op.is_reflexive(), lhs, rhs) && self.op.filter_match(lhs, rhs) {
            let mut result = left.clone();
            result.extend_from_slice(right);
            Some(result)
        } else {
            None
        }
    }
}

impl ExecutionNode for NestedLoop<'_> {
    fn get_desc(&self) -> Option<&Desc> {
        Some(&self.desc)
    }
}

impl Iterator for NestedLoop<'_> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        loop {
            if let Some(outer_tuple) = self.outer.peek().cloned() {
                if let Some(mut cache_pos) = self.pos_inner_cache {
                    while cache_pos < self.inner_cache.len() {
                        let inner_tuple = &self.inner_cache[cache_pos];
                        cache_pos += 1;
                        self.pos_inner_cache = Some(cache_pos);
                        if let Some(result) = self.try_pair(&outer_tuple, inner_tuple) {
                            return Some(result);
                        }
                    }
                } else {
                    while let Some(inner_tuple) = self.inner.next() {
                        self.inner_cache.push(inner_tuple.clone());
                        if let Some(result) = self.try_pair(&outer_tuple, &inner_tuple) {
                            return Some(result);
                        }
                    }
                    // the inner side is fully materialized from now on
                    self.pos_inner_cache = Some(0);
                }
            }

            self.outer.next()?;
            self.pos_inner_cache = Some(0);
        }
    }
}
