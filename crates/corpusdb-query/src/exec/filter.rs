//! The same-component filter.
//!
//! When both operands of an operator entry already live in one execution
//! component, no new tuples are created; the existing tuple stream is
//! filtered by the operator's condition.

use crate::operator::BinaryOperator;

use super::{reflexivity_allows, BoxedExecutionNode, Desc, ExecutionNode, MatchGroup};

/// Tuple filter over two columns of one input.
pub struct Filter<'a> {
    op: Box<dyn BinaryOperator + 'a>,
    input: BoxedExecutionNode<'a>,
    lhs_idx: usize,
    rhs_idx: usize,
    desc: Desc,
}

impl<'a> Filter<'a> {
    /// Creates the filter over the given tuple columns.
    pub fn new(
        op: Box<dyn BinaryOperator + 'a>,
        input: BoxedExecutionNode<'a>,
        lhs_idx: usize,
        rhs_idx: usize,
        desc: Desc,
    ) -> Self {
        Self { op, input, lhs_idx, rhs_idx, desc }
    }
}

impl ExecutionNode for Filter<'_> {
    fn get_desc(&self) -> Option<&Desc> {
        Some(&self.desc)
    }
}

impl Iterator for Filter<'_> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        loop {
            let tuple = self.input.next()?;
            let (Some(lhs), Some(rhs)) = (tuple.get(self.lhs_idx), tuple.get(self.rhs_idx)) else {
                continue;
            };
            if reflexivity_allows(self.op.is_reflexive(), lhs, rhs)
                && self.op.filter_match(lhs, rhs)
            {
                return Some(tuple);
            }
        }
    }
}
