//! The task-parallel index join.
//!
//! Takes a bounded window of left tuples, evaluates the per-tuple
//! retrieve-and-probe function for all of them on a shared worker pool,
//! and drains the results in submission order, so the emitted tuple
//! stream is identical to the single-threaded index join's.

use std::collections::VecDeque;
use std::sync::Arc;

use rayon::prelude::*;

use super::{BoxedExecutionNode, Desc, ExecutionNode, MatchGroup};

/// Default bound of the in-flight task window.
pub const DEFAULT_MAX_BUFFERED_TASKS: usize = 128;

/// The per-left-tuple computation: retrieve candidates, probe them, emit
/// finished tuples.
pub type TaskFn<'a> = dyn Fn(&MatchGroup) -> Vec<MatchGroup> + Send + Sync + 'a;

/// Index join fanned out over a worker pool.
pub struct TaskIndexJoin<'a> {
    left: BoxedExecutionNode<'a>,
    task_fn: Arc<TaskFn<'a>>,
    pool: Arc<rayon::ThreadPool>,
    max_buffered_tasks: usize,

    match_buffer: VecDeque<MatchGroup>,
    desc: Desc,
}

impl<'a> TaskIndexJoin<'a> {
    /// Creates the join.
    ///
    /// `max_buffered_tasks` bounds how many left tuples are in flight at
    /// once; 0 falls back to the default window.
    pub fn new(
        left: BoxedExecutionNode<'a>,
        task_fn: Arc<TaskFn<'a>>,
        pool: Arc<rayon::ThreadPool>,
        max_buffered_tasks: usize,
        desc: Desc,
    ) -> Self {
        let max_buffered_tasks = if max_buffered_tasks == 0 {
            DEFAULT_MAX_BUFFERED_TASKS
        } else {
            max_buffered_tasks
        };
        Self { left, task_fn, pool, max_buffered_tasks, match_buffer: VecDeque::new(), desc }
    }

    /// Fills the match buffer from the next window of left tuples.
    ///
    /// Returns false once the left side is exhausted and nothing was
    /// buffered.
    fn next_match_buffer(&mut self) -> bool {
        loop {
            let mut window: Vec<MatchGroup> = Vec::with_capacity(self.max_buffered_tasks);
            while window.len() < self.max_buffered_tasks {
                match self.left.next() {
                    Some(tuple) => window.push(tuple),
                    None => break,
                }
            }
            if window.is_empty() {
                return false;
            }

            let task_fn: &TaskFn<'a> = &*self.task_fn;
            // the collect preserves the submission order of the window
            let results: Vec<Vec<MatchGroup>> = self
                .pool
                .install(|| window.par_iter().map(|tuple| task_fn(tuple)).collect());

            for group in results {
                self.match_buffer.extend(group);
            }
            if !self.match_buffer.is_empty() {
                return true;
            }
        }
    }
}

impl ExecutionNode for TaskIndexJoin<'_> {
    fn get_desc(&self) -> Option<&Desc> {
        Some(&self.desc)
    }
}

impl Iterator for TaskIndexJoin<'_> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        loop {
            if let Some(tuple) = self.match_buffer.pop_front() {
                return Some(tuple);
            }
            if !self.next_match_buffer() {
                return None;
            }
        }
    }
}
