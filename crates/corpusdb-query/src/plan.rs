//! The planner and the execution plan.
//!
//! Planning turns a [`Query`] into a single pull iterator:
//!
//! 1. every node search becomes a base execution node,
//! 2. operator entries are added in order; each either filters an
//!    existing component or joins two components,
//! 3. the join kind is chosen per entry: a filter when both operands
//!    already share a component, a seed join when the right side is still
//!    a base search, an operand swap into a seed join for commutative
//!    operators, and a nested loop otherwise.
//!
//! Cardinalities are estimated bottom-up and memoized in each node's
//! [`Desc`]; the plan cost is the root's summed intermediate size.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use corpusdb_graph::AnnotationGraph;

use crate::cancel::CancellationToken;
use crate::error::{QueryError, QueryResult};
use crate::exec::filter::Filter;
use crate::exec::indexjoin::IndexJoin;
use crate::exec::nestedloop::NestedLoop;
use crate::exec::nodesearch::{NodeSearch, NodeSearchDesc, SearchKind};
use crate::exec::parallel::TaskIndexJoin;
use crate::exec::seedjoin::{AnnoKeySeedJoin, MaterializedSeedJoin};
use crate::exec::{
    reflexivity_allows, BoxedExecutionNode, CostEstimate, Desc, ExecutionNode, MatchGroup,
};
use crate::operator::{BinaryOperator, EstimationType};
use crate::query::{OperatorEntry, Query};

/// Which join implementation non-parallel seed joins use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonParallelJoin {
    /// The function-probing index join (default).
    Index,
    /// The materialized-/key-seed joins.
    Seed,
}

/// Tuning knobs of the planner and executors.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Evaluate seed joins on a shared worker pool.
    pub use_parallel_joins: bool,
    /// Worker threads of the shared pool; 0 uses the available
    /// parallelism.
    pub num_parallel_workers: usize,
    /// Bound of the in-flight window of the task index join.
    pub max_buffered_tasks: usize,
    /// Swap commutative operands to avoid nested-loop joins.
    pub avoid_nested_by_switch: bool,
    /// Seed-join flavor when parallel joins are off.
    pub non_parallel_join: NonParallelJoin,
    /// Selectivity assumed for operators without statistics.
    pub default_selectivity: f64,
    /// Cardinality assumed for searches without statistics.
    pub default_base_tuples: usize,
    /// Let `find` return the tuples produced so far instead of failing on
    /// a timeout.
    pub partial_results_on_timeout: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            use_parallel_joins: false,
            num_parallel_workers: 0,
            max_buffered_tasks: 128,
            avoid_nested_by_switch: true,
            non_parallel_join: NonParallelJoin::Index,
            default_selectivity: 0.1,
            default_base_tuples: 100_000,
            partial_results_on_timeout: false,
        }
    }
}

enum JoinKind {
    NestedLoop,
    Seed,
}

/// One in-progress component of the execution graph.
struct PlanEntry<'a> {
    exec: BoxedExecutionNode<'a>,
    /// Set while the entry is still an unjoined base search.
    base_search: Option<Arc<NodeSearchDesc>>,
}

/// A planned query, ready to be pulled.
pub struct ExecutionPlan<'a> {
    root: BoxedExecutionNode<'a>,
    cancellation: CancellationToken,
    done: bool,
}

impl<'a> ExecutionPlan<'a> {
    /// Plans a query against a corpus image.
    pub fn from_query(
        graph: &'a AnnotationGraph,
        query: &Query,
        config: &QueryConfig,
        cancellation: CancellationToken,
    ) -> QueryResult<Self> {
        let planner = Planner { graph, config };
        let root = planner.build(query)?;
        if let Some(desc) = root.get_desc() {
            trace!("execution plan:\n{}", desc.debug_string(""));
        }
        Ok(Self { root, cancellation, done: false })
    }

    /// The description of the plan root.
    #[must_use]
    pub fn root_desc(&self) -> Option<&Desc> {
        self.root.get_desc()
    }

    /// The planner cost: the root's summed intermediate cardinality.
    #[must_use]
    pub fn cost(&self) -> Option<usize> {
        self.root_desc().and_then(|d| d.cost.as_ref()).map(|c| c.intermediate_sum)
    }
}

impl Iterator for ExecutionPlan<'_> {
    type Item = QueryResult<MatchGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.cancellation.check() {
            self.done = true;
            return Some(Err(e));
        }
        match self.root.next() {
            Some(tuple) => Some(Ok(tuple)),
            None => {
                self.done = true;
                None
            }
        }
    }
}

struct Planner<'a, 'c> {
    graph: &'a AnnotationGraph,
    config: &'c QueryConfig,
}

impl<'a, 'c> Planner<'a, 'c> {
    fn build(&self, query: &Query) -> QueryResult<BoxedExecutionNode<'a>> {
        let nodes = query.nodes();
        if nodes.is_empty() {
            return Err(QueryError::InvalidQuery(String::from("query has no nodes")));
        }
        for entry in query.operators() {
            if entry.idx_left >= nodes.len() || entry.idx_right >= nodes.len() {
                return Err(QueryError::InvalidQuery(format!(
                    "operator {} references nodes #{} and #{} but the query has {} nodes",
                    entry.kind,
                    entry.idx_left + 1,
                    entry.idx_right + 1,
                    nodes.len()
                )));
            }
        }

        // 1. base execution nodes, one component each
        let mut component2entry: BTreeMap<usize, PlanEntry<'a>> = BTreeMap::new();
        let mut node2component: BTreeMap<usize, usize> = BTreeMap::new();
        let mut estimates: Vec<Option<usize>> = Vec::with_capacity(nodes.len());

        for (node_nr, qnode) in nodes.iter().enumerate() {
            let mut search = NodeSearch::from_spec(&qnode.spec, qnode.wrap_as_node, node_nr, self.graph);
            let estimate = search.estimated_max_count();
            estimates.push(estimate);

            let mut desc = search
                .get_desc()
                .cloned()
                .ok_or_else(|| QueryError::InvalidQuery(String::from("search without description")))?;
            desc.cost = Some(CostEstimate {
                output: estimate.unwrap_or(self.config.default_base_tuples),
                processed_in_step: 0,
                intermediate_sum: 0,
            });
            let base_search = search.search_desc();
            search.set_desc(desc);

            node2component.insert(node_nr, node_nr);
            component2entry.insert(
                node_nr,
                PlanEntry { exec: Box::new(search), base_search: Some(base_search) },
            );
        }

        // 2. swap commutative operands so the smaller side seeds the join
        let mut entries: Vec<OperatorEntry> = query.operators().to_vec();
        if self.graph.node_annos().has_statistics() {
            for entry in &mut entries {
                if entry.kind.is_commutative() {
                    if let (Some(left), Some(right)) =
                        (estimates[entry.idx_left], estimates[entry.idx_right])
                    {
                        if left > right {
                            std::mem::swap(&mut entry.idx_left, &mut entry.idx_right);
                        }
                    }
                }
            }
        }

        let pool: Option<Arc<rayon::ThreadPool>> = if self.config.use_parallel_joins {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.num_parallel_workers)
                .build()
                .map_err(|e| QueryError::InvalidQuery(format!("worker pool: {e}")))?;
            Some(Arc::new(pool))
        } else {
            None
        };

        // 3. add the operator entries in order
        for entry in &entries {
            let op = entry.kind.create_operator(self.graph).ok_or_else(|| {
                QueryError::InvalidQuery(format!(
                    "operator {} is not applicable to this corpus",
                    entry.kind
                ))
            })?;

            let component_left = node2component[&entry.idx_left];
            let component_right = node2component[&entry.idx_right];

            if component_left == component_right {
                let input = component2entry.remove(&component_left).ok_or_else(internal_error)?;
                let new_entry = self.add_filter(op, entry, input)?;
                component2entry.insert(component_left, new_entry);
            } else {
                let lhs = component2entry.remove(&component_left).ok_or_else(internal_error)?;
                let rhs = component2entry.remove(&component_right).ok_or_else(internal_error)?;
                let new_entry = self.add_join(op, entry, lhs, rhs, pool.clone())?;
                component2entry.insert(component_left, new_entry);
                merge_components(&mut node2component, component_right, component_left);
            }
        }

        // 4. everything must have ended up in one component
        let mut first_component: Option<usize> = None;
        for (node_nr, component) in &node2component {
            match first_component {
                None => first_component = Some(*component),
                Some(first) if first != *component => {
                    return Err(QueryError::DisconnectedQuery(*node_nr + 1));
                }
                _ => {}
            }
        }

        component2entry
            .into_values()
            .next()
            .map(|entry| entry.exec)
            .ok_or_else(internal_error)
    }

    fn add_filter(
        &self,
        op: Box<dyn BinaryOperator + 'a>,
        entry: &OperatorEntry,
        input: PlanEntry<'a>,
    ) -> QueryResult<PlanEntry<'a>> {
        let input_desc = input.exec.get_desc().cloned().ok_or_else(internal_error)?;
        let lhs_idx = tuple_position(&input_desc, entry.idx_left)?;
        let rhs_idx = tuple_position(&input_desc, entry.idx_right)?;

        let mut desc = Desc::filter(&join_fragment(entry, op.as_ref()), &input_desc);
        desc.cost = input_desc.cost.as_ref().map(|input_cost| {
            let output = match op.estimation_type() {
                EstimationType::Selectivity(selectivity) => {
                    scaled_output(input_cost.output, selectivity, op.edge_anno_selectivity())
                }
                EstimationType::Min => input_cost.output.max(1),
            };
            CostEstimate {
                output,
                processed_in_step: input_cost.output,
                intermediate_sum: input_cost.intermediate_sum + input_cost.output,
            }
        });

        let exec = Box::new(Filter::new(op, input.exec, lhs_idx, rhs_idx, desc));
        Ok(PlanEntry { exec, base_search: None })
    }

    fn add_join(
        &self,
        op: Box<dyn BinaryOperator + 'a>,
        entry: &OperatorEntry,
        mut lhs: PlanEntry<'a>,
        mut rhs: PlanEntry<'a>,
        pool: Option<Arc<rayon::ThreadPool>>,
    ) -> QueryResult<PlanEntry<'a>> {
        let mut idx_left = entry.idx_left;
        let mut idx_right = entry.idx_right;

        let mut kind = if rhs.base_search.is_some() && !entry.force_nested_loop {
            JoinKind::Seed
        } else {
            JoinKind::NestedLoop
        };

        // a commutative operator can swap its operands to replace the
        // nested loop with a seed join
        if matches!(kind, JoinKind::NestedLoop)
            && self.config.avoid_nested_by_switch
            && !entry.force_nested_loop
            && op.is_commutative()
            && lhs.base_search.is_some()
        {
            std::mem::swap(&mut lhs, &mut rhs);
            std::mem::swap(&mut idx_left, &mut idx_right);
            kind = JoinKind::Seed;
        }

        let lhs_desc = lhs.exec.get_desc().cloned().ok_or_else(internal_error)?;
        let rhs_desc = rhs.exec.get_desc().cloned().ok_or_else(internal_error)?;
        let lhs_idx = tuple_position(&lhs_desc, idx_left)?;
        let rhs_idx = tuple_position(&rhs_desc, idx_right)?;

        let cost = join_cost(&kind, op.as_ref(), lhs_desc.cost.as_ref(), rhs_desc.cost.as_ref());
        let fragment = join_fragment(entry, op.as_ref());

        let exec: BoxedExecutionNode<'a> = match kind {
            JoinKind::Seed => {
                let search = rhs.base_search.clone().ok_or_else(internal_error)?;
                let mut desc = Desc::join("seed-join", &fragment, &lhs_desc, &rhs_desc);
                desc.cost = cost;

                if let Some(pool) = pool {
                    desc.impl_description = String::from("task-index-join");
                    let task_fn = self.seed_task_fn(op, search, lhs_idx);
                    Box::new(TaskIndexJoin::new(
                        lhs.exec,
                        task_fn,
                        pool,
                        self.config.max_buffered_tasks,
                        desc,
                    ))
                } else {
                    match self.config.non_parallel_join {
                        NonParallelJoin::Index => {
                            desc.impl_description = String::from("index-join");
                            let graph = self.graph;
                            let probe = Arc::clone(&search);
                            Box::new(IndexJoin::new(
                                op,
                                lhs.exec,
                                lhs_idx,
                                Box::new(move |node| probe.matches_for_node(graph, node)),
                                desc,
                            ))
                        }
                        NonParallelJoin::Seed => match &search.kind {
                            SearchKind::Value(valid) => {
                                desc.impl_description = String::from("materialized-seed-join");
                                Box::new(MaterializedSeedJoin::new(
                                    self.graph,
                                    op,
                                    lhs.exec,
                                    lhs_idx,
                                    valid.clone(),
                                    search.const_anno,
                                    desc,
                                ))
                            }
                            SearchKind::Key(valid) => {
                                desc.impl_description = String::from("anno-key-seed-join");
                                Box::new(AnnoKeySeedJoin::new(
                                    self.graph,
                                    op,
                                    lhs.exec,
                                    lhs_idx,
                                    valid.clone(),
                                    search.const_anno,
                                    desc,
                                ))
                            }
                        },
                    }
                }
            }
            JoinKind::NestedLoop => {
                let mut desc = Desc::join("nested-loop-join", &fragment, &lhs_desc, &rhs_desc);
                desc.cost = cost;

                // the smaller estimated side drives the outer loop
                let left_is_outer = match (lhs_desc.cost.as_ref(), rhs_desc.cost.as_ref()) {
                    (Some(l), Some(r)) => l.output <= r.output,
                    _ => true,
                };
                Box::new(NestedLoop::new(
                    op,
                    lhs.exec,
                    rhs.exec,
                    lhs_idx,
                    rhs_idx,
                    left_is_outer,
                    desc,
                ))
            }
        };

        Ok(PlanEntry { exec, base_search: None })
    }

    /// The per-left-tuple computation shipped to the worker pool.
    fn seed_task_fn(
        &self,
        op: Box<dyn BinaryOperator + 'a>,
        search: Arc<NodeSearchDesc>,
        lhs_idx: usize,
    ) -> Arc<crate::exec::parallel::TaskFn<'a>> {
        let graph = self.graph;
        let op: Arc<dyn BinaryOperator + 'a> = Arc::from(op);
        Arc::new(move |tuple: &MatchGroup| -> Vec<MatchGroup> {
            let Some(lhs_match) = tuple.get(lhs_idx).copied() else {
                return Vec::new();
            };
            let mut out = Vec::new();
            for candidate in op.retrieve_matches(&lhs_match) {
                for rhs in search.matches_for_node(graph, candidate.node) {
                    if reflexivity_allows(op.is_reflexive(), &lhs_match, &rhs) {
                        let mut result = tuple.clone();
                        result.push(rhs);
                        out.push(result);
                    }
                }
            }
            out
        })
    }
}

fn internal_error() -> QueryError {
    QueryError::InvalidQuery(String::from("inconsistent execution plan"))
}

fn tuple_position(desc: &Desc, node_nr: usize) -> QueryResult<usize> {
    desc.node_pos.get(&node_nr).copied().ok_or_else(internal_error)
}

fn join_fragment(entry: &OperatorEntry, op: &dyn BinaryOperator) -> String {
    format!("#{} {} #{}", entry.idx_left + 1, op, entry.idx_right + 1)
}

fn merge_components(node2component: &mut BTreeMap<usize, usize>, from: usize, to: usize) {
    if from == to {
        return;
    }
    for component in node2component.values_mut() {
        if *component == from {
            *component = to;
        }
    }
}

fn scaled_output(input: usize, selectivity: f64, edge_anno_selectivity: Option<f64>) -> usize {
    let scaled = input as f64 * selectivity * edge_anno_selectivity.unwrap_or(1.0);
    // very small selectivities must not fool the planner into zero cost
    (scaled.round() as usize).max(1)
}

fn join_cost(
    kind: &JoinKind,
    op: &dyn BinaryOperator,
    lhs: Option<&CostEstimate>,
    rhs: Option<&CostEstimate>,
) -> Option<CostEstimate> {
    let (lhs, rhs) = (lhs?, rhs?);
    let output = match op.estimation_type() {
        EstimationType::Selectivity(selectivity) => {
            let cross = lhs.output.saturating_mul(rhs.output);
            scaled_output(cross, selectivity, op.edge_anno_selectivity())
        }
        EstimationType::Min => lhs.output.min(rhs.output).max(1),
    };

    let processed_in_step = match kind {
        JoinKind::NestedLoop => {
            let outer = lhs.output.min(rhs.output);
            let inner = lhs.output.max(rhs.output);
            outer.saturating_add(outer.saturating_mul(inner))
        }
        JoinKind::Seed => {
            // reachable-per-lhs reconstructed from the operator
            // selectivity alone, without the edge-annotation part
            let probed = (op.selectivity() * rhs.output as f64 * lhs.output as f64) as usize;
            lhs.output.saturating_add(probed)
        }
    };

    Some(CostEstimate {
        output,
        processed_in_step,
        intermediate_sum: processed_in_step
            .saturating_add(lhs.intermediate_sum)
            .saturating_add(rhs.intermediate_sum),
    })
}
