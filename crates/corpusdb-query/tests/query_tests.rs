//! Integration tests for planning and executing queries against a small
//! synthetic corpus.
//!
//! The corpus is a ten-token chain with spans, a dominance tree and a
//! pointing component:
//!
//! ```text
//! tokens:  t0:The/ART t1:flowers/NN t2:are/VBP t3:blue/JJ t4:./PUNC
//!          t5:the/ART t6:tree/NN    t7:is/VBP  t8:green/JJ t9:./PUNC
//! spans:   s20 norm=Blumen   covers t1..t3
//!          s21 norm=Baum     covers t3..t5
//!          s22 norm=Baum     covers t6
//!          s23 norm2=Blumen2 covers t1..t3
//! syntax:  n30 cat=S -> {n31 cat=NP, n32 cat=VP}; n31 -> {t0, t1};
//!          n32 -> {t2, t3}
//! dep:     t1 -> t0 [func=det], t2 -> t1 [func=sbj], t6 -> t5 [func=det]
//! ```

use std::collections::BTreeMap;

use corpusdb_core::{Component, ComponentType, Edge, Match, NodeId, ANNIS_NS, TOK};
use corpusdb_graph::{AnnotationGraph, WriteableGraphStorage};
use corpusdb_query::{
    CancellationToken, EdgeAnnoSpec, ExecutionPlan, MatchGroup, NodeSearchSpec, NonParallelJoin,
    OperatorEntry, OperatorKind, Query, QueryConfig, QueryError,
};

const NS: &str = "default_ns";

fn add_token(graph: &mut AnnotationGraph, id: NodeId, word: &str, pos: &str) {
    graph.add_node(id, &format!("doc1#t{id}"));
    graph.add_node_annotation(id, ANNIS_NS, TOK, word);
    graph.add_node_annotation(id, NS, "pos", pos);
}

fn add_span(graph: &mut AnnotationGraph, id: NodeId, covered: &[NodeId]) {
    graph.add_node(id, &format!("doc1#s{id}"));
    let coverage = Component::new(ComponentType::Coverage, ANNIS_NS, "");
    {
        let gs = graph.get_or_create_writable(&coverage).expect("writable");
        for t in covered {
            gs.add_edge(Edge::new(id, *t));
        }
    }
    let left = Component::new(ComponentType::LeftToken, ANNIS_NS, "");
    {
        let gs = graph.get_or_create_writable(&left).expect("writable");
        gs.add_edge(Edge::new(id, covered[0]));
    }
    let right = Component::new(ComponentType::RightToken, ANNIS_NS, "");
    {
        let gs = graph.get_or_create_writable(&right).expect("writable");
        gs.add_edge(Edge::new(id, covered[covered.len() - 1]));
    }
}

fn test_corpus(optimized: bool) -> AnnotationGraph {
    let mut graph = AnnotationGraph::new();

    let words = ["The", "flowers", "are", "blue", ".", "the", "tree", "is", "green", "."];
    let pos = ["ART", "NN", "VBP", "JJ", "PUNC", "ART", "NN", "VBP", "JJ", "PUNC"];
    for (i, (word, pos)) in words.iter().zip(pos.iter()).enumerate() {
        add_token(&mut graph, i as NodeId, word, pos);
    }

    let ordering = Component::new(ComponentType::Ordering, ANNIS_NS, "");
    {
        let gs = graph.get_or_create_writable(&ordering).expect("writable");
        for i in 0..9u32 {
            gs.add_edge(Edge::new(i, i + 1));
        }
    }
    // make sure the alignment components exist even before spans are added
    for ctype in [ComponentType::Coverage, ComponentType::LeftToken, ComponentType::RightToken] {
        let c = Component::new(ctype, ANNIS_NS, "");
        graph.get_or_create_writable(&c).expect("writable");
    }

    add_span(&mut graph, 20, &[1, 2, 3]);
    graph.add_node_annotation(20, NS, "norm", "Blumen");
    add_span(&mut graph, 21, &[3, 4, 5]);
    graph.add_node_annotation(21, NS, "norm", "Baum");
    add_span(&mut graph, 22, &[6]);
    graph.add_node_annotation(22, NS, "norm", "Baum");
    add_span(&mut graph, 23, &[1, 2, 3]);
    graph.add_node_annotation(23, NS, "norm2", "Blumen2");

    for (id, cat) in [(30u32, "S"), (31, "NP"), (32, "VP")] {
        graph.add_node(id, &format!("doc1#n{id}"));
        graph.add_node_annotation(id, NS, "cat", cat);
    }
    let dominance = Component::new(ComponentType::Dominance, NS, "");
    {
        let gs = graph.get_or_create_writable(&dominance).expect("writable");
        for (s, t) in [(30u32, 31u32), (30, 32), (31, 0), (31, 1), (32, 2), (32, 3)] {
            gs.add_edge(Edge::new(s, t));
        }
    }

    let dep = Component::new(ComponentType::Pointing, NS, "dep");
    for (s, t, func) in [(1u32, 0u32, "det"), (2, 1, "sbj"), (6, 5, "det")] {
        let ns_id = graph.strings_mut().add(NS);
        let name_id = graph.strings_mut().add("func");
        let val_id = graph.strings_mut().add(func);
        let gs = graph.get_or_create_writable(&dep).expect("writable");
        gs.add_edge(Edge::new(s, t));
        gs.add_edge_annotation(
            Edge::new(s, t),
            corpusdb_core::Annotation::new(ns_id, name_id, val_id),
        );
    }

    graph.calculate_all_statistics();
    if optimized {
        graph.optimize_impl(&BTreeMap::new(), false).expect("optimize");
    }
    graph
}

fn run(graph: &AnnotationGraph, query: &Query, config: &QueryConfig) -> Vec<MatchGroup> {
    let plan =
        ExecutionPlan::from_query(graph, query, config, CancellationToken::unbounded())
            .expect("plan");
    plan.map(|r| r.expect("no execution error")).collect()
}

fn count(graph: &AnnotationGraph, query: &Query) -> usize {
    run(graph, query, &QueryConfig::default()).len()
}

fn nodes_of(results: &[MatchGroup]) -> Vec<Vec<NodeId>> {
    results.iter().map(|t| t.iter().map(|m| m.node).collect()).collect()
}

fn precedence_query(min_dist: usize, max_dist: usize) -> Query {
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));
    let rhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "ART"));
    q.add_operator(OperatorKind::Precedence { min_dist, max_dist }, lhs, rhs);
    q
}

// ============================================================================
// Operator semantics
// ============================================================================

#[test]
fn precedence_direct_neighbours() {
    let graph = test_corpus(false);

    // ART . NN: "The flowers" and "the tree"
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "ART"));
    let rhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));
    q.add_operator(OperatorKind::Precedence { min_dist: 1, max_dist: 1 }, lhs, rhs);

    let results = run(&graph, &q, &QueryConfig::default());
    assert_eq!(vec![vec![0, 1], vec![5, 6]], nodes_of(&results));
}

#[test]
fn precedence_window() {
    let graph = test_corpus(false);
    // NN .2,10 ART: only "flowers ... the"
    let results = run(&graph, &precedence_query(2, 10), &QueryConfig::default());
    assert_eq!(vec![vec![1, 5]], nodes_of(&results));
    // no NN is directly followed by an ART
    assert_eq!(0, count(&graph, &precedence_query(1, 1)));
}

#[test]
fn precedence_same_results_on_optimized_storages() {
    let plain = test_corpus(false);
    let optimized = test_corpus(true);
    for (min_dist, max_dist) in [(1, 1), (2, 10), (1, usize::MAX)] {
        let q = precedence_query(min_dist, max_dist);
        assert_eq!(count(&plain, &q), count(&optimized, &q), "[{min_dist},{max_dist}]");
    }
}

#[test]
fn inclusion_finds_contained_spans() {
    let graph = test_corpus(false);

    // norm="Blumen" _i_ pos="NN": t1 lies inside s20
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "norm", "Blumen"));
    let rhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));
    q.add_operator(OperatorKind::Inclusion, lhs, rhs);

    let results = run(&graph, &q, &QueryConfig::default());
    assert_eq!(vec![vec![20, 1]], nodes_of(&results));
}

#[test]
fn overlap_shares_a_token() {
    let graph = test_corpus(false);

    // norm="Blumen" _o_ norm="Baum": s20 and s21 share t3
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "norm", "Blumen"));
    let rhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "norm", "Baum"));
    q.add_operator(OperatorKind::Overlap, lhs, rhs);

    let results = run(&graph, &q, &QueryConfig::default());
    assert_eq!(vec![vec![20, 21]], nodes_of(&results));
}

#[test]
fn overlap_is_commutative() {
    let graph = test_corpus(false);

    let mut forward = Query::new();
    let a = forward.add_node(NodeSearchSpec::exact_value(Some(NS), "norm", "Blumen"));
    let b = forward.add_node(NodeSearchSpec::exact_value(Some(NS), "norm", "Baum"));
    forward.add_operator(OperatorKind::Overlap, a, b);

    let mut backward = Query::new();
    let b = backward.add_node(NodeSearchSpec::exact_value(Some(NS), "norm", "Baum"));
    let a = backward.add_node(NodeSearchSpec::exact_value(Some(NS), "norm", "Blumen"));
    backward.add_operator(OperatorKind::Overlap, b, a);

    let forward_pairs: Vec<Vec<NodeId>> = nodes_of(&run(&graph, &forward, &QueryConfig::default()));
    let mut backward_pairs: Vec<Vec<NodeId>> =
        nodes_of(&run(&graph, &backward, &QueryConfig::default()))
            .into_iter()
            .map(|mut t| {
                t.reverse();
                t
            })
            .collect();
    backward_pairs.sort();
    let mut forward_pairs = forward_pairs;
    forward_pairs.sort();
    assert_eq!(forward_pairs, backward_pairs);
}

#[test]
fn identical_coverage_requires_equal_span() {
    let graph = test_corpus(false);

    // norm="Blumen" _=_ norm2 key search: s20 and s23 cover t1..t3
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "norm", "Blumen"));
    let rhs = q.add_node(NodeSearchSpec::exact_key(Some(NS), "norm2"));
    q.add_operator(OperatorKind::IdenticalCoverage, lhs, rhs);
    assert_eq!(1, count(&graph, &q));

    // a single-token span equals its token: tok="tree" _=_ norm="Baum"
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::exact_value(Some(ANNIS_NS), TOK, "tree"));
    let rhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "norm", "Baum"));
    q.add_operator(OperatorKind::IdenticalCoverage, lhs, rhs);
    let results = run(&graph, &q, &QueryConfig::default());
    assert_eq!(vec![vec![6, 22]], nodes_of(&results));
}

#[test]
fn dominance_transitive() {
    let graph = test_corpus(false);

    // cat="S" >* tok="flowers"
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "cat", "S"));
    let rhs = q.add_node(NodeSearchSpec::exact_value(Some(ANNIS_NS), TOK, "flowers"));
    q.add_operator(
        OperatorKind::Dominance {
            layer: None,
            name: None,
            min_dist: 1,
            max_dist: usize::MAX,
            edge_anno: None,
        },
        lhs,
        rhs,
    );
    let results = run(&graph, &q, &QueryConfig::default());
    assert_eq!(vec![vec![30, 1]], nodes_of(&results));

    // cat="S" >1,1 cat="NP" is a direct edge
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "cat", "S"));
    let rhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "cat", "NP"));
    q.add_operator(
        OperatorKind::Dominance { layer: None, name: None, min_dist: 1, max_dist: 1, edge_anno: None },
        lhs,
        rhs,
    );
    assert_eq!(1, count(&graph, &q));
}

#[test]
fn pointing_with_edge_annotation() {
    let graph = test_corpus(false);

    // tok ->dep[func="det"] tok: two determiner edges
    let mut q = Query::new();
    let lhs = q.add_node_with_wrap(NodeSearchSpec::exact_key(Some(ANNIS_NS), TOK), true);
    let rhs = q.add_node_with_wrap(NodeSearchSpec::exact_key(Some(ANNIS_NS), TOK), true);
    q.add_operator(
        OperatorKind::Pointing {
            layer: None,
            name: Some(String::from("dep")),
            min_dist: 1,
            max_dist: 1,
            edge_anno: Some(EdgeAnnoSpec {
                ns: None,
                name: String::from("func"),
                val: Some(String::from("det")),
            }),
        },
        lhs,
        rhs,
    );

    let mut pairs = nodes_of(&run(&graph, &q, &QueryConfig::default()));
    pairs.sort();
    assert_eq!(vec![vec![1, 0], vec![6, 5]], pairs);
}

#[test]
fn identical_node_requires_both_predicates() {
    let graph = test_corpus(false);

    // pos="NN" _ident_ tok="flowers": only t1 carries both
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));
    let rhs = q.add_node(NodeSearchSpec::exact_value(Some(ANNIS_NS), TOK, "flowers"));
    q.add_operator(OperatorKind::IdenticalNode, lhs, rhs);

    let results = run(&graph, &q, &QueryConfig::default());
    assert_eq!(vec![vec![1, 1]], nodes_of(&results));

    // combined with a different value nothing matches
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));
    let rhs = q.add_node(NodeSearchSpec::exact_value(Some(ANNIS_NS), TOK, "tree"));
    q.add_operator(OperatorKind::IdenticalNode, lhs, rhs);
    assert_eq!(vec![vec![6, 6]], nodes_of(&run(&graph, &q, &QueryConfig::default())));
}

#[test]
fn regex_search_matches_values() {
    let graph = test_corpus(false);

    // pos=/N.*/ . pos=/(ART|PUNC)/
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::regex_value(Some(NS), "pos", "N.*"));
    let rhs = q.add_node(NodeSearchSpec::regex_value(Some(NS), "pos", "(ART|PUNC)"));
    q.add_operator(OperatorKind::Precedence { min_dist: 3, max_dist: 4 }, lhs, rhs);

    // t1 NN -> t4/t5, t6 NN -> t9
    assert_eq!(3, count(&graph, &q));
}

// ============================================================================
// Join kinds agree
// ============================================================================

fn all_join_configs() -> Vec<(&'static str, QueryConfig)> {
    vec![
        ("index", QueryConfig::default()),
        (
            "seed",
            QueryConfig { non_parallel_join: NonParallelJoin::Seed, ..QueryConfig::default() },
        ),
        (
            "parallel",
            QueryConfig {
                use_parallel_joins: true,
                num_parallel_workers: 2,
                ..QueryConfig::default()
            },
        ),
    ]
}

#[test]
fn every_join_kind_produces_the_same_tuples() {
    for optimized in [false, true] {
        let graph = test_corpus(optimized);

        let mut queries: Vec<Query> = vec![precedence_query(2, 10), precedence_query(1, usize::MAX)];
        {
            let mut q = Query::new();
            let lhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "cat", "S"));
            let rhs = q.add_node(NodeSearchSpec::exact_key(Some(ANNIS_NS), TOK));
            q.add_operator(
                OperatorKind::Dominance {
                    layer: None,
                    name: None,
                    min_dist: 1,
                    max_dist: usize::MAX,
                    edge_anno: None,
                },
                lhs,
                rhs,
            );
            queries.push(q);
        }

        for query in &queries {
            let reference = nodes_of(&run(&graph, query, &QueryConfig::default()));
            for (label, config) in all_join_configs() {
                let mut got = nodes_of(&run(&graph, query, &config));
                let mut expected = reference.clone();
                got.sort();
                expected.sort();
                assert_eq!(expected, got, "join kind '{label}', optimized={optimized}");
            }
        }
    }
}

#[test]
fn task_index_join_preserves_order() {
    let graph = test_corpus(false);
    let query = precedence_query(1, usize::MAX);

    let sequential = nodes_of(&run(&graph, &query, &QueryConfig::default()));
    let parallel_config = QueryConfig {
        use_parallel_joins: true,
        num_parallel_workers: 4,
        max_buffered_tasks: 2,
        ..QueryConfig::default()
    };
    let parallel = nodes_of(&run(&graph, &query, &parallel_config));
    assert_eq!(sequential, parallel);
}

#[test]
fn forced_nested_loop_agrees_with_seed() {
    let graph = test_corpus(false);

    let mut forced = Query::new();
    let lhs = forced.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));
    let rhs = forced.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "ART"));
    forced.add_operator_entry(OperatorEntry {
        kind: OperatorKind::Precedence { min_dist: 2, max_dist: 10 },
        idx_left: lhs,
        idx_right: rhs,
        force_nested_loop: true,
    });

    let mut seeded = nodes_of(&run(&graph, &precedence_query(2, 10), &QueryConfig::default()));
    let mut nested = nodes_of(&run(&graph, &forced, &QueryConfig::default()));
    seeded.sort();
    nested.sort();
    assert_eq!(seeded, nested);
}

#[test]
fn emitted_tuples_satisfy_the_operator_filter() {
    let graph = test_corpus(false);

    // run the same operator entry once as a join and once as a filter on
    // top of it; the filter must not drop anything
    let mut joined = precedence_query(2, 10);
    joined.add_operator(OperatorKind::Precedence { min_dist: 2, max_dist: 10 }, 0, 1);

    assert_eq!(
        count(&graph, &precedence_query(2, 10)),
        count(&graph, &joined),
        "re-filtering with the same operator must be a no-op"
    );
}

// ============================================================================
// Planner behavior
// ============================================================================

#[test]
fn same_component_entries_become_filters() {
    let graph = test_corpus(false);

    let mut q = precedence_query(2, 10);
    q.add_operator(OperatorKind::Precedence { min_dist: 1, max_dist: usize::MAX }, 0, 1);

    let plan = ExecutionPlan::from_query(
        &graph,
        &q,
        &QueryConfig::default(),
        CancellationToken::unbounded(),
    )
    .expect("plan");
    let desc = plan.root_desc().expect("desc");
    assert_eq!("filter", desc.impl_description);
}

#[test]
fn plan_cost_is_reported() {
    let graph = test_corpus(false);
    let plan = ExecutionPlan::from_query(
        &graph,
        &precedence_query(2, 10),
        &QueryConfig::default(),
        CancellationToken::unbounded(),
    )
    .expect("plan");
    assert!(plan.cost().is_some());
    let desc = plan.root_desc().expect("desc");
    assert_eq!("index-join", desc.impl_description);
}

#[test]
fn disconnected_query_is_rejected() {
    let graph = test_corpus(false);

    let mut q = Query::new();
    q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));
    q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "ART"));
    q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "JJ"));
    q.add_operator(OperatorKind::Precedence { min_dist: 1, max_dist: 10 }, 0, 1);

    let err = ExecutionPlan::from_query(
        &graph,
        &q,
        &QueryConfig::default(),
        CancellationToken::unbounded(),
    )
    .err()
    .expect("planning must fail");
    assert!(matches!(err, QueryError::DisconnectedQuery(_)));
}

#[test]
fn out_of_range_operand_is_rejected() {
    let graph = test_corpus(false);

    let mut q = Query::new();
    q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));
    q.add_operator(OperatorKind::Overlap, 0, 7);

    let err = ExecutionPlan::from_query(
        &graph,
        &q,
        &QueryConfig::default(),
        CancellationToken::unbounded(),
    )
    .err()
    .expect("planning must fail");
    assert!(matches!(err, QueryError::InvalidQuery(_)));
}

#[test]
fn unknown_annotation_values_yield_empty_results() {
    let graph = test_corpus(false);
    let mut q = Query::new();
    let lhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NOPE"));
    let rhs = q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "ART"));
    q.add_operator(OperatorKind::Precedence { min_dist: 1, max_dist: 10 }, lhs, rhs);
    assert_eq!(0, count(&graph, &q));
}

#[test]
fn aborted_token_stops_execution() {
    let graph = test_corpus(false);
    let token = CancellationToken::unbounded();
    token.abort();

    let mut plan = ExecutionPlan::from_query(
        &graph,
        &precedence_query(1, usize::MAX),
        &QueryConfig::default(),
        token,
    )
    .expect("plan");
    assert_eq!(Some(Err(QueryError::Aborted)), plan.next());
    assert_eq!(None, plan.next());
}

#[test]
fn wrapped_search_deduplicates_nodes() {
    let graph = test_corpus(false);

    // tokens carry several annotations; wrapped as bare nodes each token
    // appears exactly once
    let mut q = Query::new();
    q.add_node_with_wrap(NodeSearchSpec::exact_key(Some(ANNIS_NS), TOK), true);
    let results = run(&graph, &q, &QueryConfig::default());
    assert_eq!(10, results.len());
    let node_name_key = graph.node_name_key();
    for tuple in &results {
        let m: &Match = &tuple[0];
        assert_eq!(node_name_key, m.anno.key);
    }
}
