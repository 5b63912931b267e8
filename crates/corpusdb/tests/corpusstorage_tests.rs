//! Integration tests for the corpus storage façade: snapshot lifecycle,
//! counting, finding, updates and the corpus cache.

use std::time::Duration;

use corpusdb::{
    AnnotationGraph, Component, ComponentType, CorpusDbError, CorpusStorage, GraphUpdate,
    NodeSearchSpec, OperatorKind, Query, QueryConfig,
};
use corpusdb_core::{Edge, ANNIS_NS, DOCUMENT, TOK};
use corpusdb_graph::WriteableGraphStorage;

const NS: &str = "default_ns";

/// Ten tokens over two documents: "The flowers are blue ." / "the tree is
/// green .".
fn sample_corpus() -> AnnotationGraph {
    let mut graph = AnnotationGraph::new();

    let words = ["The", "flowers", "are", "blue", ".", "the", "tree", "is", "green", "."];
    let pos = ["ART", "NN", "VBP", "JJ", "PUNC", "ART", "NN", "VBP", "JJ", "PUNC"];
    for (i, (word, pos)) in words.iter().zip(pos.iter()).enumerate() {
        let id = i as u32;
        let document = if i < 5 { "doc1" } else { "doc2" };
        graph.add_node(id, &format!("{document}#t{id}"));
        graph.add_node_annotation(id, ANNIS_NS, TOK, word);
        graph.add_node_annotation(id, ANNIS_NS, DOCUMENT, document);
        graph.add_node_annotation(id, NS, "pos", pos);
    }

    let ordering = Component::new(ComponentType::Ordering, ANNIS_NS, "");
    {
        let gs = graph.get_or_create_writable(&ordering).expect("writable");
        for i in 0..9u32 {
            gs.add_edge(Edge::new(i, i + 1));
        }
    }
    for ctype in [ComponentType::Coverage, ComponentType::LeftToken, ComponentType::RightToken] {
        let c = Component::new(ctype, ANNIS_NS, "");
        graph.get_or_create_writable(&c).expect("writable");
    }
    graph
}

fn art_nn_query() -> Query {
    let mut q = Query::new();
    let art = q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "ART"));
    let nn = q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));
    q.add_operator(OperatorKind::Precedence { min_dist: 1, max_dist: 1 }, art, nn);
    q
}

fn storage_with_sample(dir: &std::path::Path) -> CorpusStorage {
    let storage = CorpusStorage::new(dir).expect("storage");
    storage.create_corpus("sample", sample_corpus()).expect("create");
    storage
}

#[test]
fn count_matches_find_length() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage_with_sample(dir.path());

    let q = art_nn_query();
    let count = storage.count(&["sample"], &q, None).expect("count");
    let found = storage.find(&["sample"], &q, 0, usize::MAX, None).expect("find");
    assert_eq!(count as usize, found.len());
    assert_eq!(2, count);
}

#[test]
fn find_builds_salt_uris() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage_with_sample(dir.path());

    let found = storage.find(&["sample"], &art_nn_query(), 0, usize::MAX, None).expect("find");
    assert_eq!(
        vec![
            String::from("default_ns::pos::salt:/doc1#t0 default_ns::pos::salt:/doc1#t1"),
            String::from("default_ns::pos::salt:/doc2#t5 default_ns::pos::salt:/doc2#t6"),
        ],
        found
    );
}

#[test]
fn reserved_namespace_has_no_qualifier() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage_with_sample(dir.path());

    let mut q = Query::new();
    q.add_node(NodeSearchSpec::exact_value(Some(ANNIS_NS), TOK, "tree"));
    let found = storage.find(&["sample"], &q, 0, usize::MAX, None).expect("find");
    assert_eq!(vec![String::from("salt:/doc2#t6")], found);
}

#[test]
fn find_honors_offset_and_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage_with_sample(dir.path());

    let mut q = Query::new();
    q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "PUNC"));

    let all = storage.find(&["sample"], &q, 0, usize::MAX, None).expect("find");
    assert_eq!(2, all.len());
    let limited = storage.find(&["sample"], &q, 1, 1, None).expect("find");
    assert_eq!(vec![all[1].clone()], limited);
    let beyond = storage.find(&["sample"], &q, 5, 10, None).expect("find");
    assert!(beyond.is_empty());
}

#[test]
fn count_extra_counts_documents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage_with_sample(dir.path());

    let mut q = Query::new();
    q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));

    let extra = storage.count_extra(&["sample"], &q, None).expect("count_extra");
    assert_eq!(2, extra.match_count);
    // one NN per document
    assert_eq!(2, extra.document_count);

    let mut q = Query::new();
    q.add_node(NodeSearchSpec::exact_value(Some(ANNIS_NS), TOK, "flowers"));
    let extra = storage.count_extra(&["sample"], &q, None).expect("count_extra");
    assert_eq!(1, extra.match_count);
    assert_eq!(1, extra.document_count);
}

#[test]
fn count_sums_over_corpora() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = CorpusStorage::new(dir.path()).expect("storage");
    storage.create_corpus("a", sample_corpus()).expect("create");
    storage.create_corpus("b", sample_corpus()).expect("create");

    let q = art_nn_query();
    assert_eq!(4, storage.count(&["a", "b"], &q, None).expect("count"));

    let mut names = storage.list().expect("list");
    names.sort();
    assert_eq!(vec![String::from("a"), String::from("b")], names);
}

#[test]
fn missing_corpus_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = CorpusStorage::new(dir.path()).expect("storage");

    let mut q = Query::new();
    q.add_node(NodeSearchSpec::exact_key(Some(ANNIS_NS), TOK));
    let err = storage.count(&["nope"], &q, None).err().expect("must fail");
    assert!(matches!(err, CorpusDbError::CorpusNotFound(_)));
}

#[test]
fn duplicate_corpus_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage_with_sample(dir.path());
    let err = storage.create_corpus("sample", sample_corpus()).err().expect("must fail");
    assert!(matches!(err, CorpusDbError::CorpusExists(_)));
}

#[test]
fn delete_removes_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage_with_sample(dir.path());
    assert!(storage.delete("sample").expect("delete"));
    assert!(!storage.delete("sample").expect("second delete"));
    assert!(storage.list().expect("list").is_empty());
}

#[test]
fn apply_update_persists_across_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let storage = storage_with_sample(dir.path());

        let mut update = GraphUpdate::new();
        update.add_node("doc1#extra");
        update.add_node_label("doc1#extra", NS, "pos", "NN");
        storage.apply_update("sample", &update).expect("update");

        let mut q = Query::new();
        q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));
        assert_eq!(3, storage.count(&["sample"], &q, None).expect("count"));
    }

    // a fresh storage re-reads the snapshot from disk
    let storage = CorpusStorage::new(dir.path()).expect("storage");
    let mut q = Query::new();
    q.add_node(NodeSearchSpec::exact_value(Some(NS), "pos", "NN"));
    assert_eq!(3, storage.count(&["sample"], &q, None).expect("count"));

    let mut update = GraphUpdate::new();
    update.delete_node("doc1#extra");
    storage.apply_update("sample", &update).expect("update");
    assert_eq!(2, storage.count(&["sample"], &q, None).expect("count"));
}

#[test]
fn elapsed_timeout_fails_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage_with_sample(dir.path());

    let err = storage
        .count(&["sample"], &art_nn_query(), Some(Duration::ZERO))
        .err()
        .expect("must time out");
    assert!(matches!(err, CorpusDbError::Query(corpusdb_query::QueryError::Timeout)));
}

#[test]
fn timeout_with_partial_results_returns_prefix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut storage = storage_with_sample(dir.path());
    storage.set_query_config(QueryConfig {
        partial_results_on_timeout: true,
        ..QueryConfig::default()
    });

    let found = storage
        .find(&["sample"], &art_nn_query(), 0, usize::MAX, Some(Duration::ZERO))
        .expect("partial results");
    assert!(found.len() <= 2);
}

#[test]
fn corpora_stay_cached_between_queries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = storage_with_sample(dir.path());

    assert!(storage.loaded_corpora().is_empty());
    let q = art_nn_query();
    storage.count(&["sample"], &q, None).expect("count");
    assert_eq!(vec![String::from("sample")], storage.loaded_corpora());
}
