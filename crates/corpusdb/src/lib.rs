//! `CorpusDB`
//!
//! An in-memory query engine for linguistic annotation graphs. A corpus
//! is a directed multi-relational graph: nodes carry key/value
//! annotations, edges are partitioned into typed components (token
//! ordering, coverage, dominance trees, pointing relations). Queries
//! combine annotation predicates with structural operators such as
//! precedence, dominance, inclusion or overlap.
//!
//! # Example
//!
//! ```no_run
//! use corpusdb::{CorpusStorage, NodeSearchSpec, OperatorKind, Query};
//!
//! let storage = CorpusStorage::new("data")?;
//!
//! // pos="NN" .2,10 pos="ART"
//! let mut query = Query::new();
//! let nn = query.add_node(NodeSearchSpec::exact_value(None, "pos", "NN"));
//! let art = query.add_node(NodeSearchSpec::exact_value(None, "pos", "ART"));
//! query.add_operator(OperatorKind::Precedence { min_dist: 2, max_dist: 10 }, nn, art);
//!
//! let matches = storage.count(&["ridges"], &query, None)?;
//! println!("{matches} matches");
//! # Ok::<(), corpusdb::CorpusDbError>(())
//! ```
//!
//! # Crates
//!
//! - [`corpusdb_core`] - types, string pool, annotation storage
//! - [`corpusdb_graph`] - graph storages, registry, corpus image
//! - [`corpusdb_query`] - searches, operators, planner, executors
//! - this crate - the [`CorpusStorage`] façade and the corpus cache

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod cache;
pub mod error;
pub mod storage;

pub use cache::CorpusCache;
pub use error::{CorpusDbError, Result};
pub use storage::{CorpusStorage, CountExtra, DEFAULT_CACHE_CAPACITY};

pub use corpusdb_core::{
    AnnoKey, Annotation, Component, ComponentType, Edge, Match, NodeId, StringId, ANNIS_NS,
    DOCUMENT, NODE_NAME, NODE_TYPE, TOK,
};
pub use corpusdb_graph::{AnnotationGraph, GraphUpdate, UpdateEvent, WriteableGraphStorage};
pub use corpusdb_query::{
    CancellationToken, EdgeAnnoSpec, ExecutionPlan, NodeSearchSpec, NonParallelJoin, OperatorEntry,
    OperatorKind, Query, QueryConfig, QueryError,
};
