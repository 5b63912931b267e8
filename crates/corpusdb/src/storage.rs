//! The corpus storage: the public query API.
//!
//! A [`CorpusStorage`] manages a directory of corpus snapshots, keeps
//! loaded images in the process-wide cache and answers `count`,
//! `count_extra` and `find` requests over one or more corpora. Graph
//! updates are applied under the corpus-level writer lock and written
//! back to the snapshot.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use corpusdb_core::{Match, StringId, ANNIS_NS};
use corpusdb_graph::{AnnotationGraph, GraphUpdate};
use corpusdb_query::{
    CancellationToken, ExecutionPlan, MatchGroup, Query, QueryConfig, QueryError,
};

use crate::cache::{CorpusCache, CorpusHandle};
use crate::error::{CorpusDbError, Result};

/// Default byte budget of the corpus cache (1 GiB).
pub const DEFAULT_CACHE_CAPACITY: usize = 1024 * 1024 * 1024;

/// Result of [`CorpusStorage::count_extra`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountExtra {
    /// Total number of matched tuples.
    pub match_count: u64,
    /// Number of distinct documents containing the first match of a
    /// tuple.
    pub document_count: u64,
}

/// Manages corpora below one storage directory and executes queries
/// against them.
pub struct CorpusStorage {
    db_dir: PathBuf,
    cache: CorpusCache,
    query_config: QueryConfig,
}

impl CorpusStorage {
    /// Opens (and creates if necessary) a storage directory with the
    /// default cache budget.
    pub fn new(db_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_cache_capacity(db_dir, DEFAULT_CACHE_CAPACITY)
    }

    /// Opens a storage directory with an explicit cache byte budget.
    pub fn with_cache_capacity(db_dir: impl Into<PathBuf>, max_bytes: usize) -> Result<Self> {
        let db_dir = db_dir.into();
        std::fs::create_dir_all(&db_dir)?;
        Ok(Self { db_dir, cache: CorpusCache::new(max_bytes), query_config: QueryConfig::default() })
    }

    /// The query configuration used for all queries.
    #[must_use]
    pub fn query_config(&self) -> &QueryConfig {
        &self.query_config
    }

    /// Replaces the query configuration.
    pub fn set_query_config(&mut self, config: QueryConfig) {
        self.query_config = config;
    }

    /// The names of all corpora in the storage directory.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut result = Vec::new();
        for entry in std::fs::read_dir(&self.db_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                if let Ok(name) = entry.file_name().into_string() {
                    result.push(name);
                }
            }
        }
        result.sort();
        Ok(result)
    }

    /// The names of the corpora currently loaded in the cache.
    #[must_use]
    pub fn loaded_corpora(&self) -> Vec<String> {
        self.cache.cached()
    }

    /// Saves a new corpus image under the given name.
    ///
    /// Statistics are computed and the storage representations optimized
    /// before the snapshot is written.
    pub fn create_corpus(&self, name: &str, mut graph: AnnotationGraph) -> Result<()> {
        let path = self.corpus_path(name);
        if path.exists() {
            return Err(CorpusDbError::CorpusExists(name.to_string()));
        }
        graph.calculate_all_statistics();
        graph.optimize_impl(&BTreeMap::new(), false)?;
        graph.save_to(&path)?;
        info!(corpus = name, "created corpus");
        Ok(())
    }

    /// Deletes a corpus snapshot and drops it from the cache.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.corpus_path(name);
        if !path.exists() {
            return Ok(false);
        }
        self.cache.remove(name);
        std::fs::remove_dir_all(path)?;
        info!(corpus = name, "deleted corpus");
        Ok(true)
    }

    /// Counts the matches of `query` over all given corpora.
    pub fn count<S: AsRef<str>>(
        &self,
        corpora: &[S],
        query: &Query,
        timeout: Option<Duration>,
    ) -> Result<u64> {
        let token = cancellation_token(timeout);
        let mut total = 0u64;
        for corpus in corpora {
            let handle = self.get_loaded(corpus.as_ref())?;
            let graph = handle.read();
            let plan = ExecutionPlan::from_query(&graph, query, &self.query_config, token.clone())?;
            for tuple in plan {
                tuple?;
                total += 1;
            }
        }
        Ok(total)
    }

    /// Counts matches and the distinct documents of the first match node.
    pub fn count_extra<S: AsRef<str>>(
        &self,
        corpora: &[S],
        query: &Query,
        timeout: Option<Duration>,
    ) -> Result<CountExtra> {
        let token = cancellation_token(timeout);
        let mut result = CountExtra::default();
        for corpus in corpora {
            let handle = self.get_loaded(corpus.as_ref())?;
            let graph = handle.read();
            let document_key = graph.document_key();
            let mut known_documents: HashSet<StringId> = HashSet::new();

            let plan = ExecutionPlan::from_query(&graph, query, &self.query_config, token.clone())?;
            for tuple in plan {
                let tuple = tuple?;
                result.match_count += 1;
                if let Some(first) = tuple.first() {
                    if let Some(document) = graph.node_annos().get(&first.node, &document_key) {
                        known_documents.insert(document);
                    }
                }
            }
            result.document_count += known_documents.len() as u64;
        }
        Ok(result)
    }

    /// Finds matches and renders them as Salt-like URI lists.
    ///
    /// `offset` and `limit` select a window over the concatenated match
    /// stream of all corpora.
    pub fn find<S: AsRef<str>>(
        &self,
        corpora: &[S],
        query: &Query,
        offset: usize,
        limit: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>> {
        let token = cancellation_token(timeout);
        let mut results: Vec<String> = Vec::new();
        let mut skipped = 0usize;

        'corpora: for corpus in corpora {
            let handle = self.get_loaded(corpus.as_ref())?;
            let graph = handle.read();
            let plan = ExecutionPlan::from_query(&graph, query, &self.query_config, token.clone())?;
            for tuple in plan {
                let tuple = match tuple {
                    Ok(tuple) => tuple,
                    Err(QueryError::Timeout) if self.query_config.partial_results_on_timeout => {
                        break 'corpora;
                    }
                    Err(e) => return Err(e.into()),
                };
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                if results.len() >= limit {
                    break 'corpora;
                }
                results.push(match_group_to_string(&graph, &tuple));
            }
        }
        Ok(results)
    }

    /// Applies a graph update to a corpus under the exclusive writer lock
    /// and persists the result.
    pub fn apply_update(&self, corpus: &str, update: &GraphUpdate) -> Result<()> {
        let handle = self.get_loaded(corpus)?;
        {
            let mut graph = handle.write();
            graph.apply_update(update)?;
            graph.calculate_all_statistics();
            graph.optimize_impl(&BTreeMap::new(), false)?;
            graph.save_to(&self.corpus_path(corpus))?;
        }
        self.cache.update_size(corpus);
        info!(corpus, events = update.len(), "applied graph update");
        Ok(())
    }

    fn corpus_path(&self, name: &str) -> PathBuf {
        self.db_dir.join(name)
    }

    fn get_loaded(&self, name: &str) -> Result<CorpusHandle> {
        let path = self.corpus_path(name);
        self.cache.get_or_load(name, || {
            if !path.is_dir() {
                return Err(CorpusDbError::CorpusNotFound(name.to_string()));
            }
            Ok(AnnotationGraph::load_from(&path)?)
        })
    }
}

fn cancellation_token(timeout: Option<Duration>) -> CancellationToken {
    match timeout {
        Some(timeout) => CancellationToken::with_timeout(timeout),
        None => CancellationToken::unbounded(),
    }
}

/// Renders one match tuple the way the query front-ends expect it: one
/// Salt-like URI per node, prefixed with the qualified annotation name
/// unless it is in the reserved namespace.
fn match_group_to_string(graph: &AnnotationGraph, tuple: &MatchGroup) -> String {
    let node_name_key = graph.node_name_key();
    let parts: Vec<String> = tuple
        .iter()
        .map(|m| single_match_to_string(graph, m, &node_name_key))
        .collect();
    parts.join(" ")
}

fn single_match_to_string(
    graph: &AnnotationGraph,
    m: &Match,
    node_name_key: &corpusdb_core::AnnoKey,
) -> String {
    let mut out = String::new();
    let strings = graph.strings();

    let ns = strings.resolve(m.anno.key.ns).unwrap_or_default();
    let name = strings.resolve(m.anno.key.name).unwrap_or_default();
    if ns != ANNIS_NS && !name.is_empty() {
        if !ns.is_empty() {
            out.push_str(ns);
            out.push_str("::");
        }
        out.push_str(name);
        out.push_str("::");
    }

    if let Some(node_name) = graph.node_annos().get(&m.node, node_name_key) {
        if let Some(node_name) = strings.resolve(node_name) {
            out.push_str("salt:/");
            out.push_str(node_name);
        }
    }
    out
}
