//! The process-wide corpus cache.
//!
//! Maps corpus names to loaded corpus images with a configurable byte
//! budget. Eviction is LRU by last access; sizes are byte-level estimates
//! of the in-memory containers. An image still referenced by a running
//! query is pinned and never evicted.

use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use corpusdb_graph::AnnotationGraph;

use crate::error::Result;

/// A loaded corpus image behind the corpus-level reader/writer lock.
pub type CorpusHandle = Arc<RwLock<AnnotationGraph>>;

struct CacheEntry {
    graph: CorpusHandle,
    size_bytes: usize,
}

/// LRU cache of loaded corpus images.
pub struct CorpusCache {
    max_bytes: usize,
    inner: Mutex<LruCache<String, CacheEntry>>,
}

impl CorpusCache {
    /// Creates a cache with the given byte budget.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes, inner: Mutex::new(LruCache::unbounded()) }
    }

    /// Returns the cached image or loads it through `loader`.
    ///
    /// Loading happens outside the cache lock so concurrent queries on
    /// other corpora are not blocked.
    pub fn get_or_load<F>(&self, name: &str, loader: F) -> Result<CorpusHandle>
    where
        F: FnOnce() -> Result<AnnotationGraph>,
    {
        if let Some(entry) = self.inner.lock().get(name) {
            return Ok(Arc::clone(&entry.graph));
        }

        let graph = loader()?;
        let size_bytes = graph.estimated_memory_size();
        let handle: CorpusHandle = Arc::new(RwLock::new(graph));

        let mut inner = self.inner.lock();
        // a concurrent load may have won the race
        if let Some(entry) = inner.get(name) {
            return Ok(Arc::clone(&entry.graph));
        }
        inner.put(name.to_string(), CacheEntry { graph: Arc::clone(&handle), size_bytes });
        debug!(corpus = name, size_bytes, "loaded corpus into cache");
        Self::evict(&mut inner, self.max_bytes);
        Ok(handle)
    }

    /// Re-estimates the size of a cached image after a mutation.
    pub fn update_size(&self, name: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.get_mut(name) {
            entry.size_bytes = entry.graph.read().estimated_memory_size();
        }
        Self::evict(&mut inner, self.max_bytes);
    }

    /// Drops a corpus from the cache.
    pub fn remove(&self, name: &str) {
        self.inner.lock().pop(name);
    }

    /// Names of the currently cached corpora, most recently used first.
    #[must_use]
    pub fn cached(&self) -> Vec<String> {
        self.inner.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    fn total_bytes(inner: &LruCache<String, CacheEntry>) -> usize {
        inner.iter().map(|(_, e)| e.size_bytes).sum()
    }

    fn evict(inner: &mut LruCache<String, CacheEntry>, max_bytes: usize) {
        // pinned entries are pushed back and count against the budget
        let mut pinned: Vec<(String, CacheEntry)> = Vec::new();
        while Self::total_bytes(inner) > max_bytes {
            let Some((name, entry)) = inner.pop_lru() else {
                break;
            };
            if Arc::strong_count(&entry.graph) > 1 {
                pinned.push((name, entry));
            } else {
                debug!(corpus = name.as_str(), size_bytes = entry.size_bytes, "evicted corpus");
            }
            if inner.is_empty() {
                break;
            }
        }
        for (name, entry) in pinned {
            inner.put(name, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus_with_nodes(n: u32) -> AnnotationGraph {
        let mut graph = AnnotationGraph::new();
        for i in 0..n {
            graph.add_node(i, &format!("corpus#{i}"));
        }
        graph
    }

    #[test]
    fn caches_and_reuses() {
        let cache = CorpusCache::new(usize::MAX);
        let first = cache.get_or_load("a", || Ok(corpus_with_nodes(5))).expect("load");
        let second = cache.get_or_load("a", || panic!("must not reload")).expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(vec![String::from("a")], cache.cached());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = CorpusCache::new(1);
        {
            let _a = cache.get_or_load("a", || Ok(corpus_with_nodes(50))).expect("load");
            // while referenced the entry is pinned
            assert_eq!(vec![String::from("a")], cache.cached());
        }
        let _b = cache.get_or_load("b", || Ok(corpus_with_nodes(50))).expect("load");
        let cached = cache.cached();
        assert!(cached.contains(&String::from("b")));
        assert!(!cached.contains(&String::from("a")), "unpinned LRU entry is evicted");
    }

    #[test]
    fn pinned_entries_survive_eviction() {
        let cache = CorpusCache::new(1);
        let a = cache.get_or_load("a", || Ok(corpus_with_nodes(50))).expect("load");
        let _b = cache.get_or_load("b", || Ok(corpus_with_nodes(50))).expect("load");
        assert!(cache.cached().contains(&String::from("a")));
        drop(a);
    }

    #[test]
    fn remove_drops_entry() {
        let cache = CorpusCache::new(usize::MAX);
        cache.get_or_load("a", || Ok(corpus_with_nodes(5))).expect("load");
        cache.remove("a");
        assert!(cache.cached().is_empty());
    }
}
