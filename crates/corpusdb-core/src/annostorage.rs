//! Annotation storage.
//!
//! One logical structure made of three coupled indexes:
//!
//! 1. **forward**: container → sorted annotations, for spot lookups on a
//!    known key,
//! 2. **inverse**: annotation → containers, ordered so value searches can
//!    range-scan a fixed key,
//! 3. **key index**: distinct keys with occurrence counts, for key
//!    iteration and selectivity estimation.
//!
//! Every forward entry has exactly one inverse entry; key counts equal the
//! size of the corresponding inverse fiber; deleting the last value for a
//! key removes the key from the key index.
//!
//! The storage is generic over the container type so nodes and edges share
//! the implementation. Derived statistics (equi-count value histograms) are
//! rebuilt on demand and feed [`AnnoStorage::guess_max_count`].

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::ops::Bound::Included;

use serde::{Deserialize, Serialize};

use crate::strings::{self, StringPool};
use crate::types::{AnnoKey, Annotation, Edge, Match, NodeId, StringId};

const MAX_HISTOGRAM_BUCKETS: usize = 250;
const MAX_SAMPLED_ANNOTATIONS: usize = 2500;

/// Annotation storage for containers of type `T` (nodes or edges).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnoStorage<T: Ord + Clone> {
    by_container: BTreeMap<T, Vec<Annotation>>,
    by_anno: BTreeMap<Annotation, BTreeSet<T>>,
    anno_keys: BTreeMap<AnnoKey, usize>,
    histogram_bounds: BTreeMap<AnnoKey, Vec<String>>,
    largest_item: Option<T>,
    total_annos: usize,
}

impl<T: Ord + Clone> Default for AnnoStorage<T> {
    fn default() -> Self {
        Self {
            by_container: BTreeMap::new(),
            by_anno: BTreeMap::new(),
            anno_keys: BTreeMap::new(),
            histogram_bounds: BTreeMap::new(),
            largest_item: None,
            total_annos: 0,
        }
    }
}

impl<T: Ord + Clone> AnnoStorage<T> {
    /// Creates an empty annotation storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an annotation for a container.
    ///
    /// A second value for the same key replaces the first; the key count is
    /// unchanged in that case.
    pub fn insert(&mut self, item: T, anno: Annotation) {
        let annos = self.by_container.entry(item.clone()).or_default();
        let replaced = match annos.binary_search_by_key(&anno.key, |a| a.key) {
            Ok(idx) => {
                let old = annos[idx];
                annos[idx] = anno;
                Some(old)
            }
            Err(idx) => {
                annos.insert(idx, anno);
                None
            }
        };

        if let Some(old) = replaced {
            Self::unlink_inverse(&mut self.by_anno, &old, &item);
        }

        self.by_anno.entry(anno).or_default().insert(item.clone());

        if replaced.is_none() {
            self.total_annos += 1;
            *self.anno_keys.entry(anno.key).or_insert(0) += 1;
            if self.largest_item.as_ref().map_or(true, |l| *l < item) {
                self.largest_item = Some(item);
            }
        }
    }

    /// Inserts many annotations at once.
    ///
    /// Preferred during corpus load: the entries are sorted once and all
    /// three indexes are updated in a single pass.
    pub fn add_bulk(&mut self, mut entries: Vec<(T, Annotation)>) {
        entries.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        for (item, anno) in entries {
            self.insert(item, anno);
        }
    }

    /// Removes the annotation with the given key from a container,
    /// returning the removed value.
    ///
    /// Removing the last instance of a key drops the key from the key
    /// index.
    pub fn remove(&mut self, item: &T, key: &AnnoKey) -> Option<StringId> {
        let annos = self.by_container.get_mut(item)?;
        let idx = annos.binary_search_by_key(key, |a| a.key).ok()?;
        let removed = annos.remove(idx);
        if annos.is_empty() {
            self.by_container.remove(item);
        }

        Self::unlink_inverse(&mut self.by_anno, &removed, item);

        if let Some(count) = self.anno_keys.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.anno_keys.remove(key);
            }
        }
        self.total_annos -= 1;

        Some(removed.val)
    }

    fn unlink_inverse(
        by_anno: &mut BTreeMap<Annotation, BTreeSet<T>>,
        anno: &Annotation,
        item: &T,
    ) {
        let empty = if let Some(items) = by_anno.get_mut(anno) {
            items.remove(item);
            items.is_empty()
        } else {
            false
        };
        if empty {
            by_anno.remove(anno);
        }
    }

    /// The value stored for `(item, key)`, if any.
    #[must_use]
    pub fn get(&self, item: &T, key: &AnnoKey) -> Option<StringId> {
        let annos = self.by_container.get(item)?;
        let idx = annos.binary_search_by_key(key, |a| a.key).ok()?;
        Some(annos[idx].val)
    }

    /// All annotations of a container, sorted by key.
    #[must_use]
    pub fn get_all(&self, item: &T) -> &[Annotation] {
        self.by_container.get(item).map_or(&[], Vec::as_slice)
    }

    /// Annotations of a container restricted by an optional namespace and
    /// name.
    #[must_use]
    pub fn find_by_name(
        &self,
        item: &T,
        ns: Option<StringId>,
        name: Option<StringId>,
    ) -> Vec<Annotation> {
        match (ns, name) {
            (Some(ns), Some(name)) => {
                let key = AnnoKey { name, ns };
                self.get(item, &key)
                    .map(|val| vec![Annotation { key, val }])
                    .unwrap_or_default()
            }
            (None, Some(name)) => self
                .get_qnames(name)
                .into_iter()
                .filter_map(|key| self.get(item, &key).map(|val| Annotation { key, val }))
                .collect(),
            _ => self.get_all(item).to_vec(),
        }
    }

    /// All fully qualified keys sharing an unqualified name.
    #[must_use]
    pub fn get_qnames(&self, name: StringId) -> Vec<AnnoKey> {
        self.anno_keys
            .range(AnnoKey { name, ns: StringId::MIN }..=AnnoKey { name, ns: StringId::MAX })
            .map(|(key, _)| *key)
            .collect()
    }

    /// All distinct annotation keys.
    #[must_use]
    pub fn get_all_keys(&self) -> Vec<AnnoKey> {
        self.anno_keys.keys().copied().collect()
    }

    /// Number of annotations with the given name (and namespace, if given).
    #[must_use]
    pub fn num_of_annotations(&self, ns: Option<StringId>, name: StringId) -> usize {
        self.qualified_keys(ns, name).map(|(_, count)| count).sum()
    }

    fn qualified_keys(
        &self,
        ns: Option<StringId>,
        name: StringId,
    ) -> impl Iterator<Item = (AnnoKey, usize)> + '_ {
        let (lower, upper) = match ns {
            Some(ns) => (AnnoKey { name, ns }, AnnoKey { name, ns }),
            None => (
                AnnoKey { name, ns: StringId::MIN },
                AnnoKey { name, ns: StringId::MAX },
            ),
        };
        self.anno_keys
            .range((Included(lower), Included(upper)))
            .map(|(key, count)| (*key, *count))
    }

    /// Total number of stored annotations.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.total_annos
    }

    /// True if no annotations are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_annos == 0
    }

    /// The largest container that carries any annotation.
    #[must_use]
    pub fn largest_item(&self) -> Option<&T> {
        self.largest_item.as_ref()
    }

    /// Removes all annotations and statistics.
    pub fn clear(&mut self) {
        self.by_container.clear();
        self.by_anno.clear();
        self.anno_keys.clear();
        self.histogram_bounds.clear();
        self.largest_item = None;
        self.total_annos = 0;
    }

    /// Containers annotated with `key` and a value inside the inclusive
    /// range, in value order.
    pub fn items_in_value_range<'a>(
        &'a self,
        key: AnnoKey,
        lower_val: StringId,
        upper_val: StringId,
    ) -> impl Iterator<Item = &'a T> + 'a {
        let lower = Annotation { key, val: lower_val };
        let upper = Annotation { key, val: upper_val };
        self.by_anno
            .range((Included(lower), Included(upper)))
            .flat_map(|(_, items)| items.iter())
    }

    /// Containers matched by an exact annotation search, paired with the
    /// matching annotation.
    ///
    /// `ns == None` unions over all keys with the given name; `value ==
    /// None` matches any value. Results follow the inverse-index order.
    pub fn matching_items<'a>(
        &'a self,
        ns: Option<StringId>,
        name: StringId,
        value: Option<StringId>,
    ) -> Box<dyn Iterator<Item = (&'a T, Annotation)> + 'a> {
        let (val_lower, val_upper) = match value {
            Some(v) => (v, v),
            None => (StringId::MIN, StringId::MAX),
        };
        let ranges: Vec<(Annotation, Annotation)> = self
            .qualified_keys(ns, name)
            .map(|(key, _)| {
                (
                    Annotation { key, val: val_lower },
                    Annotation { key, val: val_upper },
                )
            })
            .collect();

        let it = ranges.into_iter().flat_map(move |(lower, upper)| {
            self.by_anno
                .range((Included(lower), Included(upper)))
                .flat_map(|(anno, items)| items.iter().map(move |item| (item, *anno)))
        });
        Box::new(it)
    }

    /// True when statistics have been computed for this storage.
    #[must_use]
    pub fn has_statistics(&self) -> bool {
        !self.histogram_bounds.is_empty()
    }

    /// Rebuilds the per-key value histograms.
    ///
    /// For every key the values are sampled uniformly (at most 2500), then
    /// up to 251 equi-count bounds are chosen with an integer stride and a
    /// fractional remainder accumulator so the bounds spread exactly
    /// uniformly over the sample.
    pub fn calculate_statistics(&mut self, strings: &StringPool) {
        self.histogram_bounds.clear();

        let keys: Vec<AnnoKey> = self.anno_keys.keys().copied().collect();
        for key in keys {
            let lower = Annotation { key, val: StringId::MIN };
            let upper = Annotation { key, val: StringId::MAX };

            // one entry per annotated container, so frequent values are
            // sampled proportionally
            let values: Vec<&str> = self
                .by_anno
                .range((Included(lower), Included(upper)))
                .flat_map(|(anno, items)| {
                    strings
                        .resolve(anno.val)
                        .into_iter()
                        .flat_map(move |s| std::iter::repeat(s).take(items.len()))
                })
                .collect();

            let mut rng = rand::thread_rng();
            let sample_size = values.len().min(MAX_SAMPLED_ANNOTATIONS);
            let mut sampled: Vec<&str> = rand::seq::index::sample(&mut rng, values.len(), sample_size)
                .into_iter()
                .map(|idx| values[idx])
                .collect();
            sampled.sort_unstable();

            let num_bounds = sampled.len().min(MAX_HISTOGRAM_BUCKETS + 1);
            if num_bounds < 2 {
                self.histogram_bounds.insert(key, Vec::new());
                continue;
            }

            let delta = (sampled.len() - 1) / (num_bounds - 1);
            let delta_fraction = (sampled.len() - 1) % (num_bounds - 1);

            let mut bounds = Vec::with_capacity(num_bounds);
            let mut pos = 0;
            let mut pos_fraction = 0;
            for _ in 0..num_bounds {
                bounds.push(sampled[pos].to_string());
                pos += delta;
                pos_fraction += delta_fraction;
                if pos_fraction >= num_bounds - 1 {
                    pos += 1;
                    pos_fraction -= num_bounds - 1;
                }
            }
            self.histogram_bounds.insert(key, bounds);
        }
    }

    /// Estimates an upper bound for the number of annotations with the
    /// given name whose value falls in `[lower_val, upper_val]`.
    ///
    /// For each matching key the key count is scaled by the fraction of
    /// histogram buckets overlapping the search range. Returns 0 when no
    /// matching key has a histogram.
    #[must_use]
    pub fn guess_max_count(
        &self,
        ns: Option<StringId>,
        name: StringId,
        lower_val: &str,
        upper_val: &str,
    ) -> usize {
        let mut universe_size = 0usize;
        let mut sum_buckets = 0usize;
        let mut matching_buckets = 0usize;

        for (key, count) in self.qualified_keys(ns, name) {
            universe_size += count;

            let Some(bounds) = self.histogram_bounds.get(&key) else {
                continue;
            };
            if bounds.len() < 2 {
                continue;
            }
            sum_buckets += bounds.len() - 1;
            for window in bounds.windows(2) {
                let bucket_begin = window[0].as_str();
                let bucket_end = window[1].as_str();
                if bucket_begin <= upper_val && lower_val <= bucket_end {
                    matching_buckets += 1;
                }
            }
        }

        if sum_buckets == 0 {
            return 0;
        }
        let selectivity = matching_buckets as f64 / sum_buckets as f64;
        (selectivity * universe_size as f64).round() as usize
    }

    /// Regex variant of [`guess_max_count`](Self::guess_max_count): the
    /// value range is derived from the pattern's mandatory literal prefix.
    #[must_use]
    pub fn guess_max_count_regex(
        &self,
        ns: Option<StringId>,
        name: StringId,
        pattern: &str,
    ) -> usize {
        match strings::possible_match_prefix(pattern) {
            Some(prefix) => {
                let mut upper = prefix.clone();
                upper.push(char::MAX);
                self.guess_max_count(ns, name, &prefix, &upper)
            }
            None => self.guess_max_count(ns, name, "", "\u{10FFFF}"),
        }
    }

    /// Byte-level estimate of the heap memory held by this storage.
    #[must_use]
    pub fn estimated_memory_size(&self) -> usize {
        let anno = mem::size_of::<Annotation>();
        let item = mem::size_of::<T>();
        let forward = self.by_container.len() * item + self.total_annos * anno;
        let inverse = self.by_anno.len() * anno + self.total_annos * item;
        let keys = self.anno_keys.len() * (mem::size_of::<AnnoKey>() + mem::size_of::<usize>());
        let histograms: usize = self
            .histogram_bounds
            .values()
            .map(|bounds| bounds.iter().map(String::len).sum::<usize>())
            .sum();
        forward + inverse + keys + histograms
    }
}

impl AnnoStorage<NodeId> {
    /// The next node id not used by any annotated node.
    #[must_use]
    pub fn next_free_node_id(&self) -> NodeId {
        self.largest_item().map_or(0, |n| n + 1)
    }

    /// Exact annotation search over nodes.
    pub fn exact_anno_search<'a>(
        &'a self,
        ns: Option<StringId>,
        name: StringId,
        value: Option<StringId>,
    ) -> Box<dyn Iterator<Item = Match> + 'a> {
        Box::new(
            self.matching_items(ns, name, value)
                .map(|(node, anno)| Match::new(*node, anno)),
        )
    }

    /// Regex annotation search over nodes.
    ///
    /// Candidate values are taken from the inverse index for the matching
    /// keys and full-matched through the string pool.
    pub fn regex_anno_search<'a>(
        &'a self,
        strings: &'a StringPool,
        ns: Option<StringId>,
        name: StringId,
        pattern: &str,
    ) -> Box<dyn Iterator<Item = Match> + 'a> {
        let matching_values = strings.find_regex(pattern);
        Box::new(
            self.matching_items(ns, name, None)
                .filter(move |(_, anno)| matching_values.contains(&anno.val))
                .map(|(node, anno)| Match::new(*node, anno)),
        )
    }
}

impl AnnoStorage<Edge> {
    /// Exact annotation search over edges; the reported node is the edge
    /// source.
    pub fn exact_anno_search<'a>(
        &'a self,
        ns: Option<StringId>,
        name: StringId,
        value: Option<StringId>,
    ) -> Box<dyn Iterator<Item = Match> + 'a> {
        Box::new(
            self.matching_items(ns, name, value)
                .map(|(edge, anno)| Match::new(edge.source, anno)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ns: StringId, name: StringId) -> AnnoKey {
        AnnoKey { name, ns }
    }

    #[test]
    fn insert_get_remove_roundtrip() {
        let mut annos: AnnoStorage<NodeId> = AnnoStorage::new();
        annos.insert(1, Annotation::new(2, 3, 4));
        annos.insert(1, Annotation::new(2, 5, 6));

        let before: Vec<_> = annos.get_all(&1).to_vec();
        let key_count_before = annos.get_all_keys().len();

        annos.insert(1, Annotation::new(7, 8, 9));
        assert_eq!(Some(9), annos.remove(&1, &key(7, 8)));

        assert_eq!(before, annos.get_all(&1).to_vec());
        assert_eq!(key_count_before, annos.get_all_keys().len());
        assert_eq!(2, annos.total_len());
    }

    #[test]
    fn replacing_value_keeps_key_count() {
        let mut annos: AnnoStorage<NodeId> = AnnoStorage::new();
        annos.insert(1, Annotation::new(2, 3, 4));
        annos.insert(1, Annotation::new(2, 3, 5));

        assert_eq!(1, annos.total_len());
        assert_eq!(Some(5), annos.get(&1, &key(2, 3)));
        assert_eq!(1, annos.num_of_annotations(Some(2), 3));
    }

    #[test]
    fn removing_last_value_drops_key() {
        let mut annos: AnnoStorage<NodeId> = AnnoStorage::new();
        annos.insert(1, Annotation::new(2, 3, 4));
        assert_eq!(1, annos.get_all_keys().len());

        annos.remove(&1, &key(2, 3));
        assert!(annos.get_all_keys().is_empty());
        assert!(annos.is_empty());
    }

    #[test]
    fn qnames_cover_all_namespaces() {
        let mut annos: AnnoStorage<NodeId> = AnnoStorage::new();
        annos.insert(1, Annotation::new(10, 3, 4));
        annos.insert(2, Annotation::new(20, 3, 4));
        annos.insert(3, Annotation::new(10, 9, 4));

        assert_eq!(vec![key(10, 3), key(20, 3)], annos.get_qnames(3));
        assert_eq!(2, annos.num_of_annotations(None, 3));
        assert_eq!(1, annos.num_of_annotations(Some(10), 3));
    }

    #[test]
    fn exact_search_unions_namespaces() {
        let mut annos: AnnoStorage<NodeId> = AnnoStorage::new();
        annos.insert(1, Annotation::new(10, 3, 7));
        annos.insert(2, Annotation::new(20, 3, 7));
        annos.insert(3, Annotation::new(10, 3, 8));

        let hits: Vec<NodeId> = annos.exact_anno_search(None, 3, Some(7)).map(|m| m.node).collect();
        assert_eq!(vec![1, 2], hits);

        let hits: Vec<NodeId> = annos.exact_anno_search(Some(10), 3, None).map(|m| m.node).collect();
        assert_eq!(vec![1, 3], hits);
    }

    #[test]
    fn bulk_load_matches_single_inserts() {
        let mut bulk: AnnoStorage<NodeId> = AnnoStorage::new();
        let mut single: AnnoStorage<NodeId> = AnnoStorage::new();

        let entries: Vec<(NodeId, Annotation)> = (0..100)
            .map(|i| (i, Annotation::new(1, 2, 3 + (i % 5))))
            .collect();
        for (n, a) in &entries {
            single.insert(*n, *a);
        }
        bulk.add_bulk(entries);

        assert_eq!(single.total_len(), bulk.total_len());
        assert_eq!(single.get_all_keys(), bulk.get_all_keys());
        assert_eq!(single.get(&17, &key(1, 2)), bulk.get(&17, &key(1, 2)));
        assert_eq!(Some(&99), bulk.largest_item());
        assert_eq!(100, bulk.next_free_node_id());
    }

    #[test]
    fn guess_max_count_bounded_by_key_count() {
        let mut strings = StringPool::new();
        let mut annos: AnnoStorage<NodeId> = AnnoStorage::new();

        let ns = strings.add("default_ns");
        let name = strings.add("pos");
        let values = ["ART", "NN", "NN", "VVFIN", "NN", "ART"];
        for (i, v) in values.iter().enumerate() {
            let val = strings.add(v);
            annos.insert(i as NodeId, Annotation::new(ns, name, val));
        }

        annos.calculate_statistics(&strings);
        assert!(annos.has_statistics());

        let guess = annos.guess_max_count(Some(ns), name, "NN", "NN");
        assert!(guess >= 1, "histogram covers an existing value");
        assert!(guess <= values.len());

        // a value outside every bucket
        assert_eq!(0, annos.guess_max_count(Some(ns), name, "ZZZ", "ZZZ"));
    }

    #[test]
    fn guess_max_count_without_statistics_is_zero() {
        let mut annos: AnnoStorage<NodeId> = AnnoStorage::new();
        annos.insert(1, Annotation::new(2, 3, 4));
        assert_eq!(0, annos.guess_max_count(Some(2), 3, "a", "z"));
    }

    #[test]
    fn value_range_scan() {
        let mut annos: AnnoStorage<NodeId> = AnnoStorage::new();
        for (node, val) in [(1u32, 10u32), (2, 20), (3, 30)] {
            annos.insert(node, Annotation::new(1, 2, val));
        }
        let hits: Vec<NodeId> = annos.items_in_value_range(key(1, 2), 10, 20).copied().collect();
        assert_eq!(vec![1, 2], hits);
    }
}
