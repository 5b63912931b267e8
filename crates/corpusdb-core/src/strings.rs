//! The string pool.
//!
//! All annotation namespaces, names and values are interned into dense
//! 32-bit [`StringId`]s. The pool is bidirectional: ids resolve back to
//! strings, and the value-ordered index supports the range scans that
//! regular-expression searches use to avoid visiting every entry.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::ops::Bound::Included;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::StringId;

/// Anchors a user-supplied pattern so it must match a complete value.
#[must_use]
pub fn full_match_pattern(pattern: &str) -> String {
    format!(r"\A(?:{pattern})\z")
}

/// Extracts the literal prefix every match of `pattern` must start with.
///
/// Returns `None` when the pattern is invalid or has no mandatory literal
/// prefix. The result bounds the ordered range scan over candidate values;
/// candidates still have to be fully matched afterwards.
#[must_use]
pub fn possible_match_prefix(pattern: &str) -> Option<String> {
    let hir = regex_syntax::Parser::new().parse(pattern).ok()?;
    let mut bytes: Vec<u8> = Vec::new();
    collect_literal_prefix(&hir, &mut bytes);
    if bytes.is_empty() {
        None
    } else {
        String::from_utf8(bytes).ok()
    }
}

fn collect_literal_prefix(hir: &regex_syntax::hir::Hir, out: &mut Vec<u8>) {
    use regex_syntax::hir::HirKind;

    match hir.kind() {
        HirKind::Literal(lit) => out.extend_from_slice(&lit.0),
        HirKind::Concat(parts) => {
            for part in parts {
                match part.kind() {
                    HirKind::Literal(lit) => out.extend_from_slice(&lit.0),
                    // anchors do not consume input
                    HirKind::Look(_) => {}
                    _ => break,
                }
            }
        }
        _ => {}
    }
}

/// Returns whether `pattern` matches exactly the literal string it spells
/// out, i.e. contains no regular-expression meta characters.
#[must_use]
pub fn is_plain_literal(pattern: &str) -> bool {
    possible_match_prefix(pattern).as_deref() == Some(pattern)
}

/// A bidirectional interner for annotation strings.
///
/// Ids are assigned monotonically starting at 1 and are never reassigned;
/// id `0` is reserved to mean "any". Adding an existing string returns its
/// original id.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StringPool {
    // both directions use ordered maps so snapshots are deterministic
    by_id: BTreeMap<StringId, String>,
    by_value: BTreeMap<String, StringId>,
}

impl StringPool {
    /// Creates an empty string pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `value` and returns its id.
    ///
    /// Idempotent: an already interned value keeps its id.
    pub fn add(&mut self, value: &str) -> StringId {
        if let Some(existing) = self.by_value.get(value) {
            return *existing;
        }
        // id 0 is reserved, so the first entry gets id 1
        let mut id = self.by_id.len() as StringId + 1;
        while self.by_id.contains_key(&id) {
            id += 1;
        }
        self.by_id.insert(id, value.to_string());
        self.by_value.insert(value.to_string(), id);
        id
    }

    /// Resolves an id, failing with [`CoreError::UnknownId`] if absent.
    pub fn get(&self, id: StringId) -> Result<&str, CoreError> {
        self.resolve(id).ok_or(CoreError::UnknownId(id))
    }

    /// Resolves an id to its string if it is known.
    #[must_use]
    pub fn resolve(&self, id: StringId) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    /// Looks up the id of an exact string.
    #[must_use]
    pub fn find_id(&self, value: &str) -> Option<StringId> {
        self.by_value.get(value).copied()
    }

    /// Finds the ids of all values fully matching the pattern.
    ///
    /// Entries are visited in value order, restricted to the range derived
    /// from the pattern's mandatory literal prefix. An invalid pattern
    /// yields the empty set.
    #[must_use]
    pub fn find_regex(&self, pattern: &str) -> BTreeSet<StringId> {
        let mut result = BTreeSet::new();

        let re = match Regex::new(&full_match_pattern(pattern)) {
            Ok(re) => re,
            Err(_) => return result,
        };

        match possible_match_prefix(pattern) {
            Some(prefix) => {
                let mut upper = prefix.clone();
                upper.push(char::MAX);
                for (value, id) in self.by_value.range((Included(prefix), Included(upper))) {
                    if re.is_match(value) {
                        result.insert(*id);
                    }
                }
            }
            None => {
                for (value, id) in &self.by_value {
                    if re.is_match(value) {
                        result.insert(*id);
                    }
                }
            }
        }

        result
    }

    /// Number of interned strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True if the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Average length of the interned strings.
    #[must_use]
    pub fn avg_length(&self) -> f64 {
        if self.by_value.is_empty() {
            return 0.0;
        }
        let sum: usize = self.by_value.keys().map(String::len).sum();
        sum as f64 / self.by_value.len() as f64
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_value.clear();
    }

    /// Byte-level estimate of the heap memory held by this pool.
    #[must_use]
    pub fn estimated_memory_size(&self) -> usize {
        let entry_overhead = mem::size_of::<StringId>() + mem::size_of::<String>();
        self.by_value
            .keys()
            .map(|s| 2 * (s.len() + entry_overhead))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut pool = StringPool::new();
        let id1 = pool.add("abc");
        let id2 = pool.add("def");
        let id3 = pool.add("def");

        assert_eq!(2, pool.len());
        assert_eq!(id2, id3);
        assert_eq!(Some("abc"), pool.resolve(id1));
        assert_eq!(Ok("def"), pool.get(id2));

        pool.clear();
        assert_eq!(0, pool.len());
    }

    #[test]
    fn ids_start_at_one() {
        let mut pool = StringPool::new();
        assert_eq!(1, pool.add("first"));
        assert_eq!(2, pool.add("second"));
        assert_eq!(1, pool.add("first"));
    }

    #[test]
    fn unknown_id_fails() {
        let pool = StringPool::new();
        assert_eq!(Err(CoreError::UnknownId(42)), pool.get(42));
    }

    #[test]
    fn regex_search_uses_prefix_range() {
        let mut pool = StringPool::new();
        let blumen = pool.add("Blumen");
        let blume = pool.add("Blume");
        pool.add("Baum");
        pool.add("Zaun");

        let hits = pool.find_regex("Blume.*");
        assert_eq!(
            vec![blumen, blume],
            hits.into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn regex_search_full_match_only() {
        let mut pool = StringPool::new();
        pool.add("Verbalstil");
        let stil = pool.add("Stil");

        // an unanchored "Stil" must not match inside "Verbalstil"
        let hits = pool.find_regex("Stil");
        assert_eq!(vec![stil], hits.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn invalid_pattern_yields_empty_set() {
        let mut pool = StringPool::new();
        pool.add("abc");
        assert!(pool.find_regex("[unclosed").is_empty());
    }

    #[test]
    fn literal_prefix_extraction() {
        assert_eq!(Some(String::from("NN")), possible_match_prefix("NN"));
        assert_eq!(Some(String::from("NN")), possible_match_prefix("NN.*"));
        assert_eq!(None, possible_match_prefix(".*NN"));
        assert!(is_plain_literal("used"));
        assert!(!is_plain_literal("NN.*"));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut pool = StringPool::new();
        pool.add("abc");
        pool.add("def");

        let bytes = bincode::serialize(&pool).expect("serialize");
        let restored: StringPool = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(2, restored.len());
        assert_eq!(pool.find_id("abc"), restored.find_id("abc"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        proptest! {
            #[test]
            fn adding_is_idempotent_and_bijective(values in proptest::collection::vec(".{0,12}", 0..32)) {
                let mut pool = StringPool::new();
                let ids: Vec<StringId> = values.iter().map(|v| pool.add(v)).collect();

                let distinct: BTreeSet<&String> = values.iter().collect();
                prop_assert_eq!(distinct.len(), pool.len());

                for (value, id) in values.iter().zip(&ids) {
                    prop_assert!(*id != 0);
                    prop_assert_eq!(Some(*id), pool.find_id(value));
                    prop_assert_eq!(Some(value.as_str()), pool.resolve(*id));
                }
            }
        }
    }
}
