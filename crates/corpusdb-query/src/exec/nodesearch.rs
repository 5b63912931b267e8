//! Base execution nodes wrapping annotation searches.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use corpusdb_core::{strings, AnnoKey, Annotation, Match, NodeId};
use corpusdb_graph::AnnotationGraph;

use crate::search::NodeSearchSpec;

use super::{Desc, ExecutionNode, MatchGroup};

/// What the right-hand side of a seed join may probe against.
#[derive(Debug, Clone)]
pub enum SearchKind {
    /// The search matches exactly these annotations.
    Value(BTreeSet<Annotation>),
    /// The search matches any value of these keys.
    Key(BTreeSet<AnnoKey>),
}

/// Seed-join view of a node search: the annotation condition plus the
/// optional constant annotation of a wrapped search.
#[derive(Debug, Clone)]
pub struct NodeSearchDesc {
    /// The annotation condition.
    pub kind: SearchKind,
    /// Replaces the matched annotation when the search is wrapped as a
    /// bare node match.
    pub const_anno: Option<Annotation>,
}

impl NodeSearchDesc {
    /// The matches a candidate node contributes under this condition.
    #[must_use]
    pub fn matches_for_node(&self, graph: &AnnotationGraph, node: NodeId) -> Vec<Match> {
        let annos = graph.node_annos();
        let mut result: Vec<Match> = Vec::new();
        match &self.kind {
            SearchKind::Value(valid) => {
                if valid.len() == 1 {
                    // single annotation: one spot probe suffices
                    if let Some(single) = valid.iter().next() {
                        if annos.get(&node, &single.key) == Some(single.val) {
                            result.push(Match::new(node, *single));
                        }
                    }
                } else {
                    for anno in annos.get_all(&node) {
                        if valid.contains(anno) {
                            result.push(Match::new(node, *anno));
                        }
                    }
                }
            }
            SearchKind::Key(valid) => {
                for key in valid {
                    if let Some(val) = annos.get(&node, key) {
                        result.push(Match::new(node, Annotation { key: *key, val }));
                    }
                }
            }
        }

        if let Some(const_anno) = self.const_anno {
            // the rewrite can collapse distinct matches of one node
            result.truncate(1);
            for m in &mut result {
                m.anno = const_anno;
            }
        }
        result
    }
}

/// An execution node yielding one-column tuples from an annotation search.
pub struct NodeSearch<'a> {
    it: Box<dyn Iterator<Item = MatchGroup> + 'a>,
    desc: Desc,
    search_desc: Arc<NodeSearchDesc>,
    estimate: Option<usize>,
}

impl<'a> NodeSearch<'a> {
    /// Builds the executable search for one query node.
    ///
    /// Specs referring to strings the corpus never interned yield an empty
    /// search with a zero estimate.
    #[must_use]
    pub fn from_spec(
        spec: &NodeSearchSpec,
        wrap_as_node: bool,
        node_nr: usize,
        graph: &'a AnnotationGraph,
    ) -> Self {
        // a regex that is a plain literal degrades to an exact search
        let normalized: NodeSearchSpec = match spec {
            NodeSearchSpec::RegexValue { ns, name, pattern }
                if strings::is_plain_literal(pattern) =>
            {
                NodeSearchSpec::ExactValue { ns: ns.clone(), name: name.clone(), val: pattern.clone() }
            }
            other => other.clone(),
        };
        let spec = &normalized;

        let const_anno = wrap_as_node
            .then(|| Annotation { key: graph.node_name_key(), val: 0 });

        let (it, kind, estimate): (Box<dyn Iterator<Item = Match> + 'a>, SearchKind, Option<usize>) =
            Self::resolve(spec, graph);

        let query_fragment = spec.to_string();
        let impl_description = match spec {
            NodeSearchSpec::ExactValue { .. } => "exact-value-search",
            NodeSearchSpec::ExactKey { .. } => "exact-key-search",
            NodeSearchSpec::RegexValue { .. } => "regex-value-search",
        };

        let it: Box<dyn Iterator<Item = MatchGroup> + 'a> = match const_anno {
            Some(const_anno) => {
                // the rewrite may collapse previously distinct matches
                let mut seen: HashSet<NodeId> = HashSet::new();
                Box::new(
                    it.filter(move |m| seen.insert(m.node))
                        .map(move |m| vec![Match::new(m.node, const_anno)]),
                )
            }
            None => Box::new(it.map(|m| vec![m])),
        };

        Self {
            it,
            desc: Desc::base(node_nr, impl_description, &query_fragment),
            search_desc: Arc::new(NodeSearchDesc { kind, const_anno }),
            estimate,
        }
    }

    fn resolve(
        spec: &NodeSearchSpec,
        graph: &'a AnnotationGraph,
    ) -> (Box<dyn Iterator<Item = Match> + 'a>, SearchKind, Option<usize>) {
        let pool = graph.strings();
        let annos = graph.node_annos();

        let empty_value = || SearchKind::Value(BTreeSet::new());

        let (ns_str, name_str) = match spec {
            NodeSearchSpec::ExactValue { ns, name, .. }
            | NodeSearchSpec::ExactKey { ns, name }
            | NodeSearchSpec::RegexValue { ns, name, .. } => (ns.as_deref(), name.as_str()),
        };

        let Some(name) = pool.find_id(name_str) else {
            return (Box::new(std::iter::empty()), empty_value(), Some(0));
        };
        let ns = match ns_str {
            Some(ns_str) => match pool.find_id(ns_str) {
                Some(id) => Some(id),
                None => return (Box::new(std::iter::empty()), empty_value(), Some(0)),
            },
            None => None,
        };
        let keys: Vec<AnnoKey> = match ns {
            Some(ns) => vec![AnnoKey { name, ns }],
            None => annos.get_qnames(name),
        };

        match spec {
            NodeSearchSpec::ExactValue { val, .. } => {
                let Some(val_id) = pool.find_id(val) else {
                    return (Box::new(std::iter::empty()), empty_value(), Some(0));
                };
                let valid: BTreeSet<Annotation> = keys
                    .iter()
                    .map(|key| Annotation { key: *key, val: val_id })
                    .collect();
                let estimate = annos
                    .has_statistics()
                    .then(|| annos.guess_max_count(ns, name, val, val));
                (annos.exact_anno_search(ns, name, Some(val_id)), SearchKind::Value(valid), estimate)
            }
            NodeSearchSpec::ExactKey { .. } => {
                let valid: BTreeSet<AnnoKey> = keys.iter().copied().collect();
                let estimate = Some(annos.num_of_annotations(ns, name));
                (annos.exact_anno_search(ns, name, None), SearchKind::Key(valid), estimate)
            }
            NodeSearchSpec::RegexValue { pattern, .. } => {
                let matching_values = pool.find_regex(pattern);
                let valid: BTreeSet<Annotation> = keys
                    .iter()
                    .flat_map(|key| {
                        matching_values
                            .iter()
                            .map(move |val| Annotation { key: *key, val: *val })
                    })
                    .collect();
                let estimate = annos
                    .has_statistics()
                    .then(|| annos.guess_max_count_regex(ns, name, pattern));
                (
                    annos.regex_anno_search(pool, ns, name, pattern),
                    SearchKind::Value(valid),
                    estimate,
                )
            }
        }
    }

    /// The estimated number of matches; `None` when no statistics are
    /// available.
    #[must_use]
    pub fn estimated_max_count(&self) -> Option<usize> {
        self.estimate
    }

    /// The seed-join view of this search.
    #[must_use]
    pub fn search_desc(&self) -> Arc<NodeSearchDesc> {
        Arc::clone(&self.search_desc)
    }

    /// Replaces the plan description.
    pub fn set_desc(&mut self, desc: Desc) {
        self.desc = desc;
    }
}

impl ExecutionNode for NodeSearch<'_> {
    fn get_desc(&self) -> Option<&Desc> {
        Some(&self.desc)
    }
}

impl Iterator for NodeSearch<'_> {
    type Item = MatchGroup;

    fn next(&mut self) -> Option<MatchGroup> {
        self.it.next()
    }
}
