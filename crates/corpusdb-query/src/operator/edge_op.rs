//! The shared edge-walking operator behind dominance and pointing.
//!
//! Both operators are a reachability test over every component of their
//! type that matches the requested layer and name, optionally restricted
//! to edges carrying a specific annotation. They only differ in their
//! component type and operator symbol.

use std::fmt;
use std::sync::Arc;

use corpusdb_core::{Annotation, ComponentType, Edge, Match};
use corpusdb_graph::{AnnotationGraph, GraphStorage};

use crate::query::EdgeAnnoSpec;

use super::{edge_reachability_selectivity, format_range, BinaryOperator};

/// A resolved edge-annotation requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EdgeAnnoFilter {
    /// No requirement.
    Any,
    /// Edges must carry an annotation matching the template; the value
    /// string is kept for selectivity estimation.
    Template(Annotation, Option<String>),
    /// The requirement refers to strings the corpus does not contain, so
    /// nothing can match.
    Impossible,
}

impl EdgeAnnoFilter {
    fn resolve(graph: &AnnotationGraph, spec: Option<&EdgeAnnoSpec>) -> Self {
        let Some(spec) = spec else {
            return Self::Any;
        };
        let strings = graph.strings();

        let Some(name) = strings.find_id(&spec.name) else {
            return Self::Impossible;
        };
        let ns = match &spec.ns {
            Some(ns) => match strings.find_id(ns) {
                Some(id) => id,
                None => return Self::Impossible,
            },
            None => 0,
        };
        let val = match &spec.val {
            Some(val) => match strings.find_id(val) {
                Some(id) => id,
                None => return Self::Impossible,
            },
            None => 0,
        };
        Self::Template(Annotation::new(ns, name, val), spec.val.clone())
    }

    fn accepts(&self, gs: &dyn GraphStorage, source: u32, target: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Impossible => false,
            Self::Template(template, _) => gs
                .get_edge_annos(&Edge::new(source, target))
                .iter()
                .any(|anno| template.matches(anno)),
        }
    }
}

/// Reachability over all matching components of one type.
pub struct BaseEdgeOp {
    gs: Vec<Arc<dyn GraphStorage>>,
    min_dist: usize,
    max_dist: usize,
    edge_anno: EdgeAnnoFilter,
    op_str: String,
}

impl BaseEdgeOp {
    /// Creates a dominance operator (`>`).
    #[must_use]
    pub fn dominance(
        graph: &AnnotationGraph,
        layer: Option<&str>,
        name: Option<&str>,
        min_dist: usize,
        max_dist: usize,
        edge_anno: Option<&EdgeAnnoSpec>,
    ) -> Self {
        Self::for_type(graph, ComponentType::Dominance, ">", layer, name, min_dist, max_dist, edge_anno)
    }

    /// Creates a pointing operator (`->`).
    #[must_use]
    pub fn pointing(
        graph: &AnnotationGraph,
        layer: Option<&str>,
        name: Option<&str>,
        min_dist: usize,
        max_dist: usize,
        edge_anno: Option<&EdgeAnnoSpec>,
    ) -> Self {
        Self::for_type(graph, ComponentType::Pointing, "->", layer, name, min_dist, max_dist, edge_anno)
    }

    #[allow(clippy::too_many_arguments)]
    fn for_type(
        graph: &AnnotationGraph,
        ctype: ComponentType,
        symbol: &str,
        layer: Option<&str>,
        name: Option<&str>,
        min_dist: usize,
        max_dist: usize,
        edge_anno: Option<&EdgeAnnoSpec>,
    ) -> Self {
        let components = graph.get_all_components(Some(ctype), layer, name);
        let gs = components
            .iter()
            .filter_map(|c| graph.get_graphstorage(c))
            .collect();

        let op_str = match name {
            Some(name) if !name.is_empty() => format!("{symbol}{name} "),
            _ => symbol.to_string(),
        };

        Self {
            gs,
            min_dist,
            max_dist,
            edge_anno: EdgeAnnoFilter::resolve(graph, edge_anno),
            op_str,
        }
    }
}

impl fmt::Display for BaseEdgeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op_str, format_range(self.min_dist, self.max_dist))?;
        if let EdgeAnnoFilter::Template(_, Some(val)) = &self.edge_anno {
            write!(f, "[{val}]")?;
        }
        Ok(())
    }
}

impl BinaryOperator for BaseEdgeOp {
    fn retrieve_matches<'b>(&'b self, lhs: &Match) -> Box<dyn Iterator<Item = Match> + 'b> {
        if matches!(self.edge_anno, EdgeAnnoFilter::Impossible) {
            return Box::new(std::iter::empty());
        }
        let source = lhs.node;

        if self.gs.len() == 1 {
            // a single component cannot produce duplicates
            let gs = &self.gs[0];
            let result: Vec<Match> = gs
                .find_connected(source, self.min_dist, self.max_dist)
                .filter(|candidate| self.edge_anno.accepts(gs.as_ref(), source, *candidate))
                .map(|node| Match::new(node, Annotation::default()))
                .collect();
            Box::new(result.into_iter())
        } else {
            let mut all: Vec<Match> = self
                .gs
                .iter()
                .flat_map(|gs| {
                    gs.find_connected(source, self.min_dist, self.max_dist)
                        .filter(|candidate| self.edge_anno.accepts(gs.as_ref(), source, *candidate))
                        .map(|node| Match::new(node, Annotation::default()))
                        .collect::<Vec<_>>()
                })
                .collect();
            all.sort_unstable();
            all.dedup();
            Box::new(all.into_iter())
        }
    }

    fn filter_match(&self, lhs: &Match, rhs: &Match) -> bool {
        self.gs.iter().any(|gs| {
            gs.is_connected(lhs.node, rhs.node, self.min_dist, self.max_dist)
                && self.edge_anno.accepts(gs.as_ref(), lhs.node, rhs.node)
        })
    }

    fn selectivity(&self) -> f64 {
        if self.gs.is_empty() || matches!(self.edge_anno, EdgeAnnoFilter::Impossible) {
            return 0.0;
        }
        // the worst (largest) component dominates the estimate
        self.gs
            .iter()
            .map(|gs| edge_reachability_selectivity(gs.get_statistics(), self.min_dist, self.max_dist))
            .fold(0.0, f64::max)
    }

    fn edge_anno_selectivity(&self) -> Option<f64> {
        match &self.edge_anno {
            EdgeAnnoFilter::Any => None,
            EdgeAnnoFilter::Impossible => Some(0.0),
            EdgeAnnoFilter::Template(template, val_str) => {
                let mut worst = 0.0f64;
                for gs in &self.gs {
                    let annos = gs.get_anno_storage();
                    let total = annos.total_len();
                    if total == 0 {
                        return Some(0.0);
                    }
                    let guessed = match val_str {
                        Some(val) => {
                            let ns =
                                if template.key.ns == 0 { None } else { Some(template.key.ns) };
                            annos.guess_max_count(ns, template.key.name, val, val)
                        }
                        // key requirement only: every edge with the key counts
                        None => annos.num_of_annotations(
                            if template.key.ns == 0 { None } else { Some(template.key.ns) },
                            template.key.name,
                        ),
                    };
                    worst = worst.max(guessed as f64 / total as f64);
                }
                Some(worst)
            }
        }
    }
}
