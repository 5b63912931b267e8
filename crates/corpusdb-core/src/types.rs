//! Core data types for annotation graphs.
//!
//! Nodes and strings are identified by dense 32-bit ids. Annotations are
//! triples of interned strings; edges are partitioned into typed
//! [`Component`]s, with one graph storage per component.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A node id, dense over one corpus.
pub type NodeId = u32;

/// An interned string id.
///
/// Id `0` is reserved and never assigned by the string pool. In annotation
/// templates it means "any value" (or "any namespace" in the key position).
pub type StringId = u32;

/// The fully qualified name of an annotation: `(namespace, name)`.
///
/// Ordered name-major so that all qualified keys sharing an unqualified
/// name form a contiguous range in ordered containers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct AnnoKey {
    /// The annotation name.
    pub name: StringId,
    /// The annotation namespace.
    pub ns: StringId,
}

impl AnnoKey {
    /// Creates a new annotation key.
    #[must_use]
    pub const fn new(ns: StringId, name: StringId) -> Self {
        Self { name, ns }
    }
}

/// An annotation: a key plus an (interned) value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Annotation {
    /// The qualified annotation name.
    pub key: AnnoKey,
    /// The annotation value.
    pub val: StringId,
}

impl Annotation {
    /// Creates a new annotation.
    #[must_use]
    pub const fn new(ns: StringId, name: StringId, val: StringId) -> Self {
        Self { key: AnnoKey { name, ns }, val }
    }

    /// Checks whether `other` is described by this annotation template.
    ///
    /// Template fields with the reserved id `0` act as wildcards; all other
    /// fields must be equal.
    #[must_use]
    pub fn matches(&self, other: &Annotation) -> bool {
        (self.key.ns == 0 || self.key.ns == other.key.ns)
            && (self.key.name == 0 || self.key.name == other.key.name)
            && (self.val == 0 || self.val == other.val)
    }
}

/// A single matched node together with the annotation that matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Match {
    /// The matched node.
    pub node: NodeId,
    /// The annotation of the node that matched the search.
    pub anno: Annotation,
}

impl Match {
    /// Creates a new match.
    #[must_use]
    pub const fn new(node: NodeId, anno: Annotation) -> Self {
        Self { node, anno }
    }

    /// True if both matches refer to the same node with the same
    /// annotation key.
    ///
    /// Non-reflexive operators use this to reject a node being combined
    /// with itself.
    #[must_use]
    pub fn same_node_and_key(&self, other: &Match) -> bool {
        self.node == other.node && self.anno.key == other.anno.key
    }
}

/// A directed edge between two nodes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Edge {
    /// The source node.
    pub source: NodeId,
    /// The target node.
    pub target: NodeId,
}

impl Edge {
    /// Creates a new edge.
    #[must_use]
    pub const fn new(source: NodeId, target: NodeId) -> Self {
        Self { source, target }
    }

    /// Returns the edge with source and target swapped.
    #[must_use]
    pub const fn inverse(&self) -> Self {
        Self { source: self.target, target: self.source }
    }
}

/// The type of an edge component.
///
/// Components partition the edge multigraph; the same node pair may be
/// linked in several components, each independently queried.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ComponentType {
    /// A node covers a token.
    Coverage,
    /// Hierarchical dominance between syntax nodes.
    Dominance,
    /// Arbitrary pointing relations (dependencies, coreference, ...).
    Pointing,
    /// The linear order of tokens.
    Ordering,
    /// Alignment of a node with its left-most covered token.
    LeftToken,
    /// Alignment of a node with its right-most covered token.
    RightToken,
}

impl ComponentType {
    /// All component types, in a fixed order.
    ///
    /// Used when enumerating snapshot directories.
    pub const ALL: [ComponentType; 6] = [
        ComponentType::Coverage,
        ComponentType::Dominance,
        ComponentType::Pointing,
        ComponentType::Ordering,
        ComponentType::LeftToken,
        ComponentType::RightToken,
    ];

    /// Parses a component type from its display name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<ComponentType> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }

    /// The stable display name of this component type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Coverage => "COVERAGE",
            ComponentType::Dominance => "DOMINANCE",
            ComponentType::Pointing => "POINTING",
            ComponentType::Ordering => "ORDERING",
            ComponentType::LeftToken => "LEFT_TOKEN",
            ComponentType::RightToken => "RIGHT_TOKEN",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one edge component: `(type, layer, name)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Component {
    /// The component type.
    pub ctype: ComponentType,
    /// The layer (namespace) the component belongs to.
    pub layer: String,
    /// The name of the component. Empty for the unnamed default component.
    pub name: String,
}

impl Component {
    /// Creates a new component identifier.
    pub fn new(ctype: ComponentType, layer: impl Into<String>, name: impl Into<String>) -> Self {
        Self { ctype, layer: layer.into(), name: name.into() }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.ctype, self.layer, self.name)
    }
}
