//! The graph-update log.
//!
//! Mutations reach a corpus image as an ordered list of events addressing
//! nodes by their `annis::node_name` annotation. The log is applied
//! outside any running query; see
//! [`AnnotationGraph::apply_update`](crate::graph::AnnotationGraph::apply_update).

use serde::{Deserialize, Serialize};

/// One record of the update log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateEvent {
    /// Adds a node. Adding an existing node is a no-op.
    AddNode {
        /// The `annis::node_name` of the new node.
        node_name: String,
    },
    /// Deletes a node, its annotations and all its edges.
    DeleteNode {
        /// The `annis::node_name` of the node.
        node_name: String,
    },
    /// Adds (or replaces) an annotation of an existing node.
    AddNodeLabel {
        /// The `annis::node_name` of the node.
        node_name: String,
        /// The annotation namespace.
        anno_ns: String,
        /// The annotation name.
        anno_name: String,
        /// The annotation value.
        anno_value: String,
    },
    /// Deletes an annotation of a node.
    DeleteNodeLabel {
        /// The `annis::node_name` of the node.
        node_name: String,
        /// The annotation namespace.
        anno_ns: String,
        /// The annotation name.
        anno_name: String,
    },
}

/// An ordered sequence of update events.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GraphUpdate {
    events: Vec<UpdateEvent>,
}

impl GraphUpdate {
    /// Creates an empty update log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn add_event(&mut self, event: UpdateEvent) {
        self.events.push(event);
    }

    /// Appends an [`UpdateEvent::AddNode`].
    pub fn add_node(&mut self, node_name: impl Into<String>) {
        self.add_event(UpdateEvent::AddNode { node_name: node_name.into() });
    }

    /// Appends an [`UpdateEvent::DeleteNode`].
    pub fn delete_node(&mut self, node_name: impl Into<String>) {
        self.add_event(UpdateEvent::DeleteNode { node_name: node_name.into() });
    }

    /// Appends an [`UpdateEvent::AddNodeLabel`].
    pub fn add_node_label(
        &mut self,
        node_name: impl Into<String>,
        anno_ns: impl Into<String>,
        anno_name: impl Into<String>,
        anno_value: impl Into<String>,
    ) {
        self.add_event(UpdateEvent::AddNodeLabel {
            node_name: node_name.into(),
            anno_ns: anno_ns.into(),
            anno_name: anno_name.into(),
            anno_value: anno_value.into(),
        });
    }

    /// Appends an [`UpdateEvent::DeleteNodeLabel`].
    pub fn delete_node_label(
        &mut self,
        node_name: impl Into<String>,
        anno_ns: impl Into<String>,
        anno_name: impl Into<String>,
    ) {
        self.add_event(UpdateEvent::DeleteNodeLabel {
            node_name: node_name.into(),
            anno_ns: anno_ns.into(),
            anno_name: anno_name.into(),
        });
    }

    /// The events in application order.
    pub fn iter(&self) -> impl Iterator<Item = &UpdateEvent> {
        self.events.iter()
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if the log holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
