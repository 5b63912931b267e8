//! `CorpusDB` Core
//!
//! This crate provides the fundamental types shared by all layers of
//! `CorpusDB`, an in-memory query engine for linguistic annotation graphs.
//!
//! # Overview
//!
//! A corpus is a directed multi-relational graph. Nodes carry sets of
//! key/value annotations; edges are partitioned into typed components.
//! This crate defines the vocabulary for both:
//!
//! - **Identifiers**: [`NodeId`] and [`StringId`] (interned strings)
//! - **Annotations**: [`AnnoKey`], [`Annotation`] and [`Match`]
//! - **Components**: [`Component`] and [`ComponentType`]
//! - **String pool**: [`StringPool`], a bidirectional interner with ordered
//!   range lookup for regular-expression pre-filtering
//! - **Annotation storage**: [`AnnoStorage`], three coupled indexes plus
//!   value histograms for selectivity estimation
//!
//! # Modules
//!
//! - [`types`] - Core data types
//! - [`strings`] - The string pool
//! - [`annostorage`] - The annotation storage
//! - [`error`] - Error types ([`CoreError`])

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod annostorage;
pub mod error;
pub mod strings;
pub mod types;

pub use annostorage::AnnoStorage;
pub use error::CoreError;
pub use strings::StringPool;
pub use types::{AnnoKey, Annotation, Component, ComponentType, Edge, Match, NodeId, StringId};

/// The reserved namespace for annotations with engine-defined semantics.
pub const ANNIS_NS: &str = "annis";
/// Reserved annotation name identifying a node.
pub const NODE_NAME: &str = "node_name";
/// Reserved annotation name marking a surface token and holding its text.
pub const TOK: &str = "tok";
/// Reserved annotation name holding the kind of a node.
pub const NODE_TYPE: &str = "node_type";
/// Reserved annotation name holding the document a node belongs to.
pub const DOCUMENT: &str = "document";
