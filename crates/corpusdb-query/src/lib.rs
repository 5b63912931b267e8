//! `CorpusDB` Query
//!
//! The query execution pipeline: annotation searches produce candidate
//! matches, binary operators relate them, the planner combines both into
//! an execution DAG, and pull-based join executors stream the resulting
//! match tuples.
//!
//! # Modules
//!
//! - [`query`] - The parsed-query contract ([`query::Query`])
//! - [`search`] - Annotation search specifications
//! - [`operator`] - Binary operators (precedence, dominance, ...)
//! - [`exec`] - Join and filter executors
//! - [`plan`] - The planner and [`plan::ExecutionPlan`]
//! - [`token_helper`] - Span borders over the reserved components
//! - [`cancel`] - Cooperative cancellation and deadlines

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod cancel;
pub mod error;
pub mod exec;
pub mod operator;
pub mod plan;
pub mod query;
pub mod search;
pub mod token_helper;

pub use cancel::CancellationToken;
pub use error::{QueryError, QueryResult};
pub use exec::MatchGroup;
pub use plan::{ExecutionPlan, NonParallelJoin, QueryConfig};
pub use query::{EdgeAnnoSpec, OperatorEntry, OperatorKind, Query};
pub use search::NodeSearchSpec;
