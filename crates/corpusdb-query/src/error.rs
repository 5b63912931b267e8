//! Error types for the query crate.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors that can occur while planning or executing a query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The operator entries do not connect all query nodes into one
    /// component.
    #[error("query node #{0} is not connected to the rest of the query")]
    DisconnectedQuery(usize),

    /// The query refers to node indices that do not exist, or is otherwise
    /// malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The deadline given for the query was exceeded.
    #[error("query timed out")]
    Timeout,

    /// The query was cancelled from the outside.
    #[error("query aborted")]
    Aborted,
}
