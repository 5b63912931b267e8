//! Error types of the public API.

use thiserror::Error;

/// Result type of the public API.
pub type Result<T> = std::result::Result<T, CorpusDbError>;

/// Errors surfaced by [`CorpusStorage`](crate::CorpusStorage).
#[derive(Debug, Error)]
pub enum CorpusDbError {
    /// No corpus with the given name exists in the storage directory.
    #[error("corpus '{0}' not found")]
    CorpusNotFound(String),

    /// A corpus with the given name already exists.
    #[error("corpus '{0}' already exists")]
    CorpusExists(String),

    /// Loading or saving a corpus image failed.
    #[error(transparent)]
    Graph(#[from] corpusdb_graph::GraphError),

    /// Planning or executing a query failed.
    #[error(transparent)]
    Query(#[from] corpusdb_query::QueryError),

    /// An I/O error while managing the storage directory.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
