//! Error types for the graph crate.

use thiserror::Error;

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur in the graph layer.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A snapshot directory did not have the expected layout.
    #[error("corpus snapshot is corrupt: {0}")]
    CorpusCorrupt(String),

    /// A snapshot manifest named a graph-storage implementation this build
    /// does not know.
    #[error("unknown graph storage implementation '{0}'")]
    UnknownImplementation(String),

    /// A component was expected to be writable but is not.
    #[error("component {0} has no writable representation")]
    NotWritable(String),

    /// A component does not fit the width parameters of the selected
    /// storage.
    #[error("component exceeds the capacity of storage '{storage}'")]
    CapacityExceeded {
        /// The storage whose width parameter overflowed.
        storage: &'static str,
    },

    /// Snapshot (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// An I/O error during snapshot load or save.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error bubbled up from the core layer.
    #[error(transparent)]
    Core(#[from] corpusdb_core::CoreError),
}
