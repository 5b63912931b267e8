//! Error types for the core crate.

use thiserror::Error;

use crate::types::StringId;

/// Errors that can occur in the core crate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A string id was resolved that is not part of the string pool.
    ///
    /// This is never surfaced through the public query API; a corpus image
    /// only hands out ids it has interned, so hitting this indicates a bug.
    #[error("unknown string id {0}")]
    UnknownId(StringId),
}
