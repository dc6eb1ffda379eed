//! Error types for identity operations.

use thiserror::Error;

/// Errors that can occur in identity operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The persistent id was read before the host supplied it
    #[error("Node identity not initialized")]
    Uninitialized,

    /// A second persistent id was supplied for this process
    #[error("Node identity already initialized as {existing}")]
    AlreadyInitialized { existing: String },

    /// Persistent ids must be non-empty
    #[error("Persistent id must not be empty")]
    EmptyPersistentId,
}

/// Result type for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
