//! Error types for Meshage mesh operations.
//!
//! Most protocol-level failures never surface as errors: duplicates are
//! dropped, missing routes trigger discovery and failed sends are handled
//! as link breakage. What remains is construction, encoding and runtime
//! plumbing.

use meshage_identity::IdentityError;
use thiserror::Error;

/// Errors that can occur in mesh operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Identity precondition violated (usually an uninitialized persistent id)
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Inbound envelope failed validation
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The runtime task has stopped and no longer accepts commands
    #[error("Mesh runtime stopped")]
    RuntimeStopped,
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;
