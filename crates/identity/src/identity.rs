//! Process-wide node identity.

use crate::error::{IdentityError, IdentityResult};
use rand::RngCore;
use std::sync::OnceLock;
use tracing::info;
use uuid::Uuid;

/// Durable persistent id plus a per-process session id.
///
/// Shared behind an `Arc` by the presence protocol and routing engine.
#[derive(Debug)]
pub struct NodeIdentity {
    persistent_id: OnceLock<String>,
    session_id: String,
}

impl NodeIdentity {
    /// Create an identity with a fresh session id and no persistent id yet.
    pub fn new() -> Self {
        Self {
            persistent_id: OnceLock::new(),
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create and initialize in one step.
    pub fn with_persistent_id(persistent_id: impl Into<String>) -> IdentityResult<Self> {
        let identity = Self::new();
        identity.initialize(persistent_id)?;
        Ok(identity)
    }

    /// Set the persistent id. Only the first call succeeds.
    pub fn initialize(&self, persistent_id: impl Into<String>) -> IdentityResult<()> {
        let persistent_id = persistent_id.into();
        if persistent_id.is_empty() {
            return Err(IdentityError::EmptyPersistentId);
        }

        self.persistent_id
            .set(persistent_id)
            .map_err(|_| IdentityError::AlreadyInitialized {
                existing: self.persistent_id.get().cloned().unwrap_or_default(),
            })?;

        info!(
            persistent_id = %self.persistent_id.get().map(String::as_str).unwrap_or_default(),
            session_id = %self.session_id,
            "Node identity initialized"
        );
        Ok(())
    }

    /// The persistent id, or [`IdentityError::Uninitialized`].
    pub fn get(&self) -> IdentityResult<&str> {
        self.persistent_id
            .get()
            .map(String::as_str)
            .ok_or(IdentityError::Uninitialized)
    }

    /// The persistent id if one has been set.
    pub fn try_get(&self) -> Option<&str> {
        self.persistent_id.get().map(String::as_str)
    }

    /// Always available; generated at construction.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether [`NodeIdentity::initialize`] has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.persistent_id.get().is_some()
    }
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a random 128-bit persistent id (hex) for a device with none stored.
pub fn generate_persistent_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
