//! Node identity for the Meshage mesh.
//!
//! Every device carries two identifiers:
//!
//! - **Persistent id**: durable, assigned once by the host at startup and
//!   reused across restarts. Routing tables are keyed by it.
//! - **Session id**: generated fresh for each process, so peers can tell a
//!   restarted device from a long-lived one.
//!
//! The persistent id is write-once. Reading it before the host has
//! supplied it is a precondition violation and fails with
//! [`IdentityError::Uninitialized`] instead of returning a placeholder.
//!
//! The [`DeviceIdentifier`] type covers the `displayName|persistentId`
//! string exchanged as an endpoint name during link discovery.

pub mod device;
pub mod error;
pub mod identity;

pub use device::{DeviceIdentifier, DEVICE_ID_DELIMITER};
pub use error::{IdentityError, IdentityResult};
pub use identity::{generate_persistent_id, NodeIdentity};
