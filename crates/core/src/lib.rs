//! Core functionality for the Meshage mesh messaging system.
//!
//! This crate provides the configuration, logging, error and clock
//! utilities shared by the identity and mesh crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use config::{MeshConfig, NodeSettings, PresenceSettings, RoutingSettings};
pub use error::{CoreError, Result};
pub use time::current_timestamp;
