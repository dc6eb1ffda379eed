//! Configuration management for Meshage.
//!
//! All timing values are in milliseconds. Every field has a default so a
//! partial TOML file (or none at all) yields a working node.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Who this node is
    pub node: NodeSettings,
    /// Presence heartbeat
    pub presence: PresenceSettings,
    /// Route lifetime and cache clearing
    pub routing: RoutingSettings,
}

/// Identity bootstrap values supplied by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Durable id; generated by the host when absent.
    pub persistent_id: Option<String>,
    pub display_name: String,
    /// Link-layer handle other devices use to reach this one.
    pub link_address: Option<String>,
}

/// Presence heartbeat timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    /// Period between `DISCOVER` announcements
    pub announce_interval_ms: u64,
    /// Silence after which a peer is forgotten
    pub peer_timeout_ms: u64,
}

/// Routing engine timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Age at which a route stops being used
    pub route_timeout_ms: u64,
    pub route_sweep_interval_ms: u64,
    pub request_cache_clear_ms: u64,
    pub broadcast_cache_clear_ms: u64,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            persistent_id: None,
            display_name: "User".to_string(),
            link_address: None,
        }
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            announce_interval_ms: 3_000,
            peer_timeout_ms: 10_000,
        }
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            route_timeout_ms: 5 * 60 * 1000,
            route_sweep_interval_ms: 60 * 1000,
            request_cache_clear_ms: 30 * 1000,
            broadcast_cache_clear_ms: 30 * 1000,
        }
    }
}

impl NodeSettings {
    /// Link address to advertise, falling back to `device_<last 8 chars of id>`.
    pub fn resolved_link_address(&self, persistent_id: &str) -> String {
        if let Some(address) = &self.link_address {
            return address.clone();
        }
        let chars: Vec<char> = persistent_id.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(8)..].iter().collect();
        format!("device_{}", tail)
    }
}

impl PresenceSettings {
    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }
}

impl RoutingSettings {
    pub fn route_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.route_sweep_interval_ms)
    }

    pub fn request_cache_clear_interval(&self) -> Duration {
        Duration::from_millis(self.request_cache_clear_ms)
    }

    pub fn broadcast_cache_clear_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_cache_clear_ms)
    }
}

impl MeshConfig {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(CoreError::Io)?;
        Self::from_toml_str(&content)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    /// Reject zero periods; timers cannot tick at a zero interval.
    pub fn validate(&self) -> Result<(), CoreError> {
        let periods = [
            ("presence.announce_interval_ms", self.presence.announce_interval_ms),
            ("presence.peer_timeout_ms", self.presence.peer_timeout_ms),
            ("routing.route_timeout_ms", self.routing.route_timeout_ms),
            ("routing.route_sweep_interval_ms", self.routing.route_sweep_interval_ms),
            ("routing.request_cache_clear_ms", self.routing.request_cache_clear_ms),
            ("routing.broadcast_cache_clear_ms", self.routing.broadcast_cache_clear_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(CoreError::Config(format!("{} must be greater than zero", name)));
            }
        }
        if self.node.persistent_id.as_deref() == Some("") {
            return Err(CoreError::Config("node.persistent_id must not be empty".to_string()));
        }
        Ok(())
    }
}
