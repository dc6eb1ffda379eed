//! Device identifier exchanged as the link-layer endpoint name.
//!
//! The wire form is `displayName|persistentId`. Peers running older builds
//! (or other apps) advertise a bare name, which parses as a display name
//! with no persistent id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between display name and persistent id.
pub const DEVICE_ID_DELIMITER: char = '|';

/// Display name plus optional persistent id of a nearby device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentifier {
    pub display_name: String,
    pub persistent_id: Option<String>,
}

impl DeviceIdentifier {
    pub fn new(display_name: impl Into<String>, persistent_id: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            persistent_id: Some(persistent_id.into()),
        }
    }

    /// Split an advertised endpoint name.
    ///
    /// Exactly one delimiter with a non-empty id is required; anything else
    /// degrades to a display-name-only identifier holding the raw string.
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<&str> = raw.split(DEVICE_ID_DELIMITER).collect();
        match parts.as_slice() {
            [name, id] if !id.is_empty() => Self {
                display_name: (*name).to_string(),
                persistent_id: Some((*id).to_string()),
            },
            _ => Self {
                display_name: raw.to_string(),
                persistent_id: None,
            },
        }
    }

    /// Wire form, or just the display name when no id is known.
    pub fn encode(&self) -> String {
        match &self.persistent_id {
            Some(id) => format!("{}{}{}", self.display_name, DEVICE_ID_DELIMITER, id),
            None => self.display_name.clone(),
        }
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
