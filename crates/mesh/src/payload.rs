//! Application payloads carried by DATA packets.

use serde::{Deserialize, Serialize};

/// Default `message_type` for mesh-wide broadcasts.
pub const DEFAULT_BROADCAST_TYPE: &str = "BROADCAST";

fn default_broadcast_type() -> String {
    DEFAULT_BROADCAST_TYPE.to_string()
}

/// Closed set of messages the application exchanges over the mesh.
///
/// Tagged by `kind` on the wire; a DATA packet with an unknown kind fails
/// to decode and is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AppPayload {
    /// Direct chat message
    ChatText {
        /// Message body
        text: String,
    },
    /// Mesh-wide announcement
    #[serde(rename_all = "camelCase")]
    Broadcast {
        /// Message body
        text: String,
        /// Announcement category, e.g. `BROADCAST` or `ANNOUNCEMENT`
        #[serde(default = "default_broadcast_type")]
        message_type: String,
    },
    /// Ask the recipient to add the sender as a friend
    #[serde(rename_all = "camelCase")]
    FriendRequest {
        /// Requester's persistent id
        persistent_id: String,
        /// Requester's display name
        display_name: String,
    },
    /// Accept an earlier friend request
    #[serde(rename_all = "camelCase")]
    FriendAccept {
        /// Accepter's persistent id
        persistent_id: String,
        /// Accepter's display name
        display_name: String,
    },
}

impl AppPayload {
    /// Chat message with the given text.
    pub fn chat(text: impl Into<String>) -> Self {
        AppPayload::ChatText { text: text.into() }
    }

    /// Broadcast with the default message type.
    pub fn broadcast(text: impl Into<String>) -> Self {
        AppPayload::Broadcast {
            text: text.into(),
            message_type: default_broadcast_type(),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppPayload::ChatText { .. } => "chat-text",
            AppPayload::Broadcast { .. } => "broadcast",
            AppPayload::FriendRequest { .. } => "friend-request",
            AppPayload::FriendAccept { .. } => "friend-accept",
        }
    }
}
