//! Routing packet model.
//!
//! Four packet kinds share a common header (`packetId`, `sourceId`,
//! `destinationId`, `timestamp`) and are tagged on the wire by `type`:
//!
//! | tag    | purpose                                         | delivery        |
//! |--------|-------------------------------------------------|-----------------|
//! | `DATA` | application payload                             | unicast / flood |
//! | `RREQ` | route request, collects the traversed path      | flood           |
//! | `RREP` | route reply, walks the reverse path back        | unicast         |
//! | `RERR` | a link between two addresses broke              | flood           |

use crate::payload::AppPayload;
use meshage_core::current_timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved destination id for mesh-wide DATA and RERR floods.
pub const BROADCAST: &str = "BROADCAST";

/// Generate a packet id unique per origination.
pub fn new_packet_id(prefix: &str) -> String {
    format!("{}-{}-{}", prefix, current_timestamp(), Uuid::new_v4().simple())
}

/// A routing-layer packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Packet {
    /// End-user or control message
    #[serde(rename = "DATA")]
    Data(DataPacket),
    /// Route request
    #[serde(rename = "RREQ")]
    RouteRequest(RouteRequest),
    /// Route reply
    #[serde(rename = "RREP")]
    RouteReply(RouteReply),
    /// Route error
    #[serde(rename = "RERR")]
    RouteError(RouteError),
}

/// Application message addressed to one node or to [`BROADCAST`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPacket {
    /// Unique id of this origination
    pub packet_id: String,
    /// Persistent id of the originator
    pub source_id: String,
    /// Persistent id of the recipient, or [`BROADCAST`]
    pub destination_id: String,
    /// Origination time (Unix epoch milliseconds)
    pub timestamp: u64,
    /// Message content
    pub payload: AppPayload,
    /// Originator's human-readable name
    #[serde(alias = "senderName")]
    pub sender_display_name: String,
}

/// Flooded request for a route to `destination_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    /// Unique id used for flood deduplication
    pub packet_id: String,
    /// Persistent id of the node looking for a route
    pub source_id: String,
    /// Persistent id being looked for
    pub destination_id: String,
    /// Origination time (Unix epoch milliseconds)
    pub timestamp: u64,
    /// Relays traversed so far
    pub hop_count: u32,
    /// Link addresses traversed, originator first
    pub path: Vec<String>,
}

/// Reply carrying a route back toward the requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteReply {
    /// Unique id of this reply
    pub packet_id: String,
    /// Persistent id the route leads to
    pub source_id: String,
    /// Persistent id of the original requester
    pub destination_id: String,
    /// Origination time (Unix epoch milliseconds)
    pub timestamp: u64,
    /// Distance from the receiving node to `source_id`
    pub hop_count: u32,
    /// Link addresses traversed, replier first
    pub path: Vec<String>,
}

/// Notification that the link between two addresses failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteError {
    /// Unique id of this error report
    pub packet_id: String,
    /// Persistent id of the node that detected the break
    pub source_id: String,
    /// Always [`BROADCAST`]
    pub destination_id: String,
    /// Origination time (Unix epoch milliseconds)
    pub timestamp: u64,
    /// The two link addresses whose connection broke
    pub broken_link: (String, String),
}

impl Packet {
    /// Id shared by every copy of this packet.
    pub fn packet_id(&self) -> &str {
        match self {
            Packet::Data(p) => &p.packet_id,
            Packet::RouteRequest(p) => &p.packet_id,
            Packet::RouteReply(p) => &p.packet_id,
            Packet::RouteError(p) => &p.packet_id,
        }
    }

    /// Originator's persistent id (for RREP, the node the route leads to).
    pub fn source_id(&self) -> &str {
        match self {
            Packet::Data(p) => &p.source_id,
            Packet::RouteRequest(p) => &p.source_id,
            Packet::RouteReply(p) => &p.source_id,
            Packet::RouteError(p) => &p.source_id,
        }
    }

    /// Recipient's persistent id or [`BROADCAST`].
    pub fn destination_id(&self) -> &str {
        match self {
            Packet::Data(p) => &p.destination_id,
            Packet::RouteRequest(p) => &p.destination_id,
            Packet::RouteReply(p) => &p.destination_id,
            Packet::RouteError(p) => &p.destination_id,
        }
    }

    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Data(_) => "DATA",
            Packet::RouteRequest(_) => "RREQ",
            Packet::RouteReply(_) => "RREP",
            Packet::RouteError(_) => "RERR",
        }
    }
}

impl DataPacket {
    /// Originate a DATA packet.
    pub fn new(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        payload: AppPayload,
        sender_display_name: impl Into<String>,
    ) -> Self {
        let destination_id = destination_id.into();
        let prefix = if destination_id == BROADCAST { "broadcast" } else { "data" };
        Self {
            packet_id: new_packet_id(prefix),
            source_id: source_id.into(),
            destination_id,
            timestamp: current_timestamp(),
            payload,
            sender_display_name: sender_display_name.into(),
        }
    }

    /// Whether the packet floods the whole mesh.
    pub fn is_broadcast(&self) -> bool {
        self.destination_id == BROADCAST
    }
}

impl RouteRequest {
    /// Originate a request: zero hops, path holding only the originator's address.
    pub fn new(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        origin_address: impl Into<String>,
    ) -> Self {
        Self {
            packet_id: new_packet_id("rreq"),
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            timestamp: current_timestamp(),
            hop_count: 0,
            path: vec![origin_address.into()],
        }
    }

    /// Address of the link this request arrived on.
    pub fn last_hop(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }

    /// Copy for re-flooding: `relay_address` appended once, one more hop.
    ///
    /// `None` when the hop count is already at its limit.
    pub fn relayed(&self, relay_address: &str) -> Option<Self> {
        let mut next = self.clone();
        next.hop_count = self.hop_count.checked_add(1)?;
        next.path.push(relay_address.to_string());
        Some(next)
    }
}

impl RouteReply {
    /// Originate a reply advertising a route to `source_id`.
    pub fn new(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        hop_count: u32,
        origin_address: impl Into<String>,
    ) -> Self {
        Self {
            packet_id: new_packet_id("rrep"),
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            timestamp: current_timestamp(),
            hop_count,
            path: vec![origin_address.into()],
        }
    }

    /// Address of the link this reply arrived on.
    pub fn last_hop(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }

    /// Copy for the next hop back: `relay_address` appended, one more hop.
    ///
    /// `None` when the hop count is already at its limit.
    pub fn relayed(&self, relay_address: &str) -> Option<Self> {
        let mut next = self.clone();
        next.hop_count = self.hop_count.checked_add(1)?;
        next.path.push(relay_address.to_string());
        Some(next)
    }
}

impl RouteError {
    /// Report that the link from `local_address` to `broken_address` failed.
    pub fn new(source_id: impl Into<String>, local_address: &str, broken_address: &str) -> Self {
        Self {
            packet_id: new_packet_id("rerr"),
            source_id: source_id.into(),
            destination_id: BROADCAST.to_string(),
            timestamp: current_timestamp(),
            broken_link: (local_address.to_string(), broken_address.to_string()),
        }
    }
}
