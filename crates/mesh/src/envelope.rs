//! Node message envelope: the outer record of every transport message.
//!
//! Presence traffic (`DISCOVER` / `RESPONSE`) and routing traffic (`DATA`,
//! whose payload is a [`Packet`]) share one transport stream. `nodeId` is
//! always the node that emitted these bytes onto the link, not the packet's
//! originator, so the self-filter only catches our own frames.

use crate::error::{MeshError, MeshResult};
use crate::packet::Packet;
use meshage_identity::NodeIdentity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeKind {
    /// Periodic presence announcement
    Discover,
    /// Unicast answer to a `Discover`
    Response,
    /// Carries one routing packet
    Data,
}

/// One transport message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Persistent id of the emitting node
    pub node_id: String,
    /// Session id of the emitting node
    pub session_id: String,
    /// Message kind
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Routing packet for `Data`; ignored otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    fn from_identity(identity: &NodeIdentity, kind: EnvelopeKind, payload: Option<Value>) -> MeshResult<Self> {
        Ok(Self {
            node_id: identity.get()?.to_string(),
            session_id: identity.session_id().to_string(),
            kind,
            payload,
        })
    }

    /// Presence announcement for this node.
    pub fn discover(identity: &NodeIdentity) -> MeshResult<Self> {
        Self::from_identity(identity, EnvelopeKind::Discover, None)
    }

    /// Presence answer for this node.
    pub fn response(identity: &NodeIdentity) -> MeshResult<Self> {
        Self::from_identity(identity, EnvelopeKind::Response, None)
    }

    /// Wrap a routing packet.
    pub fn data(identity: &NodeIdentity, packet: &Packet) -> MeshResult<Self> {
        let payload = serde_json::to_value(packet)?;
        Self::from_identity(identity, EnvelopeKind::Data, Some(payload))
    }

    /// Decode and validate inbound bytes.
    pub fn from_bytes(bytes: &[u8]) -> MeshResult<Self> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        if envelope.node_id.is_empty() || envelope.session_id.is_empty() {
            return Err(MeshError::MalformedEnvelope(
                "missing nodeId or sessionId".to_string(),
            ));
        }
        Ok(envelope)
    }

    /// Encode for the transport.
    pub fn to_bytes(&self) -> MeshResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Whether this is a presence message.
    pub fn is_presence(&self) -> bool {
        matches!(self.kind, EnvelopeKind::Discover | EnvelopeKind::Response)
    }

    /// Decode the carried routing packet of a `Data` envelope.
    pub fn packet(&self) -> MeshResult<Packet> {
        match (&self.kind, &self.payload) {
            (EnvelopeKind::Data, Some(value)) => Ok(Packet::deserialize(value)?),
            (EnvelopeKind::Data, None) => Err(MeshError::MalformedEnvelope(
                "DATA envelope without payload".to_string(),
            )),
            (kind, _) => Err(MeshError::MalformedEnvelope(format!(
                "{:?} envelope carries no packet",
                kind
            ))),
        }
    }
}
