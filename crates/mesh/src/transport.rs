//! Link transport boundary.
//!
//! The transport moves opaque bytes between physically adjacent devices.
//! The mesh only ever asks it to send to one link address or to every
//! link, and consumes [`LinkEvent`]s in the other direction. Advertising,
//! connection acceptance and retries all live below this line.

use thiserror::Error;

pub mod memory;

pub use memory::{Frame, MemoryHub, MemoryTransport};

/// Transport failures reported back to the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No live link to the address
    #[error("Link to {address} is down")]
    LinkDown {
        /// Unreachable link address
        address: String,
    },

    /// The transport has shut down
    #[error("Transport closed")]
    Closed,
}

/// Outbound half of the link transport.
///
/// Sends are fire-and-forget: `Ok` means the bytes were handed to the link
/// layer, not that they arrived.
pub trait Transport: Send + Sync {
    /// Send bytes to one directly linked device.
    fn send_to_link(&self, address: &str, bytes: &[u8]) -> Result<(), TransportError>;

    /// Send bytes to every directly linked device.
    fn broadcast(&self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Inbound events from the link transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A direct link came up
    Up {
        /// Link address of the peer
        address: String,
        /// Advertised endpoint name, `displayName|persistentId` when known
        endpoint_name: Option<String>,
    },
    /// A direct link went away
    Down {
        /// Link address of the peer
        address: String,
    },
    /// Bytes arrived on a link
    Received {
        /// Link address the bytes arrived from
        from: String,
        /// Raw message
        bytes: Vec<u8>,
    },
}
