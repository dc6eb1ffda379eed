//! Meshage Mesh - on-demand routing for device-to-device messaging
//!
//! Moves messages across a multi-hop mesh of devices that are only
//! directly linked to their physical neighbors. Routes are discovered on
//! demand and expire on their own.
//!
//! # Core Components
//!
//! - **Presence**: periodic `DISCOVER` announcements and a liveness view of nearby nodes
//! - **Routing Engine**: RREQ / RREP / RERR route discovery and hop-by-hop DATA forwarding
//! - **Mesh Node**: decodes transport traffic and dispatches it to presence and routing
//! - **Runtime**: a tokio task that owns a node and drives its timers
//! - **Memory Transport**: an in-process link layer for simulation and tests
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use meshage_core::MeshConfig;
//! use meshage_identity::NodeIdentity;
//! use meshage_mesh::{AppPayload, MemoryHub, MeshNode, NullApplication};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = MemoryHub::new();
//! let mut config = MeshConfig::default();
//! config.node.link_address = Some("addr-x".to_string());
//!
//! let identity = Arc::new(NodeIdentity::with_persistent_id("node-x")?);
//! let mut node = MeshNode::new(
//!     identity,
//!     &config,
//!     Arc::new(hub.endpoint("addr-x")),
//!     Arc::new(NullApplication),
//! )?;
//!
//! node.start_presence("Xavier");
//! let outcome = node.send_data("node-z", AppPayload::chat("hi"));
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod application;
pub mod cache;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod node;
pub mod packet;
pub mod payload;
pub mod presence;
pub mod routing;
pub mod runtime;
pub mod transport;

// Re-export main types
pub use application::{Application, ChannelApplication, MeshEvent, NullApplication};
pub use cache::SeenCache;
pub use engine::{RoutingEngine, SendOutcome};
pub use envelope::{Envelope, EnvelopeKind};
pub use error::{MeshError, MeshResult};
pub use node::MeshNode;
pub use packet::{DataPacket, Packet, RouteError, RouteReply, RouteRequest, BROADCAST};
pub use payload::AppPayload;
pub use presence::{Observation, PresencePeer, PresenceProtocol, PresenceState};
pub use routing::{ReverseRoute, ReverseRouteTable, Route, RoutingTable};
pub use runtime::{MeshCommand, MeshHandle, MeshRuntime};
pub use transport::{Frame, LinkEvent, MemoryHub, MemoryTransport, Transport, TransportError};
