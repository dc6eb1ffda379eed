//! Application boundary: where delivered messages and routing diagnostics go.

use crate::payload::AppPayload;
use crate::routing::Route;
use tokio::sync::mpsc;

/// Callbacks the mesh invokes on its host.
///
/// Called synchronously from packet handling, so implementations must not
/// block.
pub trait Application: Send + Sync {
    /// A DATA packet addressed to this node (or broadcast) was delivered.
    fn on_data(&self, source_id: &str, payload: &AppPayload, sender_display_name: &str);

    /// The routing table changed; `snapshot` is sorted by destination.
    fn on_routing_table(&self, _snapshot: &[Route]) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullApplication;

impl Application for NullApplication {
    fn on_data(&self, _source_id: &str, _payload: &AppPayload, _sender_display_name: &str) {}
}

/// Events forwarded by [`ChannelApplication`].
#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent {
    /// A message was delivered locally
    Delivered {
        /// Originator's persistent id
        source_id: String,
        /// Message content
        payload: AppPayload,
        /// Originator's display name
        sender_display_name: String,
    },
    /// Routing table snapshot after a change
    RoutingTable(Vec<Route>),
}

/// Forwards callbacks into an unbounded channel for async consumers.
#[derive(Debug, Clone)]
pub struct ChannelApplication {
    tx: mpsc::UnboundedSender<MeshEvent>,
}

impl ChannelApplication {
    /// Create the sink and the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MeshEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Application for ChannelApplication {
    fn on_data(&self, source_id: &str, payload: &AppPayload, sender_display_name: &str) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(MeshEvent::Delivered {
            source_id: source_id.to_string(),
            payload: payload.clone(),
            sender_display_name: sender_display_name.to_string(),
        });
    }

    fn on_routing_table(&self, snapshot: &[Route]) {
        let _ = self.tx.send(MeshEvent::RoutingTable(snapshot.to_vec()));
    }
}
