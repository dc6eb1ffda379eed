//! Mesh node: the coordinator tying transport events to presence and routing.

use crate::application::Application;
use crate::engine::{RoutingEngine, SendOutcome};
use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::{MeshError, MeshResult};
use crate::payload::AppPayload;
use crate::presence::{Observation, PresencePeer, PresenceProtocol};
use crate::routing::Route;
use crate::transport::{LinkEvent, Transport};
use meshage_core::{current_timestamp, MeshConfig};
use meshage_identity::{DeviceIdentifier, NodeIdentity};
use std::sync::Arc;
use tracing::{debug, info};

/// One mesh participant.
///
/// Owns the presence protocol and the routing engine, and is the only
/// place inbound transport traffic enters. Not thread-safe on its own;
/// see [`crate::runtime::MeshRuntime`] for the task that owns it.
pub struct MeshNode {
    identity: Arc<NodeIdentity>,
    engine: RoutingEngine,
    presence: PresenceProtocol,
}

impl MeshNode {
    /// Build a node for an initialized identity.
    pub fn new(
        identity: Arc<NodeIdentity>,
        config: &MeshConfig,
        transport: Arc<dyn Transport>,
        application: Arc<dyn Application>,
    ) -> MeshResult<Self> {
        config
            .validate()
            .map_err(|e| MeshError::Config(e.to_string()))?;

        let persistent_id = identity.get()?.to_string();
        let local_address = config.node.resolved_link_address(&persistent_id);

        let engine = RoutingEngine::new(
            identity.clone(),
            local_address,
            config.node.display_name.clone(),
            &config.routing,
            transport.clone(),
            application,
        )?;
        let presence = PresenceProtocol::new(identity.clone(), transport, config.presence.clone());

        info!(
            %persistent_id,
            local_address = %engine.local_address(),
            display_name = %config.node.display_name,
            "Mesh node created"
        );

        Ok(Self {
            identity,
            engine,
            presence,
        })
    }

    /// Persistent id of this node.
    pub fn local_id(&self) -> &str {
        self.engine.local_id()
    }

    /// Link address of this node.
    pub fn local_address(&self) -> &str {
        self.engine.local_address()
    }

    /// Shared identity.
    pub fn identity(&self) -> &Arc<NodeIdentity> {
        &self.identity
    }

    /// `displayName|persistentId` to advertise as the link endpoint name.
    pub fn device_identifier(&self) -> DeviceIdentifier {
        DeviceIdentifier::new(self.engine.display_name(), self.engine.local_id())
    }

    /// Feed one transport event.
    pub fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Up { address, endpoint_name } => {
                let device = endpoint_name.as_deref().map(DeviceIdentifier::parse);
                let persistent_id = device.as_ref().and_then(|d| d.persistent_id.as_deref());
                debug!(%address, ?persistent_id, "Link up");
                self.engine.add_connected_peer(&address, persistent_id);
            }
            LinkEvent::Down { address } => {
                debug!(%address, "Link down");
                self.engine.link_down(&address);
            }
            LinkEvent::Received { from, bytes } => self.handle_bytes(&from, &bytes),
        }
    }

    fn handle_bytes(&mut self, from: &str, bytes: &[u8]) {
        let envelope = match Envelope::from_bytes(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(%from, error = %e, "Dropping undecodable message");
                return;
            }
        };
        if envelope.node_id == self.engine.local_id() {
            debug!(%from, "Dropping own message");
            return;
        }

        let now = current_timestamp();
        let observation = if envelope.is_presence() {
            self.presence.handle_envelope(&envelope, from, now)
        } else {
            self.presence.observe(&envelope, from, now)
        };
        if observation != Observation::Own {
            self.engine.learn_neighbor(from, &envelope.node_id);
        }

        if envelope.kind != EnvelopeKind::Data {
            return;
        }
        match envelope.packet() {
            Ok(packet) => self.engine.handle_incoming(packet),
            Err(e) => debug!(%from, error = %e, "Dropping malformed routing packet"),
        }
    }

    /// Send a message to one node. See [`RoutingEngine::send_data`].
    pub fn send_data(&mut self, destination_id: &str, payload: AppPayload) -> SendOutcome {
        self.engine.send_data(destination_id, payload)
    }

    /// Flood a message to every node.
    pub fn send_broadcast(&mut self, payload: AppPayload) -> SendOutcome {
        self.engine.send_broadcast(payload)
    }

    /// Start presence announcements under `display_name`.
    ///
    /// The name is also stamped on DATA packets originated afterwards.
    pub fn start_presence(&mut self, display_name: &str) {
        self.engine.set_display_name(display_name);
        self.presence.start(display_name);
    }

    /// Stop presence announcements.
    pub fn stop_presence(&mut self) {
        self.presence.stop();
    }

    /// Whether presence is announcing.
    pub fn is_presence_running(&self) -> bool {
        self.presence.is_running()
    }

    /// Presence timer callback.
    pub fn presence_tick(&mut self, now: u64) {
        self.presence.tick(now);
    }

    /// Route sweep timer callback.
    pub fn sweep_routes(&mut self, now: u64) -> Vec<String> {
        self.engine.sweep_routes(now)
    }

    /// Request-cache timer callback.
    pub fn clear_request_cache(&mut self) -> usize {
        self.engine.clear_request_cache()
    }

    /// Broadcast-cache timer callback.
    pub fn clear_broadcast_cache(&mut self) -> usize {
        self.engine.clear_broadcast_cache()
    }

    /// Routing table snapshot sorted by destination.
    pub fn routing_table(&self) -> Vec<Route> {
        self.engine.routing_table()
    }

    /// Presence view sorted by node id.
    pub fn presence_peers(&self) -> Vec<PresencePeer> {
        self.presence.peers()
    }

    /// Directly linked addresses, sorted.
    pub fn connected_peers(&self) -> Vec<String> {
        self.engine.connected_peers()
    }

    /// Routing engine, for inspection.
    pub fn engine(&self) -> &RoutingEngine {
        &self.engine
    }

    /// Presence protocol, for inspection.
    pub fn presence(&self) -> &PresenceProtocol {
        &self.presence
    }
}
