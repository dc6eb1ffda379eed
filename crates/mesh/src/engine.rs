//! On-demand routing engine.
//!
//! Routes are discovered only when needed. A node without a route floods a
//! route request (RREQ); every node that sees it for the first time remembers
//! the link it came from (the reverse route) and either answers with a route
//! reply (RREP) or re-floods it. The reply walks the reverse routes back to
//! the requester, installing forward routes at every hop. Broken links are
//! announced with a flooded route error (RERR).
//!
//! Loop freedom rests on two caches of packet ids: one for route requests
//! and one for flooded DATA. Both are cleared wholesale on a timer.
//!
//! All handlers run to completion on the caller's thread and take
//! `&mut self`; sharing an engine between threads is the owner's job
//! (see [`crate::runtime`]).

use crate::application::Application;
use crate::cache::SeenCache;
use crate::envelope::Envelope;
use crate::error::MeshResult;
use crate::packet::{DataPacket, Packet, RouteError, RouteReply, RouteRequest, BROADCAST};
use crate::payload::AppPayload;
use crate::routing::{ReverseRoute, ReverseRouteTable, Route, RoutingTable};
use crate::transport::Transport;
use meshage_core::{current_timestamp, RoutingSettings};
use meshage_identity::NodeIdentity;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to a locally originated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Addressed to this node; delivered without touching the transport
    DeliveredLocally,
    /// Handed to the next hop of a known route
    Forwarded {
        /// Id of the DATA packet
        packet_id: String,
        /// Link address it was sent to
        next_hop: String,
    },
    /// Flooded to every connected peer
    Flooded {
        /// Id of the DATA packet
        packet_id: String,
        /// Number of peers it was handed to
        peers: usize,
    },
    /// No route; a route request was flooded and the message was dropped
    DiscoveryStarted {
        /// Id of the route request
        request_id: String,
    },
    /// The next hop's link failed during the send
    LinkBroken {
        /// Link address that failed
        next_hop: String,
    },
}

/// On-demand routing state machine for one node.
pub struct RoutingEngine {
    identity: Arc<NodeIdentity>,
    local_id: String,
    local_address: String,
    display_name: String,
    transport: Arc<dyn Transport>,
    application: Arc<dyn Application>,
    routes: RoutingTable,
    reverse_routes: ReverseRouteTable,
    seen_requests: SeenCache,
    seen_broadcasts: SeenCache,
    connected_peers: BTreeSet<String>,
}

impl RoutingEngine {
    /// Create an engine for an initialized identity.
    ///
    /// Fails with [`meshage_identity::IdentityError::Uninitialized`] if the
    /// persistent id has not been set.
    pub fn new(
        identity: Arc<NodeIdentity>,
        local_address: impl Into<String>,
        display_name: impl Into<String>,
        settings: &RoutingSettings,
        transport: Arc<dyn Transport>,
        application: Arc<dyn Application>,
    ) -> MeshResult<Self> {
        let local_id = identity.get()?.to_string();
        let local_address = local_address.into();
        info!(%local_id, %local_address, "Routing engine initialized");

        Ok(Self {
            identity,
            local_id,
            local_address,
            display_name: display_name.into(),
            transport,
            application,
            routes: RoutingTable::new(settings.route_timeout_ms),
            reverse_routes: ReverseRouteTable::new(),
            seen_requests: SeenCache::new(),
            seen_broadcasts: SeenCache::new(),
            connected_peers: BTreeSet::new(),
        })
    }

    /// Persistent id of this node.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Link address this node appends to request and reply paths.
    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    /// Display name stamped on originated DATA packets.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Change the display name used for future DATA packets.
    pub fn set_display_name(&mut self, display_name: impl Into<String>) {
        self.display_name = display_name.into();
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Single entry point for decoded routing packets.
    pub fn handle_incoming(&mut self, packet: Packet) {
        debug!(
            kind = packet.kind(),
            packet_id = packet.packet_id(),
            source = packet.source_id(),
            destination = packet.destination_id(),
            "Routing packet received"
        );
        match packet {
            Packet::Data(data) => self.handle_data(data),
            Packet::RouteRequest(request) => self.handle_route_request(request),
            Packet::RouteReply(reply) => self.handle_route_reply(reply),
            Packet::RouteError(route_error) => self.handle_route_error(route_error),
        }
    }

    fn handle_data(&mut self, packet: DataPacket) {
        if packet.is_broadcast() {
            if !self.seen_broadcasts.insert(&packet.packet_id) {
                debug!(packet_id = %packet.packet_id, "Broadcast already seen, discarding");
                return;
            }
            if packet.source_id == self.local_id {
                debug!(packet_id = %packet.packet_id, "Own broadcast reflected back, discarding");
                return;
            }
            self.deliver(&packet);
            // No arrival-link metadata on DATA, so the flood goes to every
            // peer and the cache alone stops the echo.
            self.flood(&Packet::Data(packet), None);
            return;
        }

        if packet.destination_id == self.local_id {
            self.deliver(&packet);
            return;
        }

        let now = current_timestamp();
        match self.routes.find_next_hop(&packet.destination_id, now).map(str::to_string) {
            Some(next_hop) => {
                debug!(
                    packet_id = %packet.packet_id,
                    destination = %packet.destination_id,
                    %next_hop,
                    "Forwarding DATA packet"
                );
                self.unicast(&next_hop, &Packet::Data(packet));
            }
            None => {
                warn!(
                    packet_id = %packet.packet_id,
                    destination = %packet.destination_id,
                    "No route for DATA packet, starting discovery and dropping it"
                );
                self.initiate_route_discovery(&packet.destination_id);
            }
        }
    }

    fn handle_route_request(&mut self, request: RouteRequest) {
        if !self.seen_requests.insert(&request.packet_id) {
            debug!(packet_id = %request.packet_id, "RREQ already seen, discarding");
            return;
        }
        if request.source_id == self.local_id {
            debug!(packet_id = %request.packet_id, "Own RREQ reflected back, discarding");
            return;
        }
        let Some(last_hop) = request.last_hop().map(str::to_string) else {
            debug!(packet_id = %request.packet_id, "RREQ with empty path, discarding");
            return;
        };

        self.reverse_routes.record(
            request.source_id.clone(),
            ReverseRoute {
                next_hop: last_hop.clone(),
                hop_count: request.hop_count,
            },
        );
        debug!(
            origin = %request.source_id,
            via = %last_hop,
            hops = request.hop_count,
            "Recorded reverse route"
        );

        if request.destination_id == self.local_id {
            info!(origin = %request.source_id, "RREQ reached its destination, replying");
            let reply = RouteReply::new(
                self.local_id.clone(),
                request.source_id.clone(),
                1,
                self.local_address.clone(),
            );
            self.send_route_reply(&request.source_id, reply);
            return;
        }

        let now = current_timestamp();
        let relay_route = self
            .routes
            .find(&request.destination_id, now)
            .filter(|route| !route.is_direct)
            .map(|route| route.hop_count);
        if let Some(known_hops) = relay_route {
            // RREP hop counts are distances from the receiver, so the
            // requester's neighbor is one hop further than this node.
            let Some(reply_hops) = known_hops.checked_add(1) else {
                debug!(
                    destination = %request.destination_id,
                    "Known route at hop limit, not answering RREQ"
                );
                return;
            };
            info!(
                origin = %request.source_id,
                destination = %request.destination_id,
                known_hops,
                "Answering RREQ from the routing table"
            );
            let reply = RouteReply::new(
                request.destination_id.clone(),
                request.source_id.clone(),
                reply_hops,
                self.local_address.clone(),
            );
            self.send_route_reply(&request.source_id, reply);
            return;
        }

        let Some(relayed) = request.relayed(&self.local_address) else {
            debug!(packet_id = %request.packet_id, "RREQ at hop limit, discarding");
            return;
        };
        debug!(
            packet_id = %relayed.packet_id,
            destination = %relayed.destination_id,
            hops = relayed.hop_count,
            "Re-flooding RREQ"
        );
        self.flood(&Packet::RouteRequest(relayed), Some(&last_hop));
    }

    fn handle_route_reply(&mut self, reply: RouteReply) {
        let Some(last_hop) = reply.last_hop().map(str::to_string) else {
            debug!(packet_id = %reply.packet_id, "RREP with empty path, discarding");
            return;
        };
        if reply.source_id == self.local_id {
            debug!(packet_id = %reply.packet_id, "RREP describing a route to self, discarding");
            return;
        }

        let route = Route::new(reply.source_id.clone(), last_hop.clone(), reply.hop_count, current_timestamp());
        info!(
            destination = %route.destination,
            next_hop = %route.next_hop,
            hops = route.hop_count,
            "Installed route"
        );
        self.routes.install(route);
        self.notify_routing_table();

        if reply.destination_id == self.local_id {
            info!(destination = %reply.source_id, "Route discovery complete");
            return;
        }

        let Some(reverse) = self.reverse_routes.get(&reply.destination_id).cloned() else {
            warn!(
                requester = %reply.destination_id,
                "No reverse route to forward RREP, dropping"
            );
            return;
        };
        let Some(relayed) = reply.relayed(&self.local_address) else {
            debug!(packet_id = %reply.packet_id, "RREP at hop limit, discarding");
            return;
        };
        debug!(
            requester = %relayed.destination_id,
            via = %reverse.next_hop,
            hops = relayed.hop_count,
            "Forwarding RREP"
        );
        self.unicast(&reverse.next_hop, &Packet::RouteReply(relayed));
    }

    fn handle_route_error(&mut self, route_error: RouteError) {
        let (a, b) = &route_error.broken_link;
        let removed = self.routes.remove_via(&[a.as_str(), b.as_str()]);
        if removed.is_empty() {
            debug!(link_a = %a, link_b = %b, "RERR affects no local routes");
            return;
        }

        info!(
            link_a = %a,
            link_b = %b,
            removed = ?removed,
            "Removed routes over broken link"
        );
        self.notify_routing_table();
        self.flood(&Packet::RouteError(route_error), None);
    }

    // ------------------------------------------------------------------
    // Host operations
    // ------------------------------------------------------------------

    /// Send `payload` to `destination_id`.
    ///
    /// Without a live route the message is dropped and a discovery is
    /// started; the caller resends once a route exists.
    pub fn send_data(&mut self, destination_id: &str, payload: AppPayload) -> SendOutcome {
        if destination_id == BROADCAST {
            return self.send_broadcast(payload);
        }

        let packet = DataPacket::new(
            self.local_id.clone(),
            destination_id,
            payload,
            self.display_name.clone(),
        );
        if destination_id == self.local_id {
            self.deliver(&packet);
            return SendOutcome::DeliveredLocally;
        }

        let now = current_timestamp();
        match self.routes.find_next_hop(destination_id, now).map(str::to_string) {
            Some(next_hop) => {
                let packet_id = packet.packet_id.clone();
                if self.unicast(&next_hop, &Packet::Data(packet)) {
                    SendOutcome::Forwarded { packet_id, next_hop }
                } else {
                    SendOutcome::LinkBroken { next_hop }
                }
            }
            None => SendOutcome::DiscoveryStarted {
                request_id: self.initiate_route_discovery(destination_id),
            },
        }
    }

    /// Flood `payload` to the whole mesh.
    pub fn send_broadcast(&mut self, payload: AppPayload) -> SendOutcome {
        let packet = DataPacket::new(
            self.local_id.clone(),
            BROADCAST,
            payload,
            self.display_name.clone(),
        );
        let packet_id = packet.packet_id.clone();
        self.seen_broadcasts.insert(&packet_id);
        info!(%packet_id, kind = packet.payload.kind(), "Broadcasting message");
        let peers = self.flood(&Packet::Data(packet), None);
        SendOutcome::Flooded { packet_id, peers }
    }

    /// Flood a fresh route request for `destination_id`. Returns its id.
    ///
    /// Concurrent discoveries for the same destination are not merged.
    pub fn initiate_route_discovery(&mut self, destination_id: &str) -> String {
        let request = RouteRequest::new(
            self.local_id.clone(),
            destination_id,
            self.local_address.clone(),
        );
        let request_id = request.packet_id.clone();
        self.seen_requests.insert(&request_id);
        info!(%request_id, destination = %destination_id, "Starting route discovery");
        self.flood(&Packet::RouteRequest(request), None);
        request_id
    }

    // ------------------------------------------------------------------
    // Link management
    // ------------------------------------------------------------------

    /// A direct link came up; install a direct route when the peer's id is known.
    pub fn add_connected_peer(&mut self, address: &str, persistent_id: Option<&str>) {
        if self.connected_peers.insert(address.to_string()) {
            info!(%address, "Peer connected");
        }
        if let Some(persistent_id) = persistent_id {
            self.install_direct_route(address, persistent_id);
        }
    }

    /// Identity learned for a linked peer (from presence traffic).
    ///
    /// Ignored unless `address` is currently connected.
    pub fn learn_neighbor(&mut self, address: &str, persistent_id: &str) {
        if !self.connected_peers.contains(address) {
            return;
        }
        self.install_direct_route(address, persistent_id);
    }

    fn install_direct_route(&mut self, address: &str, persistent_id: &str) {
        if persistent_id == self.local_id {
            return;
        }
        let route = Route::direct(persistent_id, address, current_timestamp());
        let previous = self.routes.install(route);
        let changed = previous
            .map(|old| old.next_hop != address || !old.is_direct)
            .unwrap_or(true);
        if changed {
            info!(destination = %persistent_id, %address, "Installed direct route");
            self.notify_routing_table();
        }
    }

    /// A direct link went down.
    ///
    /// Treated as a locally detected breakage: one RERR is originated,
    /// unless the link was already handled.
    pub fn link_down(&mut self, address: &str) {
        let known = self.connected_peers.contains(address) || self.routes.uses_next_hop(address);
        if !known {
            debug!(%address, "Link down for unknown peer, ignoring");
            return;
        }
        self.handle_broken_link(address);
    }

    fn handle_broken_link(&mut self, address: &str) {
        warn!(%address, "Detected broken link");
        self.connected_peers.remove(address);

        let removed = self.routes.remove_via(&[address]);
        if !removed.is_empty() {
            info!(%address, removed = ?removed, "Removed routes over broken link");
            self.notify_routing_table();
        }

        let route_error = RouteError::new(self.local_id.clone(), &self.local_address, address);
        info!(packet_id = %route_error.packet_id, %address, "Originating RERR");
        self.flood(&Packet::RouteError(route_error), None);
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Delete routes older than the timeout. Returns the expired destinations.
    pub fn sweep_routes(&mut self, now: u64) -> Vec<String> {
        let expired = self.routes.prune_stale_routes(now);
        if !expired.is_empty() {
            info!(expired = ?expired, "Expired routes removed");
            self.notify_routing_table();
        }
        expired
    }

    /// Forget all seen route request ids.
    pub fn clear_request_cache(&mut self) -> usize {
        let cleared = self.seen_requests.clear();
        debug!(cleared, "Cleared RREQ cache");
        cleared
    }

    /// Forget all seen broadcast ids.
    pub fn clear_broadcast_cache(&mut self) -> usize {
        let cleared = self.seen_broadcasts.clear();
        debug!(cleared, "Cleared broadcast cache");
        cleared
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Routing table snapshot sorted by destination.
    pub fn routing_table(&self) -> Vec<Route> {
        self.routes.snapshot()
    }

    /// Live route to `destination`.
    pub fn route(&self, destination: &str) -> Option<&Route> {
        self.routes.find(destination, current_timestamp())
    }

    /// Recorded way back to `origin`.
    pub fn reverse_route(&self, origin: &str) -> Option<&ReverseRoute> {
        self.reverse_routes.get(origin)
    }

    /// Reverse routes sorted by origin.
    pub fn reverse_routes(&self) -> Vec<(String, ReverseRoute)> {
        self.reverse_routes.snapshot()
    }

    /// Directly linked peer addresses, sorted.
    pub fn connected_peers(&self) -> Vec<String> {
        self.connected_peers.iter().cloned().collect()
    }

    /// Whether `address` is directly linked.
    pub fn is_connected(&self, address: &str) -> bool {
        self.connected_peers.contains(address)
    }

    /// Whether a route request id is in the dedup cache.
    pub fn has_seen_request(&self, packet_id: &str) -> bool {
        self.seen_requests.contains(packet_id)
    }

    /// Whether a broadcast id is in the dedup cache.
    pub fn has_seen_broadcast(&self, packet_id: &str) -> bool {
        self.seen_broadcasts.contains(packet_id)
    }

    // ------------------------------------------------------------------
    // Transmission
    // ------------------------------------------------------------------

    fn deliver(&self, packet: &DataPacket) {
        info!(
            packet_id = %packet.packet_id,
            from = %packet.sender_display_name,
            kind = packet.payload.kind(),
            "DATA packet delivered"
        );
        self.application
            .on_data(&packet.source_id, &packet.payload, &packet.sender_display_name);
    }

    fn notify_routing_table(&self) {
        self.application.on_routing_table(&self.routes.snapshot());
    }

    fn send_route_reply(&mut self, requester: &str, reply: RouteReply) {
        match self.reverse_routes.get(requester).map(|reverse| reverse.next_hop.clone()) {
            Some(next_hop) => {
                debug!(%requester, %next_hop, hops = reply.hop_count, "Sending RREP");
                self.unicast(&next_hop, &Packet::RouteReply(reply));
            }
            None => warn!(%requester, "No reverse route for RREP, dropping"),
        }
    }

    fn encode(&self, packet: &Packet) -> Option<Vec<u8>> {
        match Envelope::data(&self.identity, packet).and_then(|envelope| envelope.to_bytes()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!(kind = packet.kind(), error = %e, "Failed to encode packet");
                None
            }
        }
    }

    /// Send to one connected peer. A failure is handled as link breakage.
    fn unicast(&mut self, address: &str, packet: &Packet) -> bool {
        if !self.connected_peers.contains(address) {
            warn!(%address, kind = packet.kind(), "Next hop is not a connected peer");
            self.handle_broken_link(address);
            return false;
        }
        let Some(bytes) = self.encode(packet) else {
            return false;
        };
        match self.transport.send_to_link(address, &bytes) {
            Ok(()) => {
                debug!(%address, kind = packet.kind(), "Packet sent");
                true
            }
            Err(e) => {
                warn!(%address, kind = packet.kind(), error = %e, "Send failed");
                self.handle_broken_link(address);
                false
            }
        }
    }

    /// Send to every connected peer except `exclude`. Returns how many accepted it.
    fn flood(&mut self, packet: &Packet, exclude: Option<&str>) -> usize {
        let Some(bytes) = self.encode(packet) else {
            return 0;
        };
        let targets: Vec<String> = self
            .connected_peers
            .iter()
            .filter(|address| Some(address.as_str()) != exclude)
            .cloned()
            .collect();

        let mut sent = 0;
        let mut broken = Vec::new();
        for address in targets {
            match self.transport.send_to_link(&address, &bytes) {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(%address, kind = packet.kind(), error = %e, "Flood send failed");
                    broken.push(address);
                }
            }
        }
        debug!(kind = packet.kind(), sent, excluded = ?exclude, "Flooded packet");

        for address in broken {
            self.handle_broken_link(&address);
        }
        sent
    }
}
