//! Presence heartbeat.
//!
//! While running, the node announces itself with a `DISCOVER` broadcast on
//! every tick and forgets peers it has not heard from within the liveness
//! window. A `DISCOVER` from someone else is answered with a unicast
//! `RESPONSE` on the link it arrived on.

use crate::envelope::{Envelope, EnvelopeKind};
use crate::transport::Transport;
use meshage_core::time::age_ms;
use meshage_core::PresenceSettings;
use meshage_identity::NodeIdentity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Presence lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    /// No announcements, no purging
    Stopped,
    /// Announcing on every tick
    Running,
}

/// A node heard from recently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePeer {
    /// Persistent id of the peer
    pub node_id: String,
    /// Session id of its current process
    pub session_id: String,
    /// Link the latest message arrived on
    pub link_address: String,
    /// Time of the latest message (Unix epoch milliseconds)
    pub last_seen: u64,
}

/// What [`PresenceProtocol::observe`] learned from an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Our own message, ignored
    Own,
    /// First message from this node
    NewPeer,
    /// Known node, new session id
    Restarted,
    /// Known node, same session
    Refreshed,
}

/// Presence announcer and liveness tracker.
pub struct PresenceProtocol {
    identity: Arc<NodeIdentity>,
    transport: Arc<dyn Transport>,
    settings: PresenceSettings,
    state: PresenceState,
    display_name: String,
    peers: HashMap<String, PresencePeer>,
}

impl PresenceProtocol {
    /// Create a stopped protocol.
    pub fn new(identity: Arc<NodeIdentity>, transport: Arc<dyn Transport>, settings: PresenceSettings) -> Self {
        Self {
            identity,
            transport,
            settings,
            state: PresenceState::Stopped,
            display_name: String::new(),
            peers: HashMap::new(),
        }
    }

    /// Start announcing. Calling it again only updates the display name.
    pub fn start(&mut self, display_name: impl Into<String>) {
        self.display_name = display_name.into();
        if self.state == PresenceState::Running {
            debug!(display_name = %self.display_name, "Presence already running");
            return;
        }
        self.state = PresenceState::Running;
        info!(display_name = %self.display_name, "Presence started");
    }

    /// Stop announcing. Known peers are kept.
    pub fn stop(&mut self) {
        if self.state == PresenceState::Stopped {
            return;
        }
        self.state = PresenceState::Stopped;
        info!("Presence stopped");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PresenceState {
        self.state
    }

    /// Whether announcements are being sent.
    pub fn is_running(&self) -> bool {
        self.state == PresenceState::Running
    }

    /// Display name given to the last `start`.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Periodic work: announce, then purge silent peers. No-op while stopped.
    pub fn tick(&mut self, now: u64) {
        if !self.is_running() {
            return;
        }
        self.announce();
        self.purge(now);
    }

    fn announce(&self) {
        let bytes = match Envelope::discover(&self.identity).and_then(|envelope| envelope.to_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Cannot announce presence");
                return;
            }
        };
        match self.transport.broadcast(&bytes) {
            Ok(()) => debug!("DISCOVER broadcast"),
            Err(e) => warn!(error = %e, "DISCOVER broadcast failed"),
        }
    }

    /// Drop peers silent for longer than the liveness window. Returns their ids.
    pub fn purge(&mut self, now: u64) -> Vec<String> {
        let timeout = self.settings.peer_timeout_ms;
        let mut stale: Vec<String> = self
            .peers
            .values()
            .filter(|peer| age_ms(now, peer.last_seen) > timeout)
            .map(|peer| peer.node_id.clone())
            .collect();
        stale.sort();
        for node_id in &stale {
            self.peers.remove(node_id);
            info!(%node_id, "Peer timed out");
        }
        stale
    }

    /// Refresh the sender of any envelope that arrived on `from`.
    pub fn observe(&mut self, envelope: &Envelope, from: &str, now: u64) -> Observation {
        if self.is_own(envelope) {
            return Observation::Own;
        }

        match self.peers.get_mut(&envelope.node_id) {
            Some(peer) => {
                let restarted = peer.session_id != envelope.session_id;
                if restarted {
                    info!(
                        node_id = %envelope.node_id,
                        old_session = %peer.session_id,
                        new_session = %envelope.session_id,
                        "Peer restarted"
                    );
                    peer.session_id = envelope.session_id.clone();
                }
                peer.link_address = from.to_string();
                peer.last_seen = now;
                if restarted {
                    Observation::Restarted
                } else {
                    Observation::Refreshed
                }
            }
            None => {
                info!(node_id = %envelope.node_id, link = %from, "Peer discovered");
                self.peers.insert(
                    envelope.node_id.clone(),
                    PresencePeer {
                        node_id: envelope.node_id.clone(),
                        session_id: envelope.session_id.clone(),
                        link_address: from.to_string(),
                        last_seen: now,
                    },
                );
                Observation::NewPeer
            }
        }
    }

    /// Handle a `DISCOVER` or `RESPONSE` envelope.
    ///
    /// A `DISCOVER` is answered even while stopped, so a node that is not
    /// announcing can still be found.
    pub fn handle_envelope(&mut self, envelope: &Envelope, from: &str, now: u64) -> Observation {
        let observation = self.observe(envelope, from, now);
        if observation == Observation::Own || envelope.kind != EnvelopeKind::Discover {
            return observation;
        }

        let bytes = match Envelope::response(&self.identity).and_then(|response| response.to_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Cannot answer DISCOVER");
                return observation;
            }
        };
        match self.transport.send_to_link(from, &bytes) {
            Ok(()) => debug!(link = %from, "RESPONSE sent"),
            Err(e) => warn!(link = %from, error = %e, "RESPONSE send failed"),
        }
        observation
    }

    fn is_own(&self, envelope: &Envelope) -> bool {
        self.identity.try_get() == Some(envelope.node_id.as_str())
    }

    /// Known peer by persistent id.
    pub fn peer(&self, node_id: &str) -> Option<&PresencePeer> {
        self.peers.get(node_id)
    }

    /// Known peers sorted by node id.
    pub fn peers(&self) -> Vec<PresencePeer> {
        let mut peers: Vec<PresencePeer> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        peers
    }

    /// Number of known peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}
