//! Async runtime: one tokio task owns a [`MeshNode`].
//!
//! Transport events, host commands and the four maintenance timers are
//! serialized through the task's mailbox, so the node itself never needs
//! a lock. Handlers run to completion between `select!` polls.

use crate::engine::SendOutcome;
use crate::error::{MeshError, MeshResult};
use crate::node::MeshNode;
use crate::payload::AppPayload;
use crate::presence::PresencePeer;
use crate::routing::Route;
use crate::transport::LinkEvent;
use meshage_core::{current_timestamp, MeshConfig};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Messages accepted by the runtime task.
#[derive(Debug)]
pub enum MeshCommand {
    /// Transport event
    Link(LinkEvent),
    /// Originate a unicast message
    SendData {
        /// Destination persistent id
        destination_id: String,
        /// Message content
        payload: AppPayload,
        /// Receives the outcome
        reply: oneshot::Sender<SendOutcome>,
    },
    /// Originate a broadcast
    SendBroadcast {
        /// Message content
        payload: AppPayload,
        /// Receives the outcome
        reply: oneshot::Sender<SendOutcome>,
    },
    /// Start presence under a display name
    StartPresence(String),
    /// Stop presence
    StopPresence,
    /// Snapshot the routing table
    RoutingTable(oneshot::Sender<Vec<Route>>),
    /// Snapshot the presence view
    PresencePeers(oneshot::Sender<Vec<PresencePeer>>),
    /// Snapshot the connected link addresses
    ConnectedPeers(oneshot::Sender<Vec<String>>),
    /// End the task
    Shutdown,
}

/// Cloneable handle for talking to a running [`MeshRuntime`].
#[derive(Debug, Clone)]
pub struct MeshHandle {
    tx: mpsc::UnboundedSender<MeshCommand>,
}

impl MeshHandle {
    fn submit(&self, command: MeshCommand) -> MeshResult<()> {
        self.tx.send(command).map_err(|_| MeshError::RuntimeStopped)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> MeshCommand) -> MeshResult<T> {
        let (reply, rx) = oneshot::channel();
        self.submit(build(reply))?;
        rx.await.map_err(|_| MeshError::RuntimeStopped)
    }

    /// Forward a transport event.
    pub fn link_event(&self, event: LinkEvent) -> MeshResult<()> {
        self.submit(MeshCommand::Link(event))
    }

    /// A link came up.
    pub fn link_up(&self, address: impl Into<String>, endpoint_name: Option<String>) -> MeshResult<()> {
        self.link_event(LinkEvent::Up {
            address: address.into(),
            endpoint_name,
        })
    }

    /// A link went down.
    pub fn link_down(&self, address: impl Into<String>) -> MeshResult<()> {
        self.link_event(LinkEvent::Down {
            address: address.into(),
        })
    }

    /// Bytes arrived on a link.
    pub fn received(&self, from: impl Into<String>, bytes: Vec<u8>) -> MeshResult<()> {
        self.link_event(LinkEvent::Received {
            from: from.into(),
            bytes,
        })
    }

    /// Send a message and wait for the routing decision.
    pub async fn send_data(&self, destination_id: impl Into<String>, payload: AppPayload) -> MeshResult<SendOutcome> {
        let destination_id = destination_id.into();
        self.request(|reply| MeshCommand::SendData {
            destination_id,
            payload,
            reply,
        })
        .await
    }

    /// Broadcast a message.
    pub async fn send_broadcast(&self, payload: AppPayload) -> MeshResult<SendOutcome> {
        self.request(|reply| MeshCommand::SendBroadcast { payload, reply })
            .await
    }

    /// Start presence announcements.
    pub fn start_presence(&self, display_name: impl Into<String>) -> MeshResult<()> {
        self.submit(MeshCommand::StartPresence(display_name.into()))
    }

    /// Stop presence announcements.
    pub fn stop_presence(&self) -> MeshResult<()> {
        self.submit(MeshCommand::StopPresence)
    }

    /// Current routing table.
    pub async fn routing_table(&self) -> MeshResult<Vec<Route>> {
        self.request(MeshCommand::RoutingTable).await
    }

    /// Current presence view.
    pub async fn presence_peers(&self) -> MeshResult<Vec<PresencePeer>> {
        self.request(MeshCommand::PresencePeers).await
    }

    /// Currently connected link addresses.
    pub async fn connected_peers(&self) -> MeshResult<Vec<String>> {
        self.request(MeshCommand::ConnectedPeers).await
    }

    /// Ask the task to stop. Commands queued before this are still handled.
    pub fn shutdown(&self) -> MeshResult<()> {
        self.submit(MeshCommand::Shutdown)
    }
}

/// Timer periods for the runtime loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Periods {
    presence: Duration,
    request_cache: Duration,
    broadcast_cache: Duration,
    route_sweep: Duration,
}

impl Periods {
    fn from_config(config: &MeshConfig) -> Self {
        Self {
            presence: config.presence.announce_interval(),
            request_cache: config.routing.request_cache_clear_interval(),
            broadcast_cache: config.routing.broadcast_cache_clear_interval(),
            route_sweep: config.routing.route_sweep_interval(),
        }
    }
}

fn timer(start: Instant, period: Duration) -> Interval {
    let mut interval = interval_at(start + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Task owning one mesh node.
pub struct MeshRuntime {
    node: MeshNode,
    commands: mpsc::UnboundedReceiver<MeshCommand>,
    periods: Periods,
}

impl MeshRuntime {
    /// Wrap `node`; timer periods come from `config`.
    ///
    /// Fails with [`MeshError::Config`] when `config` does not validate,
    /// since a zero period cannot drive a timer.
    pub fn new(node: MeshNode, config: &MeshConfig) -> MeshResult<(Self, MeshHandle)> {
        config
            .validate()
            .map_err(|e| MeshError::Config(e.to_string()))?;
        let (tx, commands) = mpsc::unbounded_channel();
        let runtime = Self {
            node,
            commands,
            periods: Periods::from_config(config),
        };
        Ok((runtime, MeshHandle { tx }))
    }

    /// Run on a new tokio task. The node is returned when the task ends.
    pub fn spawn(self) -> JoinHandle<MeshNode> {
        tokio::spawn(self.run())
    }

    /// Process commands and timers until shutdown or until every handle is dropped.
    pub async fn run(mut self) -> MeshNode {
        let start = Instant::now();
        let mut presence = timer(start, self.periods.presence);
        let mut request_cache = timer(start, self.periods.request_cache);
        let mut broadcast_cache = timer(start, self.periods.broadcast_cache);
        let mut route_sweep = timer(start, self.periods.route_sweep);

        info!(local_id = %self.node.local_id(), "Mesh runtime started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(MeshCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                _ = presence.tick() => {
                    self.node.presence_tick(current_timestamp());
                }
                _ = request_cache.tick() => {
                    self.node.clear_request_cache();
                }
                _ = broadcast_cache.tick() => {
                    self.node.clear_broadcast_cache();
                }
                _ = route_sweep.tick() => {
                    self.node.sweep_routes(current_timestamp());
                }
            }
        }

        info!(local_id = %self.node.local_id(), "Mesh runtime stopped");
        self.node
    }

    fn handle_command(&mut self, command: MeshCommand) {
        match command {
            MeshCommand::Link(event) => self.node.handle_link_event(event),
            MeshCommand::SendData {
                destination_id,
                payload,
                reply,
            } => {
                let outcome = self.node.send_data(&destination_id, payload);
                if reply.send(outcome).is_err() {
                    debug!("SendData caller went away");
                }
            }
            MeshCommand::SendBroadcast { payload, reply } => {
                let outcome = self.node.send_broadcast(payload);
                if reply.send(outcome).is_err() {
                    debug!("SendBroadcast caller went away");
                }
            }
            MeshCommand::StartPresence(display_name) => self.node.start_presence(&display_name),
            MeshCommand::StopPresence => self.node.stop_presence(),
            MeshCommand::RoutingTable(reply) => {
                let _ = reply.send(self.node.routing_table());
            }
            MeshCommand::PresencePeers(reply) => {
                let _ = reply.send(self.node.presence_peers());
            }
            MeshCommand::ConnectedPeers(reply) => {
                let _ = reply.send(self.node.connected_peers());
            }
            MeshCommand::Shutdown => {}
        }
    }
}
