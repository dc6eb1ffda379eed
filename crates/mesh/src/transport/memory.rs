//! In-process transport hub.
//!
//! Nodes attach by link address; links are created and removed explicitly.
//! Sent frames are queued inside the hub and handed out by [`MemoryHub::take_frames`],
//! so the caller decides when (and whether) they are delivered.

use super::{Transport, TransportError};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// One queued transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sending link address
    pub from: String,
    /// Receiving link address
    pub to: String,
    /// Raw message
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct HubState {
    /// Undirected links, stored with the smaller address first
    links: BTreeSet<(String, String)>,
    queue: VecDeque<Frame>,
    closed: bool,
}

impl HubState {
    fn neighbors(&self, address: &str) -> Vec<String> {
        self.links
            .iter()
            .filter_map(|(a, b)| {
                if a == address {
                    Some(b.clone())
                } else if b == address {
                    Some(a.clone())
                } else {
                    None
                }
            })
            .collect()
    }
}

fn link_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Shared hub; clones refer to the same network.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Transport handle sending as `address`.
    pub fn endpoint(&self, address: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            address: address.into(),
        }
    }

    /// Bring up a bidirectional link.
    pub fn link(&self, a: &str, b: &str) {
        self.lock().links.insert(link_key(a, b));
    }

    /// Tear down a link. Frames already queued are kept.
    pub fn unlink(&self, a: &str, b: &str) {
        self.lock().links.remove(&link_key(a, b));
    }

    /// Whether `a` and `b` are directly linked.
    pub fn is_linked(&self, a: &str, b: &str) -> bool {
        self.lock().links.contains(&link_key(a, b))
    }

    /// Addresses directly linked to `address`, sorted.
    pub fn neighbors(&self, address: &str) -> Vec<String> {
        self.lock().neighbors(address)
    }

    /// Drain every queued frame in send order.
    pub fn take_frames(&self) -> Vec<Frame> {
        self.lock().queue.drain(..).collect()
    }

    /// Number of frames waiting for delivery.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Fail all further sends.
    pub fn close(&self) {
        self.lock().closed = true;
    }
}

/// One node's view of a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    hub: MemoryHub,
    address: String,
}

impl MemoryTransport {
    /// Link address this endpoint sends from.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Transport for MemoryTransport {
    fn send_to_link(&self, address: &str, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.hub.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if !state.links.contains(&link_key(&self.address, address)) {
            return Err(TransportError::LinkDown {
                address: address.to_string(),
            });
        }
        state.queue.push_back(Frame {
            from: self.address.clone(),
            to: address.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn broadcast(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.hub.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        for neighbor in state.neighbors(&self.address) {
            state.queue.push_back(Frame {
                from: self.address.clone(),
                to: neighbor,
                bytes: bytes.to_vec(),
            });
        }
        Ok(())
    }
}
