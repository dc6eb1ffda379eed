//! Routing table and reverse-route bookkeeping.
//!
//! The forward table maps a destination persistent id to the neighbor link
//! that leads toward it. There is at most one entry per destination and a
//! newer entry always replaces an older one; hop counts are not compared.
//! Entries age out after a fixed timeout whether or not they are used.

use meshage_core::time::age_ms;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Route entry in the routing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Destination persistent id
    pub destination: String,
    /// Link address of the adjacent device on the path
    pub next_hop: String,
    /// Number of hops to the destination (at least 1)
    pub hop_count: u32,
    /// Installation time (Unix epoch milliseconds)
    pub last_updated: u64,
    /// True when the destination is the next hop itself
    pub is_direct: bool,
}

impl Route {
    /// Build an entry; hop counts below one are clamped to one.
    pub fn new(destination: impl Into<String>, next_hop: impl Into<String>, hop_count: u32, now: u64) -> Self {
        let hop_count = hop_count.max(1);
        Self {
            destination: destination.into(),
            next_hop: next_hop.into(),
            hop_count,
            last_updated: now,
            is_direct: hop_count == 1,
        }
    }

    /// Route to a directly linked neighbor.
    pub fn direct(destination: impl Into<String>, next_hop: impl Into<String>, now: u64) -> Self {
        Self::new(destination, next_hop, 1, now)
    }

    /// Whether the entry has outlived `timeout_ms`.
    pub fn is_expired(&self, now: u64, timeout_ms: u64) -> bool {
        age_ms(now, self.last_updated) > timeout_ms
    }
}

/// Where to send a route reply for a request still being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseRoute {
    /// Link address the request arrived on
    pub next_hop: String,
    /// Hop count carried by the request on arrival
    pub hop_count: u32,
}

/// Forward routes keyed by destination.
#[derive(Debug)]
pub struct RoutingTable {
    routes: HashMap<String, Route>,
    /// Maximum route age before considered stale (milliseconds)
    route_timeout_ms: u64,
}

impl RoutingTable {
    /// Create an empty table.
    pub fn new(route_timeout_ms: u64) -> Self {
        Self {
            routes: HashMap::new(),
            route_timeout_ms,
        }
    }

    /// Install a route, replacing any entry for the same destination.
    ///
    /// Returns the replaced entry.
    pub fn install(&mut self, route: Route) -> Option<Route> {
        self.routes.insert(route.destination.clone(), route)
    }

    /// Live route to `destination`; expired entries are treated as absent.
    pub fn find(&self, destination: &str, now: u64) -> Option<&Route> {
        self.routes
            .get(destination)
            .filter(|route| !route.is_expired(now, self.route_timeout_ms))
    }

    /// Next hop for `destination`, if a live route exists.
    pub fn find_next_hop(&self, destination: &str, now: u64) -> Option<&str> {
        self.find(destination, now).map(|route| route.next_hop.as_str())
    }

    /// Whether any entry, live or not, goes through `address`.
    pub fn uses_next_hop(&self, address: &str) -> bool {
        self.routes.values().any(|route| route.next_hop == address)
    }

    /// Remove every route whose next hop is one of `addresses`.
    ///
    /// Returns the removed destinations, sorted.
    pub fn remove_via(&mut self, addresses: &[&str]) -> Vec<String> {
        let mut removed: Vec<String> = self
            .routes
            .values()
            .filter(|route| addresses.contains(&route.next_hop.as_str()))
            .map(|route| route.destination.clone())
            .collect();
        removed.sort();
        for destination in &removed {
            self.routes.remove(destination);
        }
        removed
    }

    /// Prune routes older than the timeout.
    ///
    /// Returns the pruned destinations, sorted.
    pub fn prune_stale_routes(&mut self, now: u64) -> Vec<String> {
        let timeout = self.route_timeout_ms;
        let mut expired: Vec<String> = self
            .routes
            .values()
            .filter(|route| route.is_expired(now, timeout))
            .map(|route| route.destination.clone())
            .collect();
        expired.sort();
        for destination in &expired {
            self.routes.remove(destination);
        }
        expired
    }

    /// All entries, live or not, sorted by destination.
    pub fn snapshot(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = self.routes.values().cloned().collect();
        routes.sort_by(|a, b| a.destination.cmp(&b.destination));
        routes
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Reverse routes keyed by the requester's persistent id.
///
/// Entries are not expired individually; the request cache bounds how
/// many distinct requests a node records in practice.
#[derive(Debug, Default)]
pub struct ReverseRouteTable {
    routes: BTreeMap<String, ReverseRoute>,
}

impl ReverseRouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the way back to `origin`.
    pub fn record(&mut self, origin: impl Into<String>, route: ReverseRoute) {
        self.routes.insert(origin.into(), route);
    }

    /// Way back to `origin`.
    pub fn get(&self, origin: &str) -> Option<&ReverseRoute> {
        self.routes.get(origin)
    }

    /// Copy of every entry, sorted by origin.
    pub fn snapshot(&self) -> Vec<(String, ReverseRoute)> {
        self.routes
            .iter()
            .map(|(origin, route)| (origin.clone(), route.clone()))
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
