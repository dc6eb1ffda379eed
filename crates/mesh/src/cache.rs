//! Flood deduplication.

use std::collections::HashSet;

/// Set of packet ids already processed.
///
/// Entries are never expired one by one; the owner clears the whole set
/// on a timer. Only membership matters.
#[derive(Debug, Default)]
pub struct SeenCache {
    ids: HashSet<String>,
}

impl SeenCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `packet_id`. Returns `false` if it was already present.
    pub fn insert(&mut self, packet_id: &str) -> bool {
        if self.ids.contains(packet_id) {
            return false;
        }
        self.ids.insert(packet_id.to_string())
    }

    /// Whether `packet_id` has been recorded.
    pub fn contains(&self, packet_id: &str) -> bool {
        self.ids.contains(packet_id)
    }

    /// Forget everything. Returns how many ids were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.ids.len();
        self.ids.clear();
        count
    }

    /// Number of recorded ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
