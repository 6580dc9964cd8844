//! Routing table and duplicate detection
//!
//! Distance-vector style routes: one entry per destination mapping to the
//! neighbor frames should be handed to. Routes improve only on strictly
//! fewer hops, so equal-cost alternatives discovered in different orders
//! cannot flap the table.

use crate::wire::MacAddr;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// A known path to a destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Final destination
    pub destination: MacAddr,
    /// Neighbor to hand frames for `destination` to; equals `destination`
    /// for direct neighbors
    pub next_hop: MacAddr,
    /// Hops to reach the destination, at least 1
    pub hop_count: u8,
    /// Monotonic millisecond timestamp of the last update
    pub last_updated: u64,
}

/// Fixed-capacity mapping from destination to next hop
#[derive(Debug)]
pub struct RoutingTable {
    routes: Vec<RouteEntry>,
    capacity: usize,
    /// Entries not refreshed within this many milliseconds are dropped
    /// by [`evict_stale`](Self::evict_stale)
    timeout_ms: u64,
}

impl RoutingTable {
    /// Create a table holding at most `capacity` routes
    pub fn new(capacity: usize, timeout_ms: u64) -> Self {
        Self {
            routes: Vec::with_capacity(capacity),
            capacity,
            timeout_ms,
        }
    }

    /// Route for `destination`, if known
    pub fn find(&self, destination: MacAddr) -> Option<&RouteEntry> {
        self.routes.iter().find(|r| r.destination == destination)
    }

    /// Insert or refresh the route for `destination`.
    ///
    /// An existing entry's next hop is overwritten only when the offered
    /// hop count is strictly smaller; ties lose. `last_updated` is
    /// refreshed either way. A new destination is inserted unless the
    /// table is full, in which case the update is dropped.
    pub fn update(&mut self, destination: MacAddr, next_hop: MacAddr, hop_count: u8, now: u64) {
        if let Some(entry) = self
            .routes
            .iter_mut()
            .find(|r| r.destination == destination)
        {
            if hop_count < entry.hop_count {
                debug!(%destination, %next_hop, hop_count, "route improved");
                entry.next_hop = next_hop;
                entry.hop_count = hop_count;
            }
            entry.last_updated = now;
            return;
        }

        if self.routes.len() >= self.capacity {
            debug!(%destination, "routing table full, dropping update");
            return;
        }

        debug!(%destination, %next_hop, hop_count, "route added");
        self.routes.push(RouteEntry {
            destination,
            next_hop,
            hop_count,
            last_updated: now,
        });
    }

    /// Drop routes not refreshed within the timeout
    pub fn evict_stale(&mut self, now: u64) -> usize {
        let timeout = self.timeout_ms;
        let before = self.routes.len();
        self.routes.retain(|r| {
            let fresh = now.saturating_sub(r.last_updated) < timeout;
            if !fresh {
                debug!(destination = %r.destination, "removed stale route");
            }
            fresh
        });
        before - self.routes.len()
    }

    /// Number of known routes
    pub fn count(&self) -> usize {
        self.routes.len()
    }

    /// All entries, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.iter()
    }
}

/// Seen-set of `(src, sequence)` pairs for duplicate suppression.
///
/// Bounded FIFO: the oldest key is evicted when full. The window only
/// needs to outlast the flooding of a single frame through the mesh, so
/// a small fixed capacity suffices.
#[derive(Debug)]
pub struct DedupCache {
    seen: VecDeque<(MacAddr, u16)>,
    capacity: usize,
}

impl DedupCache {
    /// Create a cache remembering the last `capacity` frame keys
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `(src, sequence)`; returns `true` for a frame not seen before
    pub fn check_and_insert(&mut self, src: MacAddr, sequence: u16) -> bool {
        let key = (src, sequence);
        if self.seen.contains(&key) {
            return false;
        }
        if self.seen.len() >= self.capacity {
            self.seen.pop_front();
        }
        self.seen.push_back(key);
        true
    }

    /// Number of remembered keys
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
