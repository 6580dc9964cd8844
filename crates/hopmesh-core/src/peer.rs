//! Peer table
//!
//! Tracks nodes we have recently heard from. The table is a fixed-capacity
//! array of owned records scanned linearly; compaction keeps insertion
//! order stable.

use crate::wire::MacAddr;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A node we have recently received a frame from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Peer's link-layer address
    pub address: MacAddr,
    /// Signal strength of the most recent reception (dBm)
    pub rssi: i8,
    /// Monotonic millisecond timestamp of the most recent reception
    pub last_seen: u64,
    /// Hop count carried by the most recent frame from this peer.
    /// Advisory: used for gateway selection, not for forwarding.
    pub hop_count: u8,
    /// Whether the peer advertises itself as a gateway
    pub is_gateway: bool,
    /// Whether the entry is live
    pub is_active: bool,
}

/// Fixed-capacity set of recently heard neighbors
#[derive(Debug)]
pub struct PeerTable {
    peers: Vec<PeerEntry>,
    capacity: usize,
    /// Entries older than this many milliseconds are stale
    timeout_ms: u64,
}

impl PeerTable {
    /// Create a table holding at most `capacity` peers
    pub fn new(capacity: usize, timeout_ms: u64) -> Self {
        Self {
            peers: Vec::with_capacity(capacity),
            capacity,
            timeout_ms,
        }
    }

    /// Index of the entry for `address`, if present
    pub fn find(&self, address: MacAddr) -> Option<usize> {
        self.peers.iter().position(|p| p.address == address)
    }

    /// Entry for `address`, if present
    pub fn get(&self, address: MacAddr) -> Option<&PeerEntry> {
        self.find(address).map(|i| &self.peers[i])
    }

    /// Record a reception from `address`.
    ///
    /// Updates `last_seen`, `rssi`, and `hop_count` for an existing entry,
    /// or inserts a new one. `gateway` is `Some` only when the frame carried
    /// a gateway advertisement; `None` preserves the stored flag. On a full
    /// table, stale entries are evicted first; if none open a slot the
    /// insert is dropped and `false` returned.
    pub fn touch(
        &mut self,
        address: MacAddr,
        rssi: i8,
        hop_count: u8,
        gateway: Option<bool>,
        now: u64,
    ) -> bool {
        if let Some(idx) = self.find(address) {
            let entry = &mut self.peers[idx];
            // last_seen is non-decreasing: a stale timestamp from a
            // reordered caller must not move it backwards.
            entry.last_seen = entry.last_seen.max(now);
            entry.rssi = rssi;
            entry.hop_count = hop_count;
            entry.is_active = true;
            if let Some(flag) = gateway {
                entry.is_gateway = flag;
            }
            return true;
        }

        if self.peers.len() >= self.capacity {
            self.evict_stale(now);
            if self.peers.len() >= self.capacity {
                debug!(%address, "peer table full, dropping insert");
                return false;
            }
        }

        let is_gateway = gateway.unwrap_or(false);
        debug!(%address, is_gateway, "added peer");
        self.peers.push(PeerEntry {
            address,
            rssi,
            last_seen: now,
            hop_count,
            is_gateway,
            is_active: true,
        });
        true
    }

    /// Remove every entry not heard from within the timeout.
    ///
    /// Surviving entries keep their relative order. This is the only
    /// removal path.
    pub fn evict_stale(&mut self, now: u64) -> usize {
        let timeout = self.timeout_ms;
        let before = self.peers.len();
        self.peers.retain(|p| {
            let fresh = now.saturating_sub(p.last_seen) < timeout;
            if !fresh {
                debug!(address = %p.address, "removed stale peer");
            }
            fresh
        });
        before - self.peers.len()
    }

    /// Number of known peers
    pub fn count(&self) -> usize {
        self.peers.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// All entries, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.peers.iter()
    }

    /// Gateway peer with the fewest hops; ties go to the earliest entry
    pub fn nearest_gateway(&self) -> Option<&PeerEntry> {
        self.peers
            .iter()
            .filter(|p| p.is_gateway)
            .fold(None, |best: Option<&PeerEntry>, p| match best {
                Some(b) if b.hop_count <= p.hop_count => Some(b),
                _ => Some(p),
            })
    }
}
