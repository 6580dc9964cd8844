//! Mesh engine
//!
//! [`MeshEngine`] is the protocol state machine: it owns the peer and
//! routing tables and is their only mutator. The host drives it from a
//! single context: the link driver's receive callback pushes raw frames
//! into the engine's [`Mailbox`], and the host loop calls
//! [`process_pending`](MeshEngine::process_pending) and
//! [`tick`](MeshEngine::tick) from its scheduling loop. All timestamps are
//! monotonic milliseconds supplied by the host.
//!
//! Per received frame the engine runs: self-filter, peer-table touch,
//! duplicate suppression, then type dispatch. Dispatch emits at most one
//! outgoing frame.

use crate::link::{LinkDriver, Mailbox};
use crate::peer::{PeerEntry, PeerTable};
use crate::routing::{DedupCache, RouteEntry, RoutingTable};
use crate::wire::{Frame, FrameType, MacAddr, MAX_DATA_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Default radio channel occupied by the mesh
pub const MESH_CHANNEL: u8 = 1;

/// Default capacity of the peer and routing tables
pub const MAX_PEERS: usize = 20;

/// Default peer staleness timeout in milliseconds
pub const PEER_TIMEOUT_MS: u64 = 120_000;

/// Default heartbeat cadence in milliseconds
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Default relay limit for data and route-request frames
pub const MAX_HOP_COUNT: u8 = 5;

/// Default relay limit for discovery replies
pub const DISCOVERY_HOP_LIMIT: u8 = 3;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Radio channel hint handed to the link driver; one logical mesh
    /// occupies one channel
    pub channel: u8,
    /// Whether this node bridges the mesh to an external backbone
    pub gateway: bool,
    /// Capacity of the peer table and the routing table
    pub max_peers: usize,
    /// Milliseconds without reception before a peer is evicted
    pub peer_timeout_ms: u64,
    /// Milliseconds between heartbeat broadcasts
    pub heartbeat_interval_ms: u64,
    /// Frames at or above this hop count are not relayed further
    pub max_hop_count: u8,
    /// Discovery frames at or above this hop count get no reply
    pub discovery_hop_limit: u8,
    /// Capacity of the duplicate-suppression cache
    pub dedup_capacity: usize,
    /// Capacity of the receive mailbox
    pub mailbox_capacity: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            channel: MESH_CHANNEL,
            gateway: false,
            max_peers: MAX_PEERS,
            peer_timeout_ms: PEER_TIMEOUT_MS,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            max_hop_count: MAX_HOP_COUNT,
            discovery_hop_limit: DISCOVERY_HOP_LIMIT,
            dedup_capacity: 64,
            mailbox_capacity: 16,
        }
    }
}

/// Engine counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshStats {
    /// Frames handed to the link driver
    pub frames_tx: u64,
    /// Frames entering the processor
    pub frames_rx: u64,
    /// Frames relayed toward another destination
    pub frames_forwarded: u64,
    /// Frames dropped by the duplicate cache
    pub duplicates_dropped: u64,
    /// Frames dropped at the relay hop limit
    pub hop_limit_drops: u64,
    /// Receptions the codec rejected
    pub decode_errors: u64,
    /// Payloads delivered to the application callback
    pub delivered: u64,
    /// Sends the link driver reported as failed
    pub send_failures: u64,
    /// Current peer-table occupancy
    pub peer_count: usize,
    /// Current routing-table occupancy
    pub route_count: usize,
}

/// Application callback receiving `(source, payload)` for frames
/// addressed to this node
pub type DataCallback = Box<dyn FnMut(MacAddr, &[u8]) + Send>;

/// The mesh protocol engine
pub struct MeshEngine<L: LinkDriver> {
    config: MeshConfig,
    own: MacAddr,
    gateway: bool,
    sequence: u16,
    last_heartbeat: u64,
    peers: PeerTable,
    routes: RoutingTable,
    dedup: DedupCache,
    mailbox: Mailbox,
    link: L,
    on_data: Option<DataCallback>,
    stats: MeshStats,
}

impl<L: LinkDriver> fmt::Debug for MeshEngine<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshEngine")
            .field("own", &self.own)
            .field("gateway", &self.gateway)
            .field("peers", &self.peers.count())
            .field("routes", &self.routes.count())
            .finish()
    }
}

impl<L: LinkDriver> MeshEngine<L> {
    /// Create an engine for the node with link-layer address `own`.
    ///
    /// The tables start empty; the first heartbeat fires on the first
    /// `tick` at or past one heartbeat interval of uptime. Hosts that want
    /// to announce themselves immediately call
    /// [`send_discovery`](Self::send_discovery) right after construction.
    pub fn new(own: MacAddr, config: MeshConfig, link: L) -> Self {
        info!(address = %own, channel = config.channel, gateway = config.gateway, "mesh engine up");
        Self {
            own,
            gateway: config.gateway,
            sequence: 0,
            last_heartbeat: 0,
            peers: PeerTable::new(config.max_peers, config.peer_timeout_ms),
            routes: RoutingTable::new(config.max_peers, config.peer_timeout_ms),
            dedup: DedupCache::new(config.dedup_capacity),
            mailbox: Mailbox::new(config.mailbox_capacity),
            link,
            on_data: None,
            stats: MeshStats::default(),
            config,
        }
    }

    /// This node's own address
    pub fn own_address(&self) -> MacAddr {
        self.own
    }

    /// The engine's configuration
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Cloneable handle for the link driver's receive callback to push
    /// raw receptions into
    pub fn mailbox(&self) -> Mailbox {
        self.mailbox.clone()
    }

    /// Register the application callback for delivered payloads
    pub fn set_data_callback<F>(&mut self, callback: F)
    where
        F: FnMut(MacAddr, &[u8]) + Send + 'static,
    {
        self.on_data = Some(Box::new(callback));
    }

    /// Switch gateway advertisement on or off
    pub fn set_gateway_mode(&mut self, gateway: bool) {
        self.gateway = gateway;
    }

    /// Whether this node currently advertises as a gateway
    pub fn is_gateway(&self) -> bool {
        self.gateway
    }

    /// Number of known peers
    pub fn peer_count(&self) -> usize {
        self.peers.count()
    }

    /// Peer entry for `address`, if known
    pub fn peer(&self, address: MacAddr) -> Option<&PeerEntry> {
        self.peers.get(address)
    }

    /// All known peers, in insertion order
    pub fn peers(&self) -> impl Iterator<Item = &PeerEntry> {
        self.peers.iter()
    }

    /// Gateway peer with the fewest hops
    pub fn nearest_gateway(&self) -> Option<&PeerEntry> {
        self.peers.nearest_gateway()
    }

    /// Route entry for `destination`, if known
    pub fn route(&self, destination: MacAddr) -> Option<&RouteEntry> {
        self.routes.find(destination)
    }

    /// Counters, with live table occupancy filled in
    pub fn stats(&self) -> MeshStats {
        let mut stats = self.stats.clone();
        stats.peer_count = self.peers.count();
        stats.route_count = self.routes.count();
        stats
    }

    /// The link driver
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Mutable access to the link driver
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Drain the mailbox into the processor; returns frames processed.
    ///
    /// Decode failures release the slot and are counted, never surfaced.
    pub fn process_pending(&mut self, now: u64) -> usize {
        let mut processed = 0;
        while let Some(rx) = self.mailbox.pop() {
            match Frame::decode(&rx.bytes) {
                Ok(frame) => {
                    self.handle_frame(frame, rx.rssi, now);
                    processed += 1;
                }
                Err(err) => {
                    self.stats.decode_errors += 1;
                    debug!(link_src = %rx.link_src, %err, "dropping undecodable frame");
                }
            }
        }
        processed
    }

    /// Process one decoded frame.
    ///
    /// Direct entry for hosts whose link driver already delivers on the
    /// engine's context; all other hosts go through the mailbox.
    pub fn handle_frame(&mut self, frame: Frame, rssi: i8, now: u64) {
        self.stats.frames_rx += 1;

        // Loop guard: our own frames echoed back are discarded outright.
        if frame.src == self.own {
            return;
        }

        // A discovery payload advertises the sender's gateway flag; an
        // empty payload reads as "not a gateway". Other frame types leave
        // the stored flag alone.
        let gateway_hint = match frame.frame_type {
            FrameType::Discovery => Some(frame.data.first() == Some(&1)),
            _ => None,
        };
        self.peers
            .touch(frame.src, rssi, frame.hop_count, gateway_hint, now);

        // Duplicates refreshed last_seen above but trigger no dispatch,
        // no reply, no forward.
        if !self.dedup.check_and_insert(frame.src, frame.sequence) {
            self.stats.duplicates_dropped += 1;
            return;
        }

        match frame.frame_type {
            FrameType::Discovery => self.handle_discovery(frame, now),
            FrameType::Heartbeat => {} // peer touch above is the whole effect
            FrameType::Data => self.handle_data(frame),
            FrameType::RouteRequest => self.handle_route_request(frame),
            FrameType::RouteReply => self.handle_route_reply(frame, now),
            FrameType::Ack => {} // reserved
        }
    }

    /// Heartbeat cadence and staleness sweeps. Call from the host loop;
    /// tens-of-milliseconds granularity suffices.
    pub fn tick(&mut self, now: u64) {
        self.process_pending(now);

        if now.saturating_sub(self.last_heartbeat) >= self.config.heartbeat_interval_ms {
            self.send_heartbeat();
            self.last_heartbeat = now;
            self.peers.evict_stale(now);
            self.routes.evict_stale(now);
        }
    }

    /// Originate a data frame to `dest`.
    ///
    /// Payloads over the frame cap are truncated. With a known route the
    /// frame goes to the route's next hop, otherwise it is broadcast.
    /// Delivery is best-effort; there is no retry at this layer.
    pub fn send_data(&mut self, dest: MacAddr, payload: &[u8]) {
        let payload = &payload[..payload.len().min(MAX_DATA_SIZE)];
        let mut frame = Frame::new(FrameType::Data, self.own, dest, self.next_sequence());
        frame.data = payload.to_vec();

        match self.routes.find(dest).map(|r| r.next_hop) {
            Some(next_hop) => self.emit_unicast(next_hop, &frame),
            None => self.emit_broadcast(&frame),
        }
    }

    /// Broadcast a discovery announcement carrying our gateway flag
    pub fn send_discovery(&mut self) {
        let gateway_flag = [self.gateway as u8];
        let frame = Frame::broadcast(
            FrameType::Discovery,
            self.own,
            self.next_sequence(),
            &gateway_flag,
        );
        self.emit_broadcast(&frame);
        debug!("discovery sent");
    }

    /// Broadcast a query for a route to `dest`
    pub fn send_route_request(&mut self, dest: MacAddr) {
        let mut frame = Frame::broadcast(FrameType::RouteRequest, self.own, self.next_sequence(), &[]);
        frame.data.extend_from_slice(dest.as_bytes());
        self.emit_broadcast(&frame);
        debug!(%dest, "route request sent");
    }

    fn send_heartbeat(&mut self) {
        let payload = [self.peers.count().min(u8::MAX as usize) as u8, self.gateway as u8];
        let frame = Frame::broadcast(
            FrameType::Heartbeat,
            self.own,
            self.next_sequence(),
            &payload,
        );
        self.emit_broadcast(&frame);
    }

    fn handle_discovery(&mut self, frame: Frame, now: u64) {
        debug!(src = %frame.src, hop_count = frame.hop_count, "discovery received");

        if frame.hop_count < self.config.discovery_hop_limit {
            let mut reply = Frame::new(
                FrameType::Discovery,
                self.own,
                frame.src,
                self.next_sequence(),
            );
            reply.hop_count = frame.hop_count + 1;
            reply.data.push(self.gateway as u8);
            self.emit_unicast(frame.src, &reply);
        }

        // The sender is a direct neighbor regardless of the reply cutoff.
        self.routes.update(frame.src, frame.src, 1, now);
    }

    fn handle_data(&mut self, mut frame: Frame) {
        if frame.dst == self.own {
            self.stats.delivered += 1;
            if let Some(callback) = self.on_data.as_mut() {
                callback(frame.src, &frame.data);
            }
            return;
        }

        if frame.hop_count >= self.config.max_hop_count {
            self.stats.hop_limit_drops += 1;
            debug!(src = %frame.src, dst = %frame.dst, "data frame at hop limit, dropped");
            return;
        }

        frame.hop_count += 1;
        self.stats.frames_forwarded += 1;
        match self.routes.find(frame.dst).map(|r| r.next_hop) {
            Some(next_hop) => self.emit_unicast(next_hop, &frame),
            None => self.emit_broadcast(&frame),
        }
    }

    fn handle_route_request(&mut self, mut frame: Frame) {
        // Payload is the queried 6-byte destination; anything shorter is
        // malformed and dropped.
        let Some(target) = MacAddr::from_slice(&frame.data) else {
            return;
        };

        let advertised = if target == self.own {
            Some(1)
        } else {
            self.routes
                .find(target)
                .map(|r| r.hop_count.saturating_add(1))
        };

        if let Some(hops) = advertised {
            let mut reply = Frame::new(
                FrameType::RouteReply,
                self.own,
                frame.src,
                self.next_sequence(),
            );
            reply.data.extend_from_slice(target.as_bytes());
            reply.data.push(hops);
            self.emit_unicast(frame.src, &reply);
        } else if frame.hop_count < self.config.max_hop_count {
            frame.hop_count += 1;
            self.stats.frames_forwarded += 1;
            self.emit_broadcast(&frame);
        }
    }

    fn handle_route_reply(&mut self, frame: Frame, now: u64) {
        let Some(destination) = MacAddr::from_slice(&frame.data) else {
            return;
        };
        let Some(&hops) = frame.data.get(6) else {
            return;
        };
        // A route always costs at least one hop; zero is a malformed
        // advertisement.
        if hops == 0 {
            return;
        }
        self.routes.update(destination, frame.src, hops, now);
    }

    fn next_sequence(&mut self) -> u16 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        seq
    }

    fn emit_broadcast(&mut self, frame: &Frame) {
        match frame.encode() {
            Ok(bytes) => match self.link.broadcast(&bytes) {
                Ok(()) => self.stats.frames_tx += 1,
                Err(err) => {
                    self.stats.send_failures += 1;
                    warn!(%err, "broadcast failed");
                }
            },
            Err(err) => warn!(%err, "refusing to emit unencodable frame"),
        }
    }

    fn emit_unicast(&mut self, dest: MacAddr, frame: &Frame) {
        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, "refusing to emit unencodable frame");
                return;
            }
        };
        if let Err(err) = self.link.ensure_peer(dest) {
            warn!(%dest, %err, "peer registration failed");
        }
        match self.link.unicast(dest, &bytes) {
            Ok(()) => self.stats.frames_tx += 1,
            Err(err) => {
                self.stats.send_failures += 1;
                warn!(%dest, %err, "unicast failed");
            }
        }
    }
}
