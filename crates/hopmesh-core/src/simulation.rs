//! Multi-node mesh simulation
//!
//! An in-memory radio medium for exercising the engine without hardware:
//!
//! - Multiple nodes with 2D positions
//! - Log-distance path loss down to a receive-sensitivity cutoff
//! - Broadcast frames reach every node in range; unicast frames reach the
//!   addressed node only
//! - One simulation step of latency per transmission
//!
//! The model exists to exercise protocol behavior (discovery, convergence,
//! multi-hop forwarding), not to reproduce RF effects; there is no
//! collision or airtime modeling.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hopmesh_core::simulation::{MeshSimulator, SimConfig};
//!
//! let config = SimConfig::default().with_node_count(10).with_gateway_count(1);
//! let mut sim = MeshSimulator::new(config);
//! sim.run(500);
//! sim.print_summary();
//! ```

use crate::engine::{MeshConfig, MeshEngine};
use crate::link::{LinkDriver, LinkError, RxFrame};
use crate::wire::MacAddr;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Node position in 2D space (meters)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

impl NodePosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Distance to another node in meters
    pub fn distance_to(&self, other: &NodePosition) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Generate a reproducible pseudo-random position within bounds
    pub fn random(max_x: f64, max_y: f64, seed: u64) -> Self {
        let mut rng = seed;
        rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
        let x = (rng >> 33) as f64 / (1u64 << 31) as f64 * max_x;
        rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
        let y = (rng >> 33) as f64 / (1u64 << 31) as f64 * max_y;
        Self { x, y }
    }
}

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of nodes
    pub node_count: usize,
    /// How many of the first nodes run in gateway mode
    pub gateway_count: usize,
    /// Simulation area width (meters)
    pub area_width: f64,
    /// Simulation area height (meters)
    pub area_height: f64,
    /// Transmit power (dBm)
    pub tx_power_dbm: f64,
    /// Receive sensitivity cutoff (dBm)
    pub rx_sensitivity_dbm: f64,
    /// Path loss exponent (2.0 = free space, 3.0-4.0 = indoor/urban)
    pub path_loss_exponent: f64,
    /// Reference distance for the path loss model (meters)
    pub reference_distance: f64,
    /// Simulated milliseconds per step
    pub step_ms: u64,
    /// Seed for node placement
    pub seed: u64,
    /// Per-node engine configuration
    pub mesh: MeshConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            node_count: 10,
            gateway_count: 1,
            area_width: 500.0,
            area_height: 500.0,
            tx_power_dbm: 20.0,
            rx_sensitivity_dbm: -90.0,
            path_loss_exponent: 2.8,
            reference_distance: 1.0,
            step_ms: 10,
            seed: 42,
            mesh: MeshConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn with_node_count(mut self, count: usize) -> Self {
        self.node_count = count;
        self
    }

    pub fn with_gateway_count(mut self, count: usize) -> Self {
        self.gateway_count = count;
        self
    }

    pub fn with_area(mut self, width: f64, height: f64) -> Self {
        self.area_width = width;
        self.area_height = height;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Link driver that parks outgoing frames for the simulator to pick up
#[derive(Debug, Default)]
struct SimLink {
    /// `(destination, bytes)`; `None` destination means broadcast
    outbox: VecDeque<(Option<MacAddr>, Vec<u8>)>,
}

impl LinkDriver for SimLink {
    fn broadcast(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.outbox.push_back((None, bytes.to_vec()));
        Ok(())
    }

    fn unicast(&mut self, dest: MacAddr, bytes: &[u8]) -> Result<(), LinkError> {
        self.outbox.push_back((Some(dest), bytes.to_vec()));
        Ok(())
    }
}

/// A frame traversing the simulated medium
#[derive(Debug, Clone)]
struct InFlightFrame {
    dest: Option<MacAddr>,
    bytes: Vec<u8>,
    source_idx: usize,
    source_pos: NodePosition,
}

/// Simulation events for analysis
#[derive(Debug, Clone)]
pub enum SimEvent {
    NodeJoined {
        node_idx: usize,
        address: MacAddr,
        position: NodePosition,
    },
    FrameTransmitted {
        node_idx: usize,
        size: usize,
    },
    FrameDelivered {
        from_idx: usize,
        to_idx: usize,
        rssi_dbm: f64,
    },
    FrameLost {
        from_idx: usize,
        to_idx: usize,
        rssi_dbm: f64,
    },
}

/// Aggregate simulation statistics
#[derive(Debug, Clone, Default)]
pub struct SimStats {
    /// Data payloads originated through [`MeshSimulator::send_data`]
    pub messages_sent: u64,
    /// Frames put on the medium
    pub frames_transmitted: u64,
    /// Successful receptions
    pub frames_delivered: u64,
    /// Receptions below the sensitivity cutoff
    pub frames_lost: u64,
}

impl SimStats {
    /// Fraction of transmissions that reached at least the radio layer
    pub fn frame_delivery_rate(&self) -> f64 {
        if self.frames_transmitted == 0 {
            0.0
        } else {
            self.frames_delivered as f64 / self.frames_transmitted as f64
        }
    }
}

/// One simulated node
struct SimNode {
    engine: MeshEngine<SimLink>,
    position: NodePosition,
    /// Payloads delivered to this node's application callback
    received: Arc<Mutex<Vec<(MacAddr, Vec<u8>)>>>,
}

/// Multi-node mesh network simulator
pub struct MeshSimulator {
    config: SimConfig,
    nodes: Vec<SimNode>,
    in_flight: Vec<InFlightFrame>,
    now_ms: u64,
    step_count: u64,
    stats: SimStats,
    events: Vec<SimEvent>,
}

impl MeshSimulator {
    /// Create a simulator; nodes are placed pseudo-randomly from the seed
    /// and announce themselves with a discovery broadcast.
    pub fn new(config: SimConfig) -> Self {
        let mut sim = Self {
            nodes: Vec::with_capacity(config.node_count),
            in_flight: Vec::new(),
            now_ms: 0,
            step_count: 0,
            stats: SimStats::default(),
            events: Vec::new(),
            config,
        };

        for i in 0..sim.config.node_count {
            let position = NodePosition::random(
                sim.config.area_width,
                sim.config.area_height,
                sim.config.seed.wrapping_add(i as u64 * 12345),
            );
            sim.add_node(position, i < sim.config.gateway_count);
        }
        sim
    }

    /// Deterministic address for node `idx`
    fn node_mac(idx: usize) -> MacAddr {
        MacAddr::from_bytes([0x02, 0x00, 0x00, 0x00, (idx >> 8) as u8, idx as u8])
    }

    fn add_node(&mut self, position: NodePosition, gateway: bool) {
        let idx = self.nodes.len();
        let address = Self::node_mac(idx);
        let mesh_config = MeshConfig {
            gateway,
            ..self.config.mesh.clone()
        };

        let mut engine = MeshEngine::new(address, mesh_config, SimLink::default());
        let received: Arc<Mutex<Vec<(MacAddr, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        engine.set_data_callback(move |src, payload| {
            sink.lock().unwrap().push((src, payload.to_vec()));
        });
        engine.send_discovery();

        self.events.push(SimEvent::NodeJoined {
            node_idx: idx,
            address,
            position,
        });
        self.nodes.push(SimNode {
            engine,
            position,
            received,
        });
    }

    /// Move a node; takes effect from the next step
    pub fn place_node(&mut self, idx: usize, x: f64, y: f64) {
        if let Some(node) = self.nodes.get_mut(idx) {
            node.position = NodePosition::new(x, y);
        }
    }

    /// Received signal strength between two positions under the
    /// log-distance path loss model (2.4 GHz wavelength reference)
    fn rssi_between(&self, tx: &NodePosition, rx: &NodePosition) -> f64 {
        let d0 = self.config.reference_distance;
        let distance = tx.distance_to(rx).max(d0);
        let pl_reference = 20.0 * (4.0 * std::f64::consts::PI * d0 / 0.125).log10();
        let path_loss = pl_reference
            + 10.0 * self.config.path_loss_exponent * (distance / d0).log10();
        self.config.tx_power_dbm - path_loss
    }

    /// Run one simulation step: deliver the previous step's transmissions,
    /// collect new ones, and tick every engine.
    pub fn step(&mut self) {
        self.step_count += 1;
        self.now_ms += self.config.step_ms;

        let in_flight = std::mem::take(&mut self.in_flight);
        for frame in &in_flight {
            self.deliver(frame);
        }

        let now = self.now_ms;
        for idx in 0..self.nodes.len() {
            self.nodes[idx].engine.tick(now);

            let source_pos = self.nodes[idx].position;
            while let Some((dest, bytes)) = self.nodes[idx].engine.link_mut().outbox.pop_front() {
                self.stats.frames_transmitted += 1;
                self.events.push(SimEvent::FrameTransmitted {
                    node_idx: idx,
                    size: bytes.len(),
                });
                self.in_flight.push(InFlightFrame {
                    dest,
                    bytes,
                    source_idx: idx,
                    source_pos,
                });
            }
        }
    }

    fn deliver(&mut self, frame: &InFlightFrame) {
        let sensitivity = self.config.rx_sensitivity_dbm;
        let now = self.now_ms;

        for idx in 0..self.nodes.len() {
            if idx == frame.source_idx {
                continue;
            }
            // Unicast frames only reach the addressed node
            if let Some(dest) = frame.dest {
                if Self::node_mac(idx) != dest {
                    continue;
                }
            }

            let rssi = self.rssi_between(&frame.source_pos, &self.nodes[idx].position);
            if rssi < sensitivity {
                self.stats.frames_lost += 1;
                self.events.push(SimEvent::FrameLost {
                    from_idx: frame.source_idx,
                    to_idx: idx,
                    rssi_dbm: rssi,
                });
                continue;
            }

            self.stats.frames_delivered += 1;
            self.events.push(SimEvent::FrameDelivered {
                from_idx: frame.source_idx,
                to_idx: idx,
                rssi_dbm: rssi,
            });

            let node = &mut self.nodes[idx];
            node.engine.mailbox().push(RxFrame {
                link_src: Self::node_mac(frame.source_idx),
                bytes: frame.bytes.clone(),
                rssi: rssi.clamp(i8::MIN as f64, i8::MAX as f64) as i8,
            });
            node.engine.process_pending(now);
        }
    }

    /// Run the simulation for `steps` steps
    pub fn run(&mut self, steps: u64) {
        for _ in 0..steps {
            self.step();
        }
    }

    /// Originate a data payload from one node to another
    pub fn send_data(&mut self, from_idx: usize, to_idx: usize, payload: &[u8]) -> bool {
        if from_idx >= self.nodes.len() || to_idx >= self.nodes.len() {
            return false;
        }
        let dest = Self::node_mac(to_idx);
        self.nodes[from_idx].engine.send_data(dest, payload);
        self.stats.messages_sent += 1;
        true
    }

    /// Payloads delivered to node `idx` so far
    pub fn received(&self, idx: usize) -> Vec<(MacAddr, Vec<u8>)> {
        self.nodes
            .get(idx)
            .map(|n| n.received.lock().unwrap().clone())
            .unwrap_or_default()
    }

    /// Total payloads delivered across all nodes
    pub fn messages_delivered(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.received.lock().unwrap().len())
            .sum()
    }

    /// Address of node `idx`
    pub fn node_address(&self, idx: usize) -> Option<MacAddr> {
        self.nodes.get(idx).map(|n| n.engine.own_address())
    }

    /// Position of node `idx`
    pub fn node_position(&self, idx: usize) -> Option<NodePosition> {
        self.nodes.get(idx).map(|n| n.position)
    }

    /// Engine of node `idx`, for inspecting peers, routes, and stats
    pub fn engine(&self, idx: usize) -> Option<&MeshEngine<impl LinkDriver>> {
        self.nodes.get(idx).map(|n| &n.engine)
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Simulation step counter
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Simulated clock in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Aggregate statistics
    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// Event log
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Adjacency list derived from the nodes' peer tables
    pub fn topology(&self) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for peer in node.engine.peers() {
                if let Some(j) = self.index_of(peer.address) {
                    if !adj[i].contains(&j) {
                        adj[i].push(j);
                    }
                }
            }
        }
        adj
    }

    fn index_of(&self, address: MacAddr) -> Option<usize> {
        (0..self.nodes.len()).find(|&i| Self::node_mac(i) == address)
    }

    /// Check if every node is reachable from node 0 over the peer graph
    pub fn is_connected(&self) -> bool {
        if self.nodes.is_empty() {
            return true;
        }

        let adj = self.topology();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![0usize];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            for &neighbor in &adj[node] {
                if !visited[neighbor] {
                    stack.push(neighbor);
                }
            }
        }

        visited.iter().all(|&v| v)
    }

    /// Print a summary of the simulation to stdout
    pub fn print_summary(&self) {
        println!("\n=== Mesh Simulation Summary ===");
        println!("Steps: {} ({} ms simulated)", self.step_count, self.now_ms);
        println!("Nodes: {}", self.nodes.len());
        println!();
        println!("Frames:");
        println!("  Transmitted: {}", self.stats.frames_transmitted);
        println!("  Delivered:   {}", self.stats.frames_delivered);
        println!("  Lost (range): {}", self.stats.frames_lost);
        println!();
        println!("Messages:");
        println!("  Sent:      {}", self.stats.messages_sent);
        println!("  Delivered: {}", self.messages_delivered());
        println!();
        println!("Per-node state:");
        for (i, node) in self.nodes.iter().enumerate() {
            let stats = node.engine.stats();
            println!(
                "  Node {:2} {}: peers={} routes={} tx={} rx={} fwd={} dup={}",
                i,
                node.engine.own_address(),
                stats.peer_count,
                stats.route_count,
                stats.frames_tx,
                stats.frames_rx,
                stats.frames_forwarded,
                stats.duplicates_dropped,
            );
        }
    }
}
