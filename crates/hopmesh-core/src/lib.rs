//! # Mesh Networking Core
//!
//! This crate implements an ad-hoc mesh networking engine for constrained
//! IoT nodes. Each node is a peer that discovers neighbors over a
//! short-range broadcast transport, maintains a view of the reachable mesh,
//! and delivers small payloads to named destinations through hop-limited
//! forwarding. Nodes designated as **gateways** bridge the mesh to an
//! external backbone; ordinary nodes use the mesh to reach the nearest one.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Host Application                         │
//! │        send_data / data callback / nearest_gateway           │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        MeshEngine                            │
//! │  ┌────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │ PeerTable  │  │ RoutingTable │  │ frame dispatch +     │  │
//! │  │ (last-seen)│  │ (next hops)  │  │ heartbeat tick       │  │
//! │  └────────────┘  └──────────────┘  └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!            ▲ Mailbox (rx)                │ LinkDriver (tx)
//! ┌──────────────────────────────────────────────────────────────┐
//! │              Radio / link layer (external)                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is single-threaded and never blocks: radio receptions are
//! trampolined through a bounded [`Mailbox`](link::Mailbox) onto the host
//! loop, which drives the engine with explicit monotonic-millisecond
//! timestamps. All tables are fixed-capacity; nothing in the engine is
//! fatal, and bounded memory always wins over delivery guarantees.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hopmesh_core::{Frame, LinkDriver, MacAddr, MeshConfig, MeshEngine};
//!
//! let mut engine = MeshEngine::new(own_mac, MeshConfig::default(), radio);
//! engine.set_data_callback(|src, payload| {
//!     println!("{src}: {payload:?}");
//! });
//! engine.send_discovery();
//!
//! // In the host loop:
//! engine.tick(now_ms);
//! engine.send_data(dest, b"reading: 21.5C");
//! ```

pub mod engine;
pub mod link;
pub mod peer;
pub mod routing;
pub mod simulation;
pub mod wire;

// Re-export main types
pub use engine::{MeshConfig, MeshEngine, MeshStats};
pub use link::{LinkDriver, LinkError, Mailbox, RxFrame};
pub use peer::{PeerEntry, PeerTable};
pub use routing::{DedupCache, RouteEntry, RoutingTable};
pub use simulation::{MeshSimulator, NodePosition, SimConfig, SimEvent, SimStats};
pub use wire::{Frame, FrameType, MacAddr, WireError, HEADER_SIZE, MAX_DATA_SIZE};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engine::{MeshConfig, MeshEngine, MeshStats};
    pub use crate::link::{LinkDriver, Mailbox, RxFrame};
    pub use crate::wire::{Frame, FrameType, MacAddr};
}
