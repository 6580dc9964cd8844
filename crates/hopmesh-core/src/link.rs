//! Link-driver contract and receive mailbox
//!
//! The engine never talks to a radio directly. Outbound frames go through
//! the [`LinkDriver`] trait; inbound frames arrive through a [`Mailbox`]
//! that decouples the radio's receive callback from the engine's execution
//! context. Radio stacks commonly dispatch receive callbacks from an ISR or
//! a service task; the mailbox is the single-producer ring that trampolines
//! those receptions onto the host loop, which drains it via
//! [`MeshEngine::process_pending`](crate::engine::MeshEngine::process_pending).

use crate::wire::MacAddr;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by a link driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The driver could not queue or emit the frame
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Per-destination registration failed
    #[error("peer registration failed for {0}")]
    PeerRegistration(MacAddr),
}

/// Best-effort datagram transport consumed by the engine.
///
/// Implementations send already-encoded frames; delivery is not
/// acknowledged at this layer and failures are non-fatal to the engine.
pub trait LinkDriver {
    /// Broadcast a frame to every node in radio range
    fn broadcast(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Send a frame to a single link-layer address
    fn unicast(&mut self, dest: MacAddr, bytes: &[u8]) -> Result<(), LinkError>;

    /// Register `dest` with the driver before the first unicast to it.
    ///
    /// Drivers without per-destination state keep the default no-op.
    fn ensure_peer(&mut self, _dest: MacAddr) -> Result<(), LinkError> {
        Ok(())
    }
}

/// A received datagram as handed over by the link driver
#[derive(Debug, Clone)]
pub struct RxFrame {
    /// Link-layer sender as reported by the driver. Advisory only: the
    /// authoritative source is the decoded frame's `src` field.
    pub link_src: MacAddr,
    /// Raw frame bytes
    pub bytes: Vec<u8>,
    /// Signal strength of the reception (dBm)
    pub rssi: i8,
}

/// Bounded handoff queue between the receive callback and the engine.
///
/// Cloning shares the underlying ring; the radio side calls [`push`](Self::push),
/// the engine side drains. When full, the incoming frame is dropped.
#[derive(Debug, Clone)]
pub struct Mailbox {
    queue: Arc<Mutex<VecDeque<RxFrame>>>,
    capacity: usize,
}

impl Mailbox {
    /// Create a mailbox holding at most `capacity` undelivered frames
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Enqueue a reception; returns `false` when the ring is full
    pub fn push(&self, frame: RxFrame) -> bool {
        let mut queue = self.queue.lock().expect("mailbox lock poisoned");
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(frame);
        true
    }

    /// Dequeue the oldest reception
    pub fn pop(&self) -> Option<RxFrame> {
        self.queue.lock().expect("mailbox lock poisoned").pop_front()
    }

    /// Number of undelivered frames
    pub fn len(&self) -> usize {
        self.queue.lock().expect("mailbox lock poisoned").len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
