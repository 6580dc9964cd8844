//! Frame types and wire codec
//!
//! This module defines the on-air frame layout and the codec between
//! in-memory frames and raw bytes.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬───────────┐
//! │ type (1) │ src (6)  │ dst (6)  │ hops (1) │ seq (2)  │ len (2)  │ data (≤200)│
//! └──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴───────────┘
//! ```
//!
//! The header is a fixed 18 bytes; multi-byte integers are little-endian.
//! The layout is byte-exact and never produced by struct copy, so it is
//! identical across hosts regardless of endianness or padding.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 18;

/// Maximum payload size in bytes
pub const MAX_DATA_SIZE: usize = 200;

/// Maximum total frame size on the wire
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_DATA_SIZE;

/// Node address - the 6-byte link-layer MAC
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Broadcast address (all 0xFF)
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    /// Create a new address from 6 bytes
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        MacAddr(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Read an address from the first 6 bytes of a slice
    ///
    /// Returns `None` when fewer than 6 bytes are available.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(MacAddr(raw))
    }

    /// Check if this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Frame types carried in the first header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    /// Neighbor announcement; payload byte 0 is the sender's gateway flag
    Discovery = 0x01,
    /// Periodic liveness beacon; payload is `[peer_count, gateway_flag]`
    Heartbeat = 0x02,
    /// Application payload for a named destination
    Data = 0x03,
    /// Query for a route; payload is the 6-byte destination
    RouteRequest = 0x04,
    /// Answer to a route request; payload is destination + hop count
    RouteReply = 0x05,
    /// Reserved for link-level acknowledgements
    Ack = 0x06,
}

impl FrameType {
    /// Parse from the wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(FrameType::Discovery),
            0x02 => Some(FrameType::Heartbeat),
            0x03 => Some(FrameType::Data),
            0x04 => Some(FrameType::RouteRequest),
            0x05 => Some(FrameType::RouteReply),
            0x06 => Some(FrameType::Ack),
            _ => None,
        }
    }
}

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Fewer bytes than the fixed header
    #[error("frame too short: {0} bytes, need at least {HEADER_SIZE}")]
    ShortFrame(usize),

    /// Declared payload length exceeds the buffer or the payload cap
    #[error("bad payload length {declared} with {available} bytes available")]
    BadLength { declared: usize, available: usize },

    /// Type byte outside the known enumeration
    #[error("unknown frame type {0:#04x}")]
    UnknownType(u8),

    /// Payload exceeds the frame cap on encode
    #[error("payload of {0} bytes exceeds maximum of {MAX_DATA_SIZE}")]
    Oversize(usize),
}

/// A complete mesh frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame type
    pub frame_type: FrameType,
    /// Originator's address; never rewritten in flight
    pub src: MacAddr,
    /// Ultimate destination; broadcast permitted for discovery/heartbeat
    pub dst: MacAddr,
    /// Number of forwards so far
    pub hop_count: u8,
    /// Originator-local counter used for duplicate detection
    pub sequence: u16,
    /// Application payload
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame with an empty payload
    pub fn new(frame_type: FrameType, src: MacAddr, dst: MacAddr, sequence: u16) -> Self {
        Self {
            frame_type,
            src,
            dst,
            hop_count: 0,
            sequence,
            data: Vec::new(),
        }
    }

    /// Create a broadcast frame
    pub fn broadcast(frame_type: FrameType, src: MacAddr, sequence: u16, data: &[u8]) -> Self {
        Self {
            frame_type,
            src,
            dst: MacAddr::BROADCAST,
            hop_count: 0,
            sequence,
            data: data.to_vec(),
        }
    }

    /// Total size of this frame on the wire
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.data.len()
    }

    /// Serialize to wire bytes
    ///
    /// Fails only when the payload exceeds [`MAX_DATA_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.data.len() > MAX_DATA_SIZE {
            return Err(WireError::Oversize(self.data.len()));
        }

        let mut bytes = Vec::with_capacity(self.wire_size());
        bytes.push(self.frame_type as u8);
        bytes.extend_from_slice(self.src.as_bytes());
        bytes.extend_from_slice(self.dst.as_bytes());
        bytes.push(self.hop_count);
        bytes.extend_from_slice(&self.sequence.to_le_bytes());
        bytes.extend_from_slice(&(self.data.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&self.data);
        Ok(bytes)
    }

    /// Deserialize from wire bytes
    ///
    /// Trailing bytes beyond the declared payload length are ignored; the
    /// link layer may pad frames.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_SIZE {
            return Err(WireError::ShortFrame(bytes.len()));
        }

        let frame_type =
            FrameType::from_byte(bytes[0]).ok_or(WireError::UnknownType(bytes[0]))?;
        // Slices are header-checked above; from_slice cannot fail here.
        let src = MacAddr::from_slice(&bytes[1..7]).ok_or(WireError::ShortFrame(bytes.len()))?;
        let dst = MacAddr::from_slice(&bytes[7..13]).ok_or(WireError::ShortFrame(bytes.len()))?;
        let hop_count = bytes[13];
        let sequence = u16::from_le_bytes([bytes[14], bytes[15]]);
        let data_len = u16::from_le_bytes([bytes[16], bytes[17]]) as usize;

        let available = bytes.len() - HEADER_SIZE;
        if data_len > available || data_len > MAX_DATA_SIZE {
            return Err(WireError::BadLength {
                declared: data_len,
                available,
            });
        }

        Ok(Self {
            frame_type,
            src,
            dst,
            hop_count,
            sequence,
            data: bytes[HEADER_SIZE..HEADER_SIZE + data_len].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> MacAddr {
        MacAddr::from_bytes([0x02, 0x00, 0x00, 0x00, 0x00, last])
    }

    #[test]
    fn test_mac_addr() {
        let a = MacAddr::from_bytes([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(a.to_string(), "AA:BB:CC:DD:EE:FF");
        assert!(!a.is_broadcast());
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert_eq!(MacAddr::from_slice(&[1, 2, 3]), None);
    }

    #[test]
    fn test_frame_type_from_byte() {
        assert_eq!(FrameType::from_byte(0x01), Some(FrameType::Discovery));
        assert_eq!(FrameType::from_byte(0x06), Some(FrameType::Ack));
        assert_eq!(FrameType::from_byte(0x07), None);
        assert_eq!(FrameType::from_byte(0x00), None);
    }

    #[test]
    fn test_encode_layout() {
        let mut frame = Frame::broadcast(FrameType::Data, addr(1), 0x0203, b"hi");
        frame.dst = addr(2);
        frame.hop_count = 4;

        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(bytes[0], 0x03); // type
        assert_eq!(&bytes[1..7], addr(1).as_bytes()); // src
        assert_eq!(&bytes[7..13], addr(2).as_bytes()); // dst
        assert_eq!(bytes[13], 4); // hop count
        assert_eq!(&bytes[14..16], &[0x03, 0x02]); // sequence, little-endian
        assert_eq!(&bytes[16..18], &[0x02, 0x00]); // data_len, little-endian
        assert_eq!(&bytes[18..], b"hi");
    }

    #[test]
    fn test_roundtrip() {
        for len in [0usize, 1, 7, 199, 200] {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let mut frame = Frame::broadcast(FrameType::RouteReply, addr(9), 0xFFFF, &payload);
            frame.dst = addr(3);
            frame.hop_count = 2;

            let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn test_encode_oversize() {
        let frame = Frame::broadcast(FrameType::Data, addr(1), 0, &[0u8; 201]);
        assert_eq!(frame.encode(), Err(WireError::Oversize(201)));
    }

    #[test]
    fn test_decode_short_frame() {
        assert_eq!(Frame::decode(&[]), Err(WireError::ShortFrame(0)));
        assert_eq!(Frame::decode(&[0x01; 17]), Err(WireError::ShortFrame(17)));
    }

    #[test]
    fn test_decode_bad_length() {
        let mut bytes = Frame::broadcast(FrameType::Data, addr(1), 7, b"abc")
            .encode()
            .unwrap();
        // Declare more payload than is present
        bytes[16] = 0x04;
        assert_eq!(
            Frame::decode(&bytes),
            Err(WireError::BadLength {
                declared: 4,
                available: 3
            })
        );

        // Declared length over the cap is rejected even with bytes present
        let mut big = vec![0u8; HEADER_SIZE + 201];
        big[0] = 0x02;
        big[16..18].copy_from_slice(&201u16.to_le_bytes());
        assert!(matches!(
            Frame::decode(&big),
            Err(WireError::BadLength { declared: 201, .. })
        ));
    }

    #[test]
    fn test_decode_unknown_type() {
        let mut bytes = Frame::broadcast(FrameType::Heartbeat, addr(1), 7, &[])
            .encode()
            .unwrap();
        bytes[0] = 0x7F;
        assert_eq!(Frame::decode(&bytes), Err(WireError::UnknownType(0x7F)));
    }

    #[test]
    fn test_decode_ignores_trailing_padding() {
        let frame = Frame::broadcast(FrameType::Heartbeat, addr(5), 1, &[3, 1]);
        let mut bytes = frame.encode().unwrap();
        bytes.extend_from_slice(&[0u8; 16]);

        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded.data, vec![3, 1]);
    }
}
