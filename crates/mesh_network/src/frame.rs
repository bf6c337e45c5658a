//! Wire framing: fixed-size typed frames.
//!
//! Every frame on the air has the same length, [`FRAME_SIZE`]:
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 0      | 1    | kind (`Beacon` = 0, `Chat` = 1) |
//! | 1      | 6    | sender hardware address |
//! | 7      | 256  | payload, NUL padded |
//! | 263    | 4    | timestamp, milliseconds, little-endian |
//!
//! Anything that is not exactly `FRAME_SIZE` bytes is rejected before any
//! field is looked at.

use serde::{Deserialize, Serialize};

use crate::address::{ADDRESS_LEN, PeerAddress};
use crate::error::MeshError;

/// Maximum payload bytes carried by a frame.
pub const MAX_PAYLOAD: usize = 256;

const KIND_OFFSET: usize = 0;
const SENDER_OFFSET: usize = KIND_OFFSET + 1;
const PAYLOAD_OFFSET: usize = SENDER_OFFSET + ADDRESS_LEN;
const TIMESTAMP_OFFSET: usize = PAYLOAD_OFFSET + MAX_PAYLOAD;

/// Total size of an encoded frame.
pub const FRAME_SIZE: usize = TIMESTAMP_OFFSET + 4;

/// Payload carried by every beacon.
pub const BEACON_SENTINEL: &[u8] = b"MESH-NOW-BEACON";

/// Discriminant of a [`MeshFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FrameKind {
    /// Discovery-only announcement.
    Beacon = 0,
    /// User payload for all peers.
    Chat = 1,
}

impl FrameKind {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Result<Self, MeshError> {
        match byte {
            0 => Ok(Self::Beacon),
            1 => Ok(Self::Chat),
            other => Err(MeshError::UnknownKind(other)),
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshFrame {
    pub kind: FrameKind,
    pub sender: PeerAddress,
    /// Payload bytes up to the first NUL, at most [`MAX_PAYLOAD`].
    pub payload: Vec<u8>,
    /// Sender-local monotonic milliseconds. Not comparable across devices.
    pub timestamp: u32,
}

impl MeshFrame {
    /// Build a frame, truncating the payload to [`MAX_PAYLOAD`].
    pub fn new(kind: FrameKind, sender: PeerAddress, payload: &[u8], timestamp: u32) -> Self {
        Self {
            kind,
            sender,
            payload: clip_payload(payload).to_vec(),
            timestamp,
        }
    }

    /// A beacon from `sender`.
    pub fn beacon(sender: PeerAddress, timestamp: u32) -> Self {
        Self::new(FrameKind::Beacon, sender, BEACON_SENTINEL, timestamp)
    }

    /// A chat frame from `sender` carrying `text`.
    pub fn chat(sender: PeerAddress, text: &str, timestamp: u32) -> Self {
        Self::new(FrameKind::Chat, sender, text.as_bytes(), timestamp)
    }

    /// The payload as text. Invalid UTF-8 is replaced, not rejected.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Encode this frame to its wire form.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        encode(self.kind, self.sender, &self.payload, self.timestamp)
    }
}

/// Encode a frame. Short payloads are zero-padded, long ones truncated.
pub fn encode(
    kind: FrameKind,
    sender: PeerAddress,
    payload: &[u8],
    timestamp: u32,
) -> [u8; FRAME_SIZE] {
    let mut buf = [0u8; FRAME_SIZE];
    buf[KIND_OFFSET] = kind.as_byte();
    buf[SENDER_OFFSET..PAYLOAD_OFFSET].copy_from_slice(sender.as_bytes());

    let payload = clip_payload(payload);
    buf[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);

    buf[TIMESTAMP_OFFSET..].copy_from_slice(&timestamp.to_le_bytes());
    buf
}

/// Decode a frame. The buffer must be exactly [`FRAME_SIZE`] bytes.
pub fn decode(bytes: &[u8]) -> Result<MeshFrame, MeshError> {
    if bytes.len() != FRAME_SIZE {
        return Err(MeshError::WrongLength {
            expected: FRAME_SIZE,
            actual: bytes.len(),
        });
    }

    let kind = FrameKind::from_byte(bytes[KIND_OFFSET])?;
    let sender = PeerAddress::from_slice(&bytes[SENDER_OFFSET..PAYLOAD_OFFSET])?;

    let field = &bytes[PAYLOAD_OFFSET..TIMESTAMP_OFFSET];
    let end = field.iter().position(|&b| b == 0).unwrap_or(MAX_PAYLOAD);
    let payload = field[..end].to_vec();

    let mut ts = [0u8; 4];
    ts.copy_from_slice(&bytes[TIMESTAMP_OFFSET..]);

    Ok(MeshFrame {
        kind,
        sender,
        payload,
        timestamp: u32::from_le_bytes(ts),
    })
}

/// Payload bytes as they will appear on the wire: cut at the first NUL and
/// at [`MAX_PAYLOAD`].
fn clip_payload(payload: &[u8]) -> &[u8] {
    let bounded = &payload[..payload.len().min(MAX_PAYLOAD)];
    let end = bounded.iter().position(|&b| b == 0).unwrap_or(bounded.len());
    &bounded[..end]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
