//! Mesh error types.

use crate::address::PeerAddress;

/// Errors that can occur in the mesh_network crate.
///
/// Most of these are expected under normal operation (a full table, a full
/// queue, a malformed frame) and are reported rather than treated as fatal.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// A frame did not have exactly the fixed wire size.
    #[error("Wrong frame length: expected {expected}, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    /// A frame carried a kind byte we do not know.
    #[error("Unknown frame kind: {0}")]
    UnknownKind(u8),

    /// The peer table is at capacity.
    #[error("Peer table full ({0} peers)")]
    CapacityExceeded(usize),

    /// The local address was offered as a peer.
    #[error("Refusing to add own address as a peer")]
    IsSelf,

    /// A send was requested while no peers are known.
    #[error("No peers available")]
    NoPeers,

    /// The inbound queue is full and the message was dropped.
    #[error("Inbound queue full")]
    QueueFull,

    /// One or more per-peer sends failed. The other peers were still attempted.
    #[error("Send failed for {} of {attempted} peers", failed.len())]
    PartialFailure {
        failed: Vec<PeerAddress>,
        attempted: usize,
    },

    /// The transport cannot carry a full frame.
    #[error("Frame of {frame} bytes exceeds transport limit of {max}")]
    FrameTooLarge { frame: usize, max: usize },

    /// A transport-level error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The requested peer is not known to the transport.
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// A hardware address could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The node is not running.
    #[error("Node not running")]
    NotRunning,

    /// JSON serialization / deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
