//! Peer discovery strategies.
//!
//! A [`DiscoveryStrategy`] decides what the beacon scheduler broadcasts and
//! recognises the matching packets on the receive path. Two strategies ship:
//!
//! - [`BeaconDiscovery`]: a regular [`FrameKind::Beacon`] frame.
//! - [`AnnounceDiscovery`]: a short text announcement,
//!   `MESH-NOW:<12 hex digits>`, for transports shared with other traffic.

use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;
use crate::frame::{FrameKind, MeshFrame};

/// Prefix of a text announcement.
pub const ANNOUNCE_PREFIX: &str = "MESH-NOW:";

/// How a node announces itself and recognises others.
pub trait DiscoveryStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// The packet to broadcast on each beacon tick.
    fn emit(&self, local: PeerAddress, timestamp: u32) -> Vec<u8>;

    /// If `bytes` is a discovery packet, the address it announces.
    ///
    /// `frame` is `bytes` already decoded, when `bytes` is a valid frame.
    fn classify(&self, bytes: &[u8], frame: Option<&MeshFrame>) -> Option<PeerAddress>;
}

/// Which built-in strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    #[default]
    Beacon,
    Announce,
}

impl DiscoveryMode {
    /// Build the strategy for this mode.
    pub fn strategy(self) -> Box<dyn DiscoveryStrategy> {
        match self {
            Self::Beacon => Box::new(BeaconDiscovery),
            Self::Announce => Box::new(AnnounceDiscovery),
        }
    }
}

/// Discovery through fixed-size beacon frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeaconDiscovery;

impl DiscoveryStrategy for BeaconDiscovery {
    fn name(&self) -> &'static str {
        "beacon"
    }

    fn emit(&self, local: PeerAddress, timestamp: u32) -> Vec<u8> {
        MeshFrame::beacon(local, timestamp).encode().to_vec()
    }

    fn classify(&self, _bytes: &[u8], frame: Option<&MeshFrame>) -> Option<PeerAddress> {
        frame
            .filter(|f| f.kind == FrameKind::Beacon)
            .map(|f| f.sender)
    }
}

/// Discovery through `MESH-NOW:<hex address>` text packets.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnounceDiscovery;

impl DiscoveryStrategy for AnnounceDiscovery {
    fn name(&self) -> &'static str {
        "announce"
    }

    fn emit(&self, local: PeerAddress, _timestamp: u32) -> Vec<u8> {
        format!("{ANNOUNCE_PREFIX}{}", local.to_compact_hex()).into_bytes()
    }

    fn classify(&self, bytes: &[u8], frame: Option<&MeshFrame>) -> Option<PeerAddress> {
        if frame.is_some() {
            return None;
        }
        let text = std::str::from_utf8(bytes).ok()?;
        let hex = text.strip_prefix(ANNOUNCE_PREFIX)?;
        let hex = hex.trim_end_matches(['\0', '\r', '\n', ' ']);
        PeerAddress::from_compact_hex(hex).ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
