//! Configuration for a mesh node.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;
use crate::beacon::DEFAULT_BEACON_INTERVAL;
use crate::discovery::DiscoveryMode;
use crate::peer::DEFAULT_MAX_PEERS;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::transport::UdpConfig;

/// Configuration for the mesh layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Hardware address to use. A random locally-administered address is
    /// generated when absent.
    pub local_address: Option<PeerAddress>,

    /// Maximum number of peers kept in the peer table.
    pub max_peers: usize,

    /// Number of inbound messages buffered for the consumer.
    pub queue_capacity: usize,

    /// Interval between discovery broadcasts.
    #[serde(with = "duration_ms_serde")]
    pub beacon_interval: Duration,

    /// How often the node logs its peer count while it has peers.
    #[serde(with = "duration_ms_serde")]
    pub peer_report_interval: Duration,

    /// Radio channel.
    pub channel: u8,

    /// Discovery strategy.
    pub discovery: DiscoveryMode,

    /// Maximum messages handed out by one drain call.
    pub drain_batch: usize,

    /// UDP transport settings.
    pub udp: UdpConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            local_address: None,
            max_peers: DEFAULT_MAX_PEERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            beacon_interval: DEFAULT_BEACON_INTERVAL,
            peer_report_interval: Duration::from_secs(10),
            channel: 1,
            discovery: DiscoveryMode::Beacon,
            drain_batch: 10,
            udp: UdpConfig::default(),
        }
    }
}

impl MeshConfig {
    /// Save the config to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directory: {e}"))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, json).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Load config from a JSON file, or return defaults if the file is missing.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<MeshConfig>(&data) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Corrupt config file, using defaults: {e}");
                    }
                },
                Err(e) => {
                    tracing::warn!("Cannot read config file, using defaults: {e}");
                }
            }
        }
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(dur: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(dur.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
