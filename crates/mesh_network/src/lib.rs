//! Mesh Network: peer discovery and chat relay for broadcast radio meshes.
//!
//! Devices with no fixed topology find each other through periodic beacons,
//! keep a bounded table of known peers, and exchange short chat payloads
//! addressed to every current peer.
//!
//! # Architecture
//!
//! - **Transport**: a connectionless, broadcast-capable frame transport
//!   behind the [`Transport`] trait. Events come back over an ordered,
//!   capacity-limited event channel.
//!   An in-memory medium and a UDP broadcast transport are included.
//! - **Framing**: fixed-size [`MeshFrame`]s tagged `Beacon` or `Chat`.
//! - **Discovery**: a pluggable [`DiscoveryStrategy`] driven by the
//!   [`BeaconScheduler`].
//! - **Relay**: the [`RelayDispatcher`] updates the [`PeerTable`] and feeds
//!   chat into the bounded [`InboundQueue`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mesh_network::{MeshConfig, MeshNode, PeerAddress};
//! use mesh_network::transport::{EVENT_CHANNEL_CAPACITY, UdpTransport, event_channel};
//!
//! # async fn example() -> Result<(), mesh_network::MeshError> {
//! let config = MeshConfig::default();
//! let (event_tx, event_rx) = event_channel(EVENT_CHANNEL_CAPACITY);
//! let transport = UdpTransport::bind(PeerAddress::random(), &config.udp, config.channel, event_tx).await?;
//! let mut node = MeshNode::new(config, Arc::new(transport), event_rx);
//!
//! node.start()?;
//! if let Some(msg) = node.dequeue_inbound(Duration::from_secs(5)).await {
//!     println!("{}: {}", msg.sender, msg.text);
//! }
//! node.stop();
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod beacon;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod node;
pub mod peer;
pub mod queue;
pub mod stats;
pub mod transport;

// ── Re-exports for convenience ──────────────────────────────────────────

pub use address::PeerAddress;
pub use beacon::BeaconScheduler;
pub use config::MeshConfig;
pub use discovery::{AnnounceDiscovery, BeaconDiscovery, DiscoveryMode, DiscoveryStrategy};
pub use dispatcher::{DispatchOutcome, RelayDispatcher};
pub use error::MeshError;
pub use frame::{FRAME_SIZE, FrameKind, MAX_PAYLOAD, MeshFrame};
pub use node::{MeshNode, MessageBatch};
pub use peer::{AddOutcome, PeerEntry, PeerTable, RemoveOutcome};
pub use queue::{InboundQueue, RelayedMessage};
pub use stats::RelayStatsSnapshot;
pub use transport::{SendStatus, Transport, TransportEvent};
