//! UDP broadcast transport.
//!
//! Stands in for the radio on ordinary IP networks. Each datagram is the
//! sender's 6-byte hardware address followed by the frame. Unicast routes
//! (hardware address → socket address) are learned from received datagrams.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{EventSender, SendStatus, Transport, TransportEvent, check_size};
use crate::address::{ADDRESS_LEN, PeerAddress};
use crate::error::MeshError;

/// Largest frame carried in one datagram.
pub const UDP_MAX_PAYLOAD: usize = 1400;

const RECV_BACKOFF_MIN: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Socket settings for [`UdpTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Local address to bind.
    pub bind_addr: SocketAddr,
    /// Where frames sent to [`PeerAddress::BROADCAST`] go.
    pub broadcast_addr: SocketAddr,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8888)),
            broadcast_addr: SocketAddr::from(([255, 255, 255, 255], 8888)),
        }
    }
}

type Routes = Arc<RwLock<HashMap<PeerAddress, SocketAddr>>>;

/// A [`Transport`] over a broadcast-enabled UDP socket.
pub struct UdpTransport {
    local: PeerAddress,
    channel: u8,
    socket: Arc<UdpSocket>,
    broadcast_addr: SocketAddr,
    routes: Routes,
    events: EventSender,
    recv_task: JoinHandle<()>,
}

impl UdpTransport {
    /// Bind the socket and start the receive loop.
    pub async fn bind(
        local: PeerAddress,
        config: &UdpConfig,
        channel: u8,
        events: EventSender,
    ) -> Result<Self, MeshError> {
        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(|e| MeshError::Transport(format!("Bind {} failed: {e}", config.bind_addr)))?;
        socket
            .set_broadcast(true)
            .map_err(|e| MeshError::Transport(format!("Set broadcast: {e}")))?;
        let socket = Arc::new(socket);

        info!(
            "UDP transport for {local} listening on {}",
            socket.local_addr().map_err(MeshError::Io)?
        );

        let routes: Routes = Arc::new(RwLock::new(HashMap::new()));
        let recv_task = tokio::spawn(receive_loop(
            local,
            Arc::clone(&socket),
            Arc::clone(&routes),
            events.clone(),
        ));

        Ok(Self {
            local,
            channel,
            socket,
            broadcast_addr: config.broadcast_addr,
            routes,
            events,
            recv_task,
        })
    }

    /// The socket address actually bound.
    pub fn socket_addr(&self) -> Result<SocketAddr, MeshError> {
        Ok(self.socket.local_addr()?)
    }

    /// The learned socket address for `peer`, if any.
    pub fn route(&self, peer: &PeerAddress) -> Option<SocketAddr> {
        self.routes.read().get(peer).copied()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

impl Transport for UdpTransport {
    fn local_address(&self) -> PeerAddress {
        self.local
    }

    fn max_payload(&self) -> usize {
        UDP_MAX_PAYLOAD
    }

    fn channel(&self) -> u8 {
        self.channel
    }

    fn send(&self, destination: PeerAddress, bytes: &[u8]) -> Result<(), MeshError> {
        check_size(bytes, UDP_MAX_PAYLOAD)?;
        let target = if destination.is_broadcast() {
            self.broadcast_addr
        } else {
            self.route(&destination)
                .ok_or_else(|| MeshError::Transport(format!("No route to {destination}")))?
        };

        let mut datagram = Vec::with_capacity(ADDRESS_LEN + bytes.len());
        datagram.extend_from_slice(self.local.as_bytes());
        datagram.extend_from_slice(bytes);

        self.socket
            .try_send_to(&datagram, target)
            .map_err(|e| MeshError::Transport(format!("Send to {target} failed: {e}")))?;

        trace!(to = %destination, %target, len = bytes.len(), "Datagram sent");
        self.events.emit(TransportEvent::SendStatus {
            destination,
            status: SendStatus::Success,
        });
        Ok(())
    }

    fn register_peer(&self, address: PeerAddress) -> Result<(), MeshError> {
        if self.routes.read().contains_key(&address) {
            Ok(())
        } else {
            Err(MeshError::Transport(format!("No route to {address} yet")))
        }
    }

    fn unregister_peer(&self, address: PeerAddress) -> Result<(), MeshError> {
        self.routes
            .write()
            .remove(&address)
            .map(|_| ())
            .ok_or_else(|| MeshError::PeerNotFound(address.to_string()))
    }
}

async fn receive_loop(
    local: PeerAddress,
    socket: Arc<UdpSocket>,
    routes: Routes,
    events: EventSender,
) {
    let mut buf = vec![0u8; ADDRESS_LEN + UDP_MAX_PAYLOAD];
    let mut failures: u32 = 0;
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                failures = 0;
                if len < ADDRESS_LEN {
                    trace!("Runt datagram ({len} bytes) from {from}");
                    continue;
                }
                let Ok(source) = PeerAddress::from_slice(&buf[..ADDRESS_LEN]) else {
                    continue;
                };
                // Our own broadcasts come back on the same socket.
                if source == local {
                    continue;
                }

                let previous = routes.write().insert(source, from);
                if previous != Some(from) {
                    debug!("Learned route {source} -> {from}");
                }

                events.emit(TransportEvent::Received {
                    source,
                    bytes: buf[ADDRESS_LEN..len].to_vec(),
                });
            }
            Err(e) => {
                let delay = recv_backoff(failures);
                failures = failures.saturating_add(1);
                warn!("UDP recv error (retrying in {delay:?}): {e}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Delay before the next receive after `failures` consecutive errors.
fn recv_backoff(failures: u32) -> Duration {
    RECV_BACKOFF_MIN
        .saturating_mul(2u32.saturating_pow(failures))
        .min(RECV_BACKOFF_MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
