//! In-process broadcast medium.
//!
//! Every [`MemoryTransport`] attached to the same [`MemoryMedium`] shares one
//! broadcast domain. Broadcasts reach every other node, unicasts reach the
//! matching node, and every accepted send is recorded so tests can inspect
//! exactly what went out on the air.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{
    EVENT_CHANNEL_CAPACITY, EventReceiver, EventSender, SendStatus, Transport, TransportEvent,
    check_size, event_channel,
};
use crate::address::PeerAddress;
use crate::error::MeshError;

/// Largest frame an in-memory node accepts (ESP-NOW v2 limit).
pub const MEMORY_MAX_PAYLOAD: usize = 1470;

/// A frame accepted by the medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub from: PeerAddress,
    pub destination: PeerAddress,
    pub bytes: Vec<u8>,
}

struct Station {
    address: PeerAddress,
    events: EventSender,
}

#[derive(Default)]
struct MediumState {
    stations: Vec<Station>,
    sent: Vec<SentFrame>,
    failing: HashSet<PeerAddress>,
}

/// A shared broadcast domain for [`MemoryTransport`]s.
#[derive(Clone, Default)]
pub struct MemoryMedium {
    state: Arc<Mutex<MediumState>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node at `address`, returning its transport and the receiver
    /// for its events.
    pub fn attach(
        &self,
        address: PeerAddress,
        channel: u8,
    ) -> (MemoryTransport, EventReceiver) {
        let (tx, rx) = event_channel(EVENT_CHANNEL_CAPACITY);
        self.state.lock().stations.push(Station {
            address,
            events: tx.clone(),
        });
        let transport = MemoryTransport {
            local: address,
            channel,
            medium: self.clone(),
            events: tx,
            registered: Mutex::new(HashSet::new()),
        };
        (transport, rx)
    }

    /// Remove the node at `address` from the medium and tell every remaining
    /// node that it disconnected.
    pub fn detach(&self, address: PeerAddress) {
        let mut state = self.state.lock();
        state.stations.retain(|s| s.address != address);
        for station in &state.stations {
            station.events.emit(TransportEvent::PeerDisconnected { address });
        }
    }

    /// Make every send towards `address` fail immediately.
    pub fn fail_sends_to(&self, address: PeerAddress) {
        self.state.lock().failing.insert(address);
    }

    /// Undo [`fail_sends_to`](Self::fail_sends_to).
    pub fn restore(&self, address: PeerAddress) {
        self.state.lock().failing.remove(&address);
    }

    /// Deliver raw bytes to every station except `source`, as if `source`
    /// had broadcast them. Nothing is recorded in [`sent`](Self::sent).
    pub fn inject(&self, source: PeerAddress, bytes: &[u8]) {
        let state = self.state.lock();
        for station in state.stations.iter().filter(|s| s.address != source) {
            station.events.emit(TransportEvent::Received {
                source,
                bytes: bytes.to_vec(),
            });
        }
    }

    /// Every frame accepted so far, in send order.
    pub fn sent(&self) -> Vec<SentFrame> {
        self.state.lock().sent.clone()
    }

    /// Frames sent by `from`.
    pub fn sent_by(&self, from: PeerAddress) -> Vec<SentFrame> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|f| f.from == from)
            .cloned()
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    fn transmit(
        &self,
        from: PeerAddress,
        destination: PeerAddress,
        bytes: &[u8],
    ) -> Result<SendStatus, MeshError> {
        let mut state = self.state.lock();
        if state.failing.contains(&destination) {
            return Err(MeshError::Transport(format!("Send to {destination} failed")));
        }

        state.sent.push(SentFrame {
            from,
            destination,
            bytes: bytes.to_vec(),
        });

        let mut delivered = false;
        for station in &state.stations {
            if station.address == from {
                continue;
            }
            if destination.is_broadcast() || station.address == destination {
                station.events.emit(TransportEvent::Received {
                    source: from,
                    bytes: bytes.to_vec(),
                });
                delivered = true;
            }
        }

        if delivered || destination.is_broadcast() {
            Ok(SendStatus::Success)
        } else {
            Ok(SendStatus::Failure)
        }
    }
}

/// One node's handle on a [`MemoryMedium`].
pub struct MemoryTransport {
    local: PeerAddress,
    channel: u8,
    medium: MemoryMedium,
    events: EventSender,
    registered: Mutex<HashSet<PeerAddress>>,
}

impl MemoryTransport {
    /// Addresses currently registered for unicast.
    pub fn registered_peers(&self) -> Vec<PeerAddress> {
        let mut peers: Vec<_> = self.registered.lock().iter().copied().collect();
        peers.sort();
        peers
    }
}

impl Transport for MemoryTransport {
    fn local_address(&self) -> PeerAddress {
        self.local
    }

    fn max_payload(&self) -> usize {
        MEMORY_MAX_PAYLOAD
    }

    fn channel(&self) -> u8 {
        self.channel
    }

    fn send(&self, destination: PeerAddress, bytes: &[u8]) -> Result<(), MeshError> {
        check_size(bytes, MEMORY_MAX_PAYLOAD)?;
        if !destination.is_broadcast() && !self.registered.lock().contains(&destination) {
            return Err(MeshError::Transport(format!("Peer {destination} not registered")));
        }

        let status = self.medium.transmit(self.local, destination, bytes)?;
        debug!(to = %destination, len = bytes.len(), "Memory medium accepted frame");
        self.events.emit(TransportEvent::SendStatus { destination, status });
        Ok(())
    }

    fn register_peer(&self, address: PeerAddress) -> Result<(), MeshError> {
        if self.registered.lock().insert(address) {
            Ok(())
        } else {
            Err(MeshError::Transport(format!("Peer {address} already registered")))
        }
    }

    fn unregister_peer(&self, address: PeerAddress) -> Result<(), MeshError> {
        if self.registered.lock().remove(&address) {
            Ok(())
        } else {
            Err(MeshError::Transport(format!("Peer {address} not registered")))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
