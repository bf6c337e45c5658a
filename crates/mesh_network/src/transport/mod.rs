//! Transport boundary: the connectionless radio (or its stand-ins).
//!
//! A [`Transport`] sends raw frames to a single address or to
//! [`PeerAddress::BROADCAST`]. Everything coming back from the medium
//! (received frames, delivery status, disconnects) arrives as a typed
//! [`TransportEvent`] on the channel made by [`event_channel`].
//!
//! The channel keeps arrival order. Frames and send statuses count against
//! a fixed capacity; a frame that does not fit is dropped, counted and
//! logged. Disconnect notices are never dropped.

pub mod memory;
pub mod udp;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::address::PeerAddress;
use crate::error::MeshError;

pub use memory::{MemoryMedium, MemoryTransport, SentFrame};
pub use udp::{UdpConfig, UdpTransport};

/// Number of frames and send statuses that may wait for the node at once.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Outcome reported asynchronously for an accepted send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Success,
    Failure,
}

/// An event coming up from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A frame arrived from `source`.
    Received { source: PeerAddress, bytes: Vec<u8> },
    /// Delivery status for an earlier send to `destination`.
    SendStatus {
        destination: PeerAddress,
        status: SendStatus,
    },
    /// The link layer reported that `address` went away.
    PeerDisconnected { address: PeerAddress },
}

/// A broadcast-capable, connectionless frame transport.
///
/// All methods return promptly; `send` hands the frame to the medium and
/// reports delivery later through [`TransportEvent::SendStatus`].
pub trait Transport: Send + Sync {
    /// Our own hardware address on this medium.
    fn local_address(&self) -> PeerAddress;

    /// Largest frame the medium accepts.
    fn max_payload(&self) -> usize;

    /// Radio channel (or equivalent) the transport operates on.
    fn channel(&self) -> u8;

    /// Send `bytes` to `destination`, which may be the broadcast address.
    fn send(&self, destination: PeerAddress, bytes: &[u8]) -> Result<(), MeshError>;

    /// Prepare the medium for unicast to `address`. Registering an address
    /// twice is an error the caller is free to ignore.
    fn register_peer(&self, address: PeerAddress) -> Result<(), MeshError>;

    /// Forget `address` at the medium level.
    fn unregister_peer(&self, address: PeerAddress) -> Result<(), MeshError>;
}

/// Create the channel a transport uses to report [`TransportEvent`]s.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let gauge = Arc::new(EventGauge {
        capacity,
        pending: AtomicUsize::new(0),
        dropped_frames: AtomicU64::new(0),
    });
    (
        EventSender {
            tx,
            gauge: Arc::clone(&gauge),
        },
        EventReceiver { rx, gauge },
    )
}

/// Occupancy and loss accounting shared by both ends of an event channel.
#[derive(Debug)]
pub(crate) struct EventGauge {
    capacity: usize,
    pending: AtomicUsize,
    dropped_frames: AtomicU64,
}

impl EventGauge {
    fn try_reserve(&self) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Received frames discarded because the channel was at capacity.
    pub(crate) fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

/// Transport side of an event channel. Never blocks.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<TransportEvent>,
    gauge: Arc<EventGauge>,
}

impl EventSender {
    /// Push an event to the node.
    ///
    /// A `Received` event that finds the channel at capacity is dropped and
    /// counted; a `SendStatus` in the same position is dropped silently.
    /// `PeerDisconnected` always goes through.
    pub fn emit(&self, event: TransportEvent) {
        if let TransportEvent::PeerDisconnected { address } = event {
            if self.tx.send(event).is_err() {
                debug!("Event receiver gone, disconnect of {address} not delivered");
            }
            return;
        }

        if !self.gauge.try_reserve() {
            match &event {
                TransportEvent::Received { source, .. } => {
                    let total = self.gauge.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(from = %source, dropped_total = total, "Event channel full, dropping frame");
                }
                _ => trace!("Event channel full, dropping send status"),
            }
            return;
        }

        if self.tx.send(event).is_err() {
            self.gauge.release();
            trace!("Event receiver gone, event discarded");
        }
    }

    /// Received frames dropped so far because the channel was full.
    pub fn dropped_frames(&self) -> u64 {
        self.gauge.dropped_frames()
    }
}

/// Node side of an event channel.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    gauge: Arc<EventGauge>,
}

impl EventReceiver {
    /// Wait for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        let event = self.rx.recv().await?;
        if !matches!(event, TransportEvent::PeerDisconnected { .. }) {
            self.gauge.release();
        }
        Some(event)
    }

    /// Received frames dropped so far because the channel was full.
    pub fn dropped_frames(&self) -> u64 {
        self.gauge.dropped_frames()
    }

    pub(crate) fn gauge(&self) -> Arc<EventGauge> {
        Arc::clone(&self.gauge)
    }
}

/// Reject frames the medium cannot carry.
pub(crate) fn check_size(bytes: &[u8], max: usize) -> Result<(), MeshError> {
    if bytes.len() > max {
        return Err(MeshError::Transport(format!(
            "Frame of {} bytes exceeds medium limit of {max}",
            bytes.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> PeerAddress {
        PeerAddress::new([0x02, 0, 0, 0, 0, n])
    }

    fn frame_from(n: u8) -> TransportEvent {
        TransportEvent::Received {
            source: addr(n),
            bytes: vec![n],
        }
    }

    #[tokio::test]
    async fn test_overflow_frames_are_counted() {
        let (tx, mut rx) = event_channel(4);
        for n in 0..10 {
            tx.emit(frame_from(n));
        }
        assert_eq!(tx.dropped_frames(), 6);
        assert_eq!(rx.dropped_frames(), 6);

        // The first four made it, in order.
        for n in 0..4 {
            assert_eq!(rx.recv().await, Some(frame_from(n)));
        }

        // Draining frees the slots again.
        tx.emit(frame_from(42));
        assert_eq!(rx.recv().await, Some(frame_from(42)));
        assert_eq!(rx.dropped_frames(), 6);
    }

    #[tokio::test]
    async fn test_disconnect_bypasses_capacity_and_keeps_order() {
        let (tx, mut rx) = event_channel(2);
        tx.emit(frame_from(1));
        tx.emit(frame_from(2));
        tx.emit(frame_from(3));
        tx.emit(TransportEvent::PeerDisconnected { address: addr(2) });

        assert_eq!(rx.recv().await, Some(frame_from(1)));
        assert_eq!(rx.recv().await, Some(frame_from(2)));
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::PeerDisconnected { address: addr(2) })
        );
        assert_eq!(rx.dropped_frames(), 1);
    }

    #[tokio::test]
    async fn test_dropped_send_status_is_not_a_dropped_frame() {
        let (tx, _rx) = event_channel(1);
        tx.emit(frame_from(1));
        tx.emit(TransportEvent::SendStatus {
            destination: addr(2),
            status: SendStatus::Success,
        });
        assert_eq!(tx.dropped_frames(), 0);
    }

    #[tokio::test]
    async fn test_recv_ends_when_senders_gone() {
        let (tx, mut rx) = event_channel(4);
        tx.emit(frame_from(1));
        drop(tx);
        assert_eq!(rx.recv().await, Some(frame_from(1)));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_check_size() {
        assert!(check_size(&[0u8; 8], 8).is_ok());
        assert!(check_size(&[0u8; 9], 8).is_err());
    }
}
