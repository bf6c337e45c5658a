//! Relay dispatcher: classifies inbound frames and fans out outbound chat.
//!
//! The receive path never blocks and never fails: malformed or self-sent
//! frames are dropped, peer-table outcomes are advisory, and a full inbound
//! queue drops the message. The send path encodes one chat frame and issues
//! one unicast per known peer.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::address::PeerAddress;
use crate::clock::Clock;
use crate::discovery::DiscoveryStrategy;
use crate::error::MeshError;
use crate::frame::{self, FrameKind, MeshFrame};
use crate::peer::{AddOutcome, PeerTable, RemoveOutcome};
use crate::queue::{InboundQueue, RelayedMessage};
use crate::stats::RelayStats;
use crate::transport::{SendStatus, Transport, TransportEvent};

/// What the receive path did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a valid frame; dropped without side effects.
    Malformed,
    /// Sent by this node; dropped.
    FromSelf,
    /// A discovery packet; its only effect was on the peer table.
    Discovered(PeerAddress),
    /// A chat frame; a message was queued for the consumer.
    Delivered(PeerAddress),
    /// A chat frame that could not be queued because the queue was full.
    QueueFull(PeerAddress),
    /// A chat frame the queue refused for any other reason.
    Undeliverable(PeerAddress),
}

/// Shared receive/send logic for one node.
pub struct RelayDispatcher {
    local: PeerAddress,
    peers: Arc<RwLock<PeerTable>>,
    queue: Arc<InboundQueue>,
    transport: Arc<dyn Transport>,
    strategy: Arc<dyn DiscoveryStrategy>,
    clock: Clock,
    stats: RelayStats,
}

impl RelayDispatcher {
    pub fn new(
        peers: Arc<RwLock<PeerTable>>,
        queue: Arc<InboundQueue>,
        transport: Arc<dyn Transport>,
        strategy: Arc<dyn DiscoveryStrategy>,
        clock: Clock,
    ) -> Self {
        let local = transport.local_address();
        Self {
            local,
            peers,
            queue,
            transport,
            strategy,
            clock,
            stats: RelayStats::default(),
        }
    }

    pub fn local_address(&self) -> PeerAddress {
        self.local
    }

    pub fn peers(&self) -> &Arc<RwLock<PeerTable>> {
        &self.peers
    }

    pub fn queue(&self) -> &Arc<InboundQueue> {
        &self.queue
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Handle one event from the transport.
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Received { source, bytes } => {
                self.handle_frame(source, &bytes);
            }
            TransportEvent::SendStatus {
                destination,
                status: SendStatus::Success,
            } => {
                debug!("Frame delivered to {destination}");
            }
            TransportEvent::SendStatus {
                destination,
                status: SendStatus::Failure,
            } => {
                warn!("Failed to deliver frame to {destination}");
            }
            TransportEvent::PeerDisconnected { address } => {
                self.handle_disconnect(address);
            }
        }
    }

    /// Classify an inbound frame and apply its effects.
    pub fn handle_frame(&self, source: PeerAddress, bytes: &[u8]) -> DispatchOutcome {
        self.stats.record_received();
        trace!(from = %source, len = bytes.len(), "Frame received");

        let decoded = frame::decode(bytes);
        if let Some(announced) = self.strategy.classify(bytes, decoded.as_ref().ok()) {
            if announced == self.local {
                self.stats.record_from_self();
                return DispatchOutcome::FromSelf;
            }
            self.stats.record_beacon();
            self.observe(announced);
            return DispatchOutcome::Discovered(announced);
        }

        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                trace!(from = %source, "Dropping frame: {e}");
                self.stats.record_malformed();
                return DispatchOutcome::Malformed;
            }
        };

        if frame.sender == self.local {
            self.stats.record_from_self();
            return DispatchOutcome::FromSelf;
        }

        self.observe(frame.sender);

        match frame.kind {
            FrameKind::Beacon => {
                self.stats.record_beacon();
                DispatchOutcome::Discovered(frame.sender)
            }
            FrameKind::Chat => {
                self.stats.record_chat();
                match self.queue.try_enqueue(RelayedMessage::from_frame(&frame)) {
                    Ok(()) => DispatchOutcome::Delivered(frame.sender),
                    Err(MeshError::QueueFull) => {
                        self.stats.record_queue_drop();
                        DispatchOutcome::QueueFull(frame.sender)
                    }
                    Err(e) => {
                        warn!(from = %frame.sender, "Inbound queue refused message: {e}");
                        DispatchOutcome::Undeliverable(frame.sender)
                    }
                }
            }
        }
    }

    /// Send `text` to every known peer, one unicast each.
    ///
    /// Returns the number of peers addressed. Fails with
    /// [`MeshError::NoPeers`] (nothing transmitted) when the table is empty,
    /// and with [`MeshError::PartialFailure`] when any individual send
    /// failed; the remaining peers are still attempted.
    pub fn send_to_all(&self, text: &str) -> Result<usize, MeshError> {
        let targets = self.peers.read().addresses();
        if targets.is_empty() {
            info!("No peers available, message not sent");
            return Err(MeshError::NoPeers);
        }

        let bytes = MeshFrame::chat(self.local, text, self.clock.now_ms()).encode();

        let mut failed = Vec::new();
        for peer in &targets {
            if let Err(e) = self.transport.send(*peer, &bytes) {
                warn!("Send to {peer} failed: {e}");
                failed.push(*peer);
            }
        }

        if failed.is_empty() {
            info!(peers = targets.len(), "Sent message");
            Ok(targets.len())
        } else {
            self.stats.record_send_failures(failed.len());
            Err(MeshError::PartialFailure {
                failed,
                attempted: targets.len(),
            })
        }
    }

    /// Forget a peer after the link layer reported it gone.
    pub fn handle_disconnect(&self, address: PeerAddress) -> RemoveOutcome {
        let outcome = self.peers.write().remove(&address);
        if outcome == RemoveOutcome::Removed {
            if let Err(e) = self.transport.unregister_peer(address) {
                debug!("Transport unregister of {address} ignored: {e}");
            }
        }
        outcome
    }

    /// Record `address` in the peer table. The outcome is advisory only.
    fn observe(&self, address: PeerAddress) {
        let outcome = self.peers.write().add(address);
        match outcome {
            Ok(AddOutcome::Added) => {
                if let Err(e) = self.transport.register_peer(address) {
                    debug!("Transport registration of {address} ignored: {e}");
                }
            }
            Ok(AddOutcome::AlreadyPresent) => {}
            Err(MeshError::CapacityExceeded(_)) => self.stats.record_capacity_rejection(),
            Err(e) => trace!("Not adding {address}: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{AnnounceDiscovery, BeaconDiscovery};
    use crate::transport::{MemoryMedium, MemoryTransport};

    const LOCAL: PeerAddress = PeerAddress::new([0x02, 0, 0, 0, 0, 0x01]);

    fn remote(n: u8) -> PeerAddress {
        PeerAddress::new([0x0a, 0, 0, 0, 0, n])
    }

    fn setup_with(
        strategy: Arc<dyn DiscoveryStrategy>,
        max_peers: usize,
        queue_capacity: usize,
    ) -> (RelayDispatcher, MemoryMedium, Arc<MemoryTransport>) {
        let medium = MemoryMedium::new();
        let (transport, _rx) = medium.attach(LOCAL, 1);
        let transport = Arc::new(transport);
        let dispatcher = RelayDispatcher::new(
            Arc::new(RwLock::new(PeerTable::new(LOCAL, max_peers))),
            Arc::new(InboundQueue::new(queue_capacity)),
            transport.clone(),
            strategy,
            Clock::new(),
        );
        (dispatcher, medium, transport)
    }

    fn setup() -> (RelayDispatcher, MemoryMedium, Arc<MemoryTransport>) {
        setup_with(Arc::new(BeaconDiscovery), 20, 50)
    }

    #[test]
    fn test_malformed_frame_has_no_side_effect() {
        let (dispatcher, _medium, _t) = setup();
        let outcome = dispatcher.handle_frame(remote(1), b"short");
        assert_eq!(outcome, DispatchOutcome::Malformed);
        assert_eq!(dispatcher.peers().read().count(), 0);
        assert!(dispatcher.queue().is_empty());
        assert_eq!(dispatcher.stats().snapshot().malformed, 1);
    }

    #[test]
    fn test_self_frames_dropped() {
        let (dispatcher, _medium, _t) = setup();
        let beacon = MeshFrame::beacon(LOCAL, 1).encode();
        let chat = MeshFrame::chat(LOCAL, "echo", 1).encode();
        assert_eq!(dispatcher.handle_frame(LOCAL, &beacon), DispatchOutcome::FromSelf);
        assert_eq!(dispatcher.handle_frame(LOCAL, &chat), DispatchOutcome::FromSelf);
        assert_eq!(dispatcher.peers().read().count(), 0);
        assert!(dispatcher.queue().is_empty());
    }

    #[test]
    fn test_beacon_adds_peer_only() {
        let (dispatcher, _medium, transport) = setup();
        let beacon = MeshFrame::beacon(remote(1), 10).encode();
        assert_eq!(
            dispatcher.handle_frame(remote(1), &beacon),
            DispatchOutcome::Discovered(remote(1))
        );
        assert_eq!(dispatcher.peers().read().count(), 1);
        assert!(dispatcher.queue().is_empty());
        assert_eq!(transport.registered_peers(), vec![remote(1)]);

        // A second beacon changes nothing.
        dispatcher.handle_frame(remote(1), &beacon);
        assert_eq!(dispatcher.peers().read().count(), 1);
    }

    #[tokio::test]
    async fn test_chat_adds_peer_and_queues_message() {
        let (dispatcher, _medium, _t) = setup();
        let chat = MeshFrame::chat(remote(2), "hello", 4242).encode();
        assert_eq!(
            dispatcher.handle_frame(remote(2), &chat),
            DispatchOutcome::Delivered(remote(2))
        );
        assert_eq!(dispatcher.peers().read().addresses(), vec![remote(2)]);

        let msg = dispatcher.queue().drain(10).await;
        assert_eq!(
            msg,
            vec![RelayedMessage {
                sender: remote(2),
                text: "hello".to_string(),
                timestamp: 4242,
            }]
        );
    }

    #[test]
    fn test_full_queue_drops_and_reports() {
        let (dispatcher, _medium, _t) = setup_with(Arc::new(BeaconDiscovery), 20, 2);
        for n in 0..2 {
            let chat = MeshFrame::chat(remote(3), &format!("m{n}"), n).encode();
            dispatcher.handle_frame(remote(3), &chat);
        }
        let overflow = MeshFrame::chat(remote(3), "one too many", 9).encode();
        assert_eq!(
            dispatcher.handle_frame(remote(3), &overflow),
            DispatchOutcome::QueueFull(remote(3))
        );
        assert_eq!(dispatcher.queue().len(), 2);
        assert_eq!(dispatcher.stats().snapshot().queue_drops, 1);
    }

    #[tokio::test]
    async fn test_chat_from_unknown_peer_when_table_full_still_delivered() {
        let (dispatcher, _medium, _t) = setup_with(Arc::new(BeaconDiscovery), 1, 10);
        dispatcher.handle_frame(remote(1), &MeshFrame::beacon(remote(1), 1).encode());
        let chat = MeshFrame::chat(remote(2), "over capacity", 2).encode();
        assert_eq!(
            dispatcher.handle_frame(remote(2), &chat),
            DispatchOutcome::Delivered(remote(2))
        );
        assert_eq!(dispatcher.peers().read().addresses(), vec![remote(1)]);
        assert_eq!(dispatcher.stats().snapshot().capacity_rejections, 1);
        assert_eq!(dispatcher.queue().drain(5).await.len(), 1);
    }

    #[test]
    fn test_announce_strategy_discovers_peers() {
        let (dispatcher, _medium, _t) = setup_with(Arc::new(AnnounceDiscovery), 20, 10);
        let packet = AnnounceDiscovery.emit(remote(5), 0);
        assert_eq!(
            dispatcher.handle_frame(remote(5), &packet),
            DispatchOutcome::Discovered(remote(5))
        );
        let own = AnnounceDiscovery.emit(LOCAL, 0);
        assert_eq!(dispatcher.handle_frame(LOCAL, &own), DispatchOutcome::FromSelf);
        assert_eq!(dispatcher.peers().read().count(), 1);
    }

    #[test]
    fn test_send_with_no_peers() {
        let (dispatcher, medium, _t) = setup();
        assert!(matches!(dispatcher.send_to_all("hi"), Err(MeshError::NoPeers)));
        assert!(medium.sent().is_empty());
    }

    #[test]
    fn test_send_fans_out_per_peer() {
        let (dispatcher, medium, _t) = setup();
        for n in 1..=3 {
            dispatcher.handle_frame(remote(n), &MeshFrame::beacon(remote(n), 0).encode());
        }
        assert_eq!(dispatcher.send_to_all("hi").unwrap(), 3);

        let sent = medium.sent();
        let destinations: Vec<_> = sent.iter().map(|f| f.destination).collect();
        assert_eq!(destinations, vec![remote(1), remote(2), remote(3)]);
        for f in &sent {
            let decoded = frame::decode(&f.bytes).unwrap();
            assert_eq!(decoded.kind, FrameKind::Chat);
            assert_eq!(decoded.sender, LOCAL);
            assert_eq!(decoded.text(), "hi");
        }
    }

    #[test]
    fn test_send_partial_failure_continues() {
        let (dispatcher, medium, _t) = setup();
        for n in 1..=3 {
            dispatcher.handle_frame(remote(n), &MeshFrame::beacon(remote(n), 0).encode());
        }
        medium.fail_sends_to(remote(2));

        match dispatcher.send_to_all("partial") {
            Err(MeshError::PartialFailure { failed, attempted }) => {
                assert_eq!(failed, vec![remote(2)]);
                assert_eq!(attempted, 3);
            }
            other => panic!("Expected PartialFailure, got {other:?}"),
        }
        // Peers 1 and 3 still got the frame.
        let destinations: Vec<_> = medium.sent().iter().map(|f| f.destination).collect();
        assert_eq!(destinations, vec![remote(1), remote(3)]);
        assert_eq!(dispatcher.stats().snapshot().send_failures, 1);
    }

    #[test]
    fn test_disconnect_removes_and_unregisters() {
        let (dispatcher, _medium, transport) = setup();
        dispatcher.handle_frame(remote(1), &MeshFrame::beacon(remote(1), 0).encode());
        dispatcher.handle_event(TransportEvent::PeerDisconnected { address: remote(1) });
        assert_eq!(dispatcher.peers().read().count(), 0);
        assert!(transport.registered_peers().is_empty());
        assert_eq!(dispatcher.handle_disconnect(remote(1)), RemoveOutcome::NotFound);
    }

    #[test]
    fn test_rediscovery_after_disconnect() {
        let (dispatcher, _medium, transport) = setup();
        let beacon = MeshFrame::beacon(remote(4), 0).encode();
        dispatcher.handle_frame(remote(4), &beacon);
        dispatcher.handle_disconnect(remote(4));
        dispatcher.handle_frame(remote(4), &beacon);
        assert_eq!(dispatcher.peers().read().addresses(), vec![remote(4)]);
        assert_eq!(transport.registered_peers(), vec![remote(4)]);
    }
}
