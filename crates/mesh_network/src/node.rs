//! MeshNode: top-level coordinator for the mesh layer.
//!
//! [`MeshNode`] is the primary public API for mesh_network. It owns:
//! - the peer table and inbound queue
//! - the relay dispatcher fed by the transport's event channel
//! - the beacon scheduler
//! - a periodic peer-count report
//!
//! and exposes the consumer-facing operations: send to all peers, dequeue or
//! drain inbound messages, list peers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::address::PeerAddress;
use crate::beacon::BeaconScheduler;
use crate::clock::Clock;
use crate::config::MeshConfig;
use crate::discovery::DiscoveryStrategy;
use crate::dispatcher::RelayDispatcher;
use crate::error::MeshError;
use crate::frame::FRAME_SIZE;
use crate::peer::{PeerEntry, PeerTable};
use crate::queue::{InboundQueue, RelayedMessage};
use crate::stats::RelayStatsSnapshot;
use crate::transport::{EventGauge, EventReceiver, Transport};

/// A batch of drained messages, in the shape the web client polls for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBatch {
    pub messages: Vec<RelayedMessage>,
}

/// The top-level mesh node.
///
/// Create one per device. Call [`start()`](MeshNode::start) from within a
/// tokio runtime to begin beaconing and processing transport events.
pub struct MeshNode {
    config: MeshConfig,
    transport: Arc<dyn Transport>,
    strategy: Arc<dyn DiscoveryStrategy>,
    clock: Clock,
    dispatcher: Arc<RelayDispatcher>,
    events: Arc<Mutex<EventReceiver>>,
    event_gauge: Arc<EventGauge>,
    beacon: Option<BeaconScheduler>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
    running: bool,
}

impl MeshNode {
    /// Create a node using the discovery strategy named in `config`.
    pub fn new(
        config: MeshConfig,
        transport: Arc<dyn Transport>,
        events: EventReceiver,
    ) -> Self {
        let strategy: Arc<dyn DiscoveryStrategy> = Arc::from(config.discovery.strategy());
        Self::with_strategy(config, transport, events, strategy)
    }

    /// Create a node with an explicit discovery strategy.
    pub fn with_strategy(
        config: MeshConfig,
        transport: Arc<dyn Transport>,
        events: EventReceiver,
        strategy: Arc<dyn DiscoveryStrategy>,
    ) -> Self {
        let local = transport.local_address();
        let clock = Clock::new();
        let peers = Arc::new(RwLock::new(PeerTable::new(local, config.max_peers)));
        let queue = Arc::new(InboundQueue::new(config.queue_capacity));
        let dispatcher = Arc::new(RelayDispatcher::new(
            peers,
            queue,
            Arc::clone(&transport),
            Arc::clone(&strategy),
            clock,
        ));

        Self {
            config,
            transport,
            strategy,
            clock,
            dispatcher,
            event_gauge: events.gauge(),
            events: Arc::new(Mutex::new(events)),
            beacon: None,
            shutdown_tx: None,
            tasks: Vec::new(),
            running: false,
        }
    }

    /// Return the node's hardware address.
    pub fn local_address(&self) -> PeerAddress {
        self.dispatcher.local_address()
    }

    /// Return the node's configuration.
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Whether the node is currently running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn dispatcher(&self) -> &Arc<RelayDispatcher> {
        &self.dispatcher
    }

    /// Start beaconing and processing transport events.
    ///
    /// Fails with [`MeshError::FrameTooLarge`] when the transport cannot
    /// carry a full frame.
    pub fn start(&mut self) -> Result<(), MeshError> {
        if self.running {
            return Ok(());
        }
        let max = self.transport.max_payload();
        if FRAME_SIZE > max {
            return Err(MeshError::FrameTooLarge {
                frame: FRAME_SIZE,
                max,
            });
        }

        let (shutdown_tx, _) = broadcast::channel(8);
        self.shutdown_tx = Some(shutdown_tx.clone());

        // Event loop.
        let dispatcher = Arc::clone(&self.dispatcher);
        let events = Arc::clone(&self.events);
        let event_shutdown = shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            Self::event_loop(events, dispatcher, event_shutdown).await;
        }));

        // Peer-count report.
        let dispatcher = Arc::clone(&self.dispatcher);
        let report_interval = self.config.peer_report_interval;
        let report_shutdown = shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            Self::report_loop(dispatcher, report_interval, report_shutdown).await;
        }));

        self.beacon = Some(BeaconScheduler::start(
            Arc::clone(&self.transport),
            Arc::clone(&self.strategy),
            self.clock,
            self.config.beacon_interval,
        ));

        self.running = true;
        info!(
            "MeshNode {} started (channel {}, {} discovery)",
            self.local_address(),
            self.transport.channel(),
            self.strategy.name()
        );
        Ok(())
    }

    /// Stop the node. The beacon timer is cancelled before this returns;
    /// the peer table and inbound queue stay intact and drainable.
    pub fn stop(&mut self) {
        if let Some(mut beacon) = self.beacon.take() {
            beacon.stop();
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }

        if self.running {
            self.running = false;
            info!("MeshNode {} stopped", self.local_address());
        }
    }

    // -----------------------------------------------------------------------
    // Consumer-facing operations
    // -----------------------------------------------------------------------

    /// Send `text` to every known peer. Returns the number of peers
    /// addressed.
    pub fn enqueue_outbound(&self, text: &str) -> Result<usize, MeshError> {
        if !self.running {
            return Err(MeshError::NotRunning);
        }
        self.dispatcher.send_to_all(text)
    }

    /// Wait up to `timeout` for the oldest inbound message.
    pub async fn dequeue_inbound(&self, timeout: Duration) -> Option<RelayedMessage> {
        self.dispatcher.queue().dequeue(timeout).await
    }

    /// Take up to `max` already-queued messages without waiting.
    pub async fn drain_inbound(&self, max: usize) -> MessageBatch {
        MessageBatch {
            messages: self.dispatcher.queue().drain(max).await,
        }
    }

    /// Addresses of all known peers, in discovery order.
    pub fn list_peers(&self) -> Vec<PeerAddress> {
        self.dispatcher.peers().read().addresses()
    }

    /// Full peer entries, in discovery order.
    pub fn peer_entries(&self) -> Vec<PeerEntry> {
        self.dispatcher.peers().read().list()
    }

    pub fn peer_count(&self) -> usize {
        self.dispatcher.peers().read().count()
    }

    /// Number of messages waiting for the consumer.
    pub fn inbound_len(&self) -> usize {
        self.dispatcher.queue().len()
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        let mut stats = self.dispatcher.stats().snapshot();
        stats.transport_drops = self.event_gauge.dropped_frames();
        stats
    }

    // -----------------------------------------------------------------------
    // Internal tasks
    // -----------------------------------------------------------------------

    /// Feed transport events to the dispatcher until shutdown.
    async fn event_loop(
        events: Arc<Mutex<EventReceiver>>,
        dispatcher: Arc<RelayDispatcher>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut events = events.lock().await;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => dispatcher.handle_event(event),
                    None => {
                        debug!("Transport event channel closed");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    debug!("Event loop shutting down");
                    break;
                }
            }
        }
    }

    /// Log the peer count on a fixed cadence while there are peers.
    async fn report_loop(
        dispatcher: Arc<RelayDispatcher>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let interval = interval.max(Duration::from_millis(1));
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let count = dispatcher.peers().read().count();
                    if count > 0 {
                        info!("Active mesh peers: {count}");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Peer report loop shutting down");
                    break;
                }
            }
        }
    }
}

impl Drop for MeshNode {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
