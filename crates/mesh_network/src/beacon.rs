//! Beacon scheduler: periodic discovery broadcasts.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::address::PeerAddress;
use crate::clock::Clock;
use crate::discovery::DiscoveryStrategy;
use crate::transport::Transport;

/// Default time between beacons.
pub const DEFAULT_BEACON_INTERVAL: Duration = Duration::from_millis(5000);

/// Broadcasts the discovery packet on a fixed interval until stopped.
///
/// The first beacon goes out immediately. The scheduler never looks at the
/// peer table.
pub struct BeaconScheduler {
    handle: Option<JoinHandle<()>>,
}

impl BeaconScheduler {
    /// Spawn the beacon task on the current tokio runtime.
    pub fn start(
        transport: Arc<dyn Transport>,
        strategy: Arc<dyn DiscoveryStrategy>,
        clock: Clock,
        interval: Duration,
    ) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let local = transport.local_address();
        debug!(
            "Beacon scheduler started ({} every {interval:?})",
            strategy.name()
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let packet = strategy.emit(local, clock.now_ms());
                match transport.send(PeerAddress::BROADCAST, &packet) {
                    Ok(()) => trace!("Beacon sent"),
                    Err(e) => debug!("Beacon send failed: {e}"),
                }
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the beacon task. Returns immediately; calling it again is a
    /// no-op.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Beacon scheduler stopped");
        }
    }
}

impl Drop for BeaconScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::BeaconDiscovery;
    use crate::frame::{self, FrameKind};
    use crate::transport::MemoryMedium;

    const LOCAL: PeerAddress = PeerAddress::new([0x02, 0, 0, 0, 0, 0x01]);

    #[tokio::test]
    async fn test_beacons_are_broadcast_periodically() {
        let medium = MemoryMedium::new();
        let (transport, _rx) = medium.attach(LOCAL, 1);
        let mut scheduler = BeaconScheduler::start(
            Arc::new(transport),
            Arc::new(BeaconDiscovery),
            Clock::new(),
            Duration::from_millis(20),
        );
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(110)).await;
        scheduler.stop();

        let sent = medium.sent();
        assert!(sent.len() >= 3, "expected several beacons, got {}", sent.len());
        for f in &sent {
            assert!(f.destination.is_broadcast());
            let decoded = frame::decode(&f.bytes).unwrap();
            assert_eq!(decoded.kind, FrameKind::Beacon);
            assert_eq!(decoded.sender, LOCAL);
        }
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_final() {
        let medium = MemoryMedium::new();
        let (transport, _rx) = medium.attach(LOCAL, 1);
        let mut scheduler = BeaconScheduler::start(
            Arc::new(transport),
            Arc::new(BeaconDiscovery),
            Clock::new(),
            Duration::from_millis(10),
        );
        tokio::time::sleep(Duration::from_millis(25)).await;

        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());

        // Let the aborted task settle, then make sure nothing else goes out.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let count = medium.sent().len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(medium.sent().len(), count);
    }
}
