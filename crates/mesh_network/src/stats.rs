//! Relay counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lock-free counters updated on the receive and send paths.
#[derive(Debug, Default)]
pub struct RelayStats {
    frames_received: AtomicU64,
    malformed: AtomicU64,
    from_self: AtomicU64,
    beacons: AtomicU64,
    chats: AtomicU64,
    queue_drops: AtomicU64,
    capacity_rejections: AtomicU64,
    send_failures: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatsSnapshot {
    pub frames_received: u64,
    pub malformed: u64,
    pub from_self: u64,
    pub beacons: u64,
    pub chats: u64,
    pub queue_drops: u64,
    pub capacity_rejections: u64,
    pub send_failures: u64,
    /// Frames lost in front of the dispatcher because the transport event
    /// channel was full. Filled in by [`MeshNode::stats`](crate::MeshNode::stats).
    #[serde(default)]
    pub transport_drops: u64,
}

impl RelayStats {
    pub(crate) fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_from_self(&self) {
        self.from_self.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_beacon(&self) {
        self.beacons.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_chat(&self) {
        self.chats.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queue_drop(&self) {
        self.queue_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_capacity_rejection(&self) {
        self.capacity_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failures(&self, n: usize) {
        self.send_failures.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            from_self: self.from_self.load(Ordering::Relaxed),
            beacons: self.beacons.load(Ordering::Relaxed),
            chats: self.chats.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            transport_drops: 0,
        }
    }
}
