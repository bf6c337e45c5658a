//! Inbound queue: bounded FIFO between the receive path and the consumer.
//!
//! Producers never wait: when the queue is full the newest message is
//! dropped and counted. The single consumer may wait up to a timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::warn;

use crate::address::PeerAddress;
use crate::error::MeshError;
use crate::frame::MeshFrame;

/// Default number of queue slots.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// A chat message accepted by the dispatcher, waiting for the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayedMessage {
    pub sender: PeerAddress,
    #[serde(rename = "content")]
    pub text: String,
    pub timestamp: u32,
}

impl RelayedMessage {
    pub fn from_frame(frame: &MeshFrame) -> Self {
        Self {
            sender: frame.sender,
            text: frame.text(),
            timestamp: frame.timestamp,
        }
    }
}

/// Bounded multi-producer, single-consumer message queue.
pub struct InboundQueue {
    tx: mpsc::Sender<RelayedMessage>,
    rx: Mutex<mpsc::Receiver<RelayedMessage>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl InboundQueue {
    /// Create a queue with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue without blocking. A full queue drops `msg` and returns
    /// [`MeshError::QueueFull`].
    pub fn try_enqueue(&self, msg: RelayedMessage) -> Result<(), MeshError> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(sender = %msg.sender, dropped_total = total, "Inbound queue full, dropping message");
                Err(MeshError::QueueFull)
            }
            // The receiver lives as long as `self`, so the channel cannot close.
            Err(mpsc::error::TrySendError::Closed(_)) => Err(MeshError::NotRunning),
        }
    }

    /// Wait up to `timeout` for the oldest message. `None` means timed out.
    pub async fn dequeue(&self, timeout: Duration) -> Option<RelayedMessage> {
        let mut rx = self.rx.lock().await;
        match rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(_) => tokio::time::timeout(timeout, rx.recv()).await.ok().flatten(),
        }
    }

    /// Take up to `max` messages that are already queued, oldest first.
    pub async fn drain(&self, max: usize) -> Vec<RelayedMessage> {
        let mut rx = self.rx.lock().await;
        let mut out = Vec::new();
        while out.len() < max {
            match rx.try_recv() {
                Ok(msg) => out.push(msg),
                Err(_) => break,
            }
        }
        out
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(n: u32) -> RelayedMessage {
        RelayedMessage {
            sender: PeerAddress::new([0x0a, 0, 0, 0, 0, n as u8]),
            text: format!("message {n}"),
            timestamp: n,
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = InboundQueue::new(8);
        for n in 0..5 {
            queue.try_enqueue(msg(n)).unwrap();
        }
        assert_eq!(queue.len(), 5);
        for n in 0..5 {
            let got = queue.dequeue(Duration::from_millis(10)).await.unwrap();
            assert_eq!(got, msg(n));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let queue = InboundQueue::new(3);
        for n in 0..3 {
            queue.try_enqueue(msg(n)).unwrap();
        }
        assert!(matches!(queue.try_enqueue(msg(99)), Err(MeshError::QueueFull)));
        assert!(matches!(queue.try_enqueue(msg(100)), Err(MeshError::QueueFull)));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);

        let drained = queue.drain(10).await;
        assert_eq!(drained, vec![msg(0), msg(1), msg(2)]);
    }

    #[tokio::test]
    async fn test_dequeue_times_out() {
        let queue = InboundQueue::new(2);
        let started = std::time::Instant::now();
        assert!(queue.dequeue(Duration::from_millis(30)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = std::sync::Arc::new(InboundQueue::new(2));
        let producer = std::sync::Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.try_enqueue(msg(7)).unwrap();
        });
        let got = queue.dequeue(Duration::from_secs(2)).await;
        assert_eq!(got, Some(msg(7)));
    }

    #[tokio::test]
    async fn test_drain_respects_max() {
        let queue = InboundQueue::new(20);
        for n in 0..15 {
            queue.try_enqueue(msg(n)).unwrap();
        }
        let first = queue.drain(10).await;
        assert_eq!(first.len(), 10);
        assert_eq!(first[0], msg(0));
        let rest = queue.drain(10).await;
        assert_eq!(rest.len(), 5);
        assert_eq!(rest[0], msg(10));
    }

    #[test]
    fn test_relayed_message_json_shape() {
        let json = serde_json::to_value(msg(3)).unwrap();
        assert_eq!(json["sender"], "0a:00:00:00:00:03");
        assert_eq!(json["content"], "message 3");
        assert_eq!(json["timestamp"], 3);
    }
}
