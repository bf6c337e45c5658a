//! Peer table: bounded, de-duplicated registry of known peers.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::address::PeerAddress;
use crate::error::MeshError;

/// Default capacity of the peer table.
pub const DEFAULT_MAX_PEERS: usize = 20;

/// A known peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    /// The peer's hardware address.
    pub address: PeerAddress,
    /// Whether the peer is currently considered reachable.
    pub active: bool,
}

/// Result of a successful [`PeerTable::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The address was new and has been stored.
    Added,
    /// The address was already in the table; nothing changed.
    AlreadyPresent,
}

/// Result of [`PeerTable::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// Fixed-capacity table of peers in insertion order.
///
/// Entries are never exposed by index; callers get copies through
/// [`list`](Self::list). The local address is never stored.
#[derive(Debug, Clone)]
pub struct PeerTable {
    local: PeerAddress,
    capacity: usize,
    entries: Vec<PeerEntry>,
}

impl PeerTable {
    /// Create an empty table for the node at `local` holding at most
    /// `capacity` peers.
    pub fn new(local: PeerAddress, capacity: usize) -> Self {
        Self {
            local,
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// The address this table treats as "self".
    pub fn local_address(&self) -> PeerAddress {
        self.local
    }

    /// Maximum number of peers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a peer.
    ///
    /// Fails with [`MeshError::IsSelf`] for the local address (checked
    /// before anything else) and [`MeshError::CapacityExceeded`] when a new
    /// address does not fit.
    pub fn add(&mut self, address: PeerAddress) -> Result<AddOutcome, MeshError> {
        if address == self.local {
            return Err(MeshError::IsSelf);
        }
        if self.contains(&address) {
            return Ok(AddOutcome::AlreadyPresent);
        }
        if self.entries.len() >= self.capacity {
            warn!(peer = %address, max = self.capacity, "Peer table full, not adding");
            return Err(MeshError::CapacityExceeded(self.capacity));
        }

        self.entries.push(PeerEntry {
            address,
            active: true,
        });
        info!(peer = %address, count = self.entries.len(), "Added peer");
        Ok(AddOutcome::Added)
    }

    /// Remove a peer, keeping the relative order of the rest.
    pub fn remove(&mut self, address: &PeerAddress) -> RemoveOutcome {
        match self.entries.iter().position(|e| e.address == *address) {
            Some(index) => {
                self.entries.remove(index);
                info!(peer = %address, count = self.entries.len(), "Removed peer");
                RemoveOutcome::Removed
            }
            None => RemoveOutcome::NotFound,
        }
    }

    /// Whether `address` is in the table.
    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.entries.iter().any(|e| e.address == *address)
    }

    /// Number of stored peers.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all entries in insertion order.
    pub fn list(&self) -> Vec<PeerEntry> {
        self.entries.clone()
    }

    /// Snapshot of just the addresses, in insertion order.
    pub fn addresses(&self) -> Vec<PeerAddress> {
        self.entries.iter().map(|e| e.address).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
