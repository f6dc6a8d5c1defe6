//! In-process tile store.
//!
//! Every tile has a slot holding its current document and the senders of its
//! subscribers. Writes fan the new version out with `try_send`; closed
//! subscribers are pruned and lagging ones are disconnected so that they
//! re-subscribe from a fresh read rather than silently skipping versions.
//!
//! Fault injection (`fail_next_writes`, `fail_next_reads`,
//! `fail_next_subscribes`, `disconnect_all`) lets tests drive the failure
//! paths of the sync engine.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{SUBSCRIPTION_CAPACITY, StoreError, Subscription, TileSnapshot, TileStore};
use crate::stroke::{Tile, TileKey};

#[derive(Default)]
struct TileSlot {
    tile: Option<Tile>,
    subscribers: Vec<mpsc::Sender<TileSnapshot>>,
}

impl TileSlot {
    fn publish(&mut self, key: &TileKey) {
        let snapshot = self.tile.clone();
        self.subscribers.retain(|tx| match tx.try_send(snapshot.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(tile = %key, "subscriber lagging; disconnecting");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

/// Tile store kept entirely in memory.
#[derive(Default)]
pub struct MemoryTileStore {
    slots: Mutex<HashMap<TileKey, TileSlot>>,
    writes: AtomicUsize,
    failing_writes: AtomicUsize,
    failing_reads: AtomicUsize,
    failing_subscribes: AtomicUsize,
}

impl MemoryTileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one tile.
    #[must_use]
    pub fn with_tile(key: &TileKey, tile: Tile) -> Self {
        let store = Self::new();
        store
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .tile = Some(tile);
        store
    }

    /// Current document of `key` without going through the async API.
    #[must_use]
    pub fn snapshot(&self, key: &TileKey) -> TileSnapshot {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(|slot| slot.tile.clone())
    }

    /// Number of successful writes (including creations) so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of live subscribers of `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &TileKey) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, |slot| slot.subscribers.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` reads fail.
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` subscribe calls fail.
    pub fn fail_next_subscribes(&self, n: usize) {
        self.failing_subscribes.store(n, Ordering::SeqCst);
    }

    /// Drop every subscription, as a lost connection would.
    pub fn disconnect_all(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.values_mut() {
            slot.subscribers.clear();
        }
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl TileStore for MemoryTileStore {
    async fn read(&self, key: &TileKey) -> Result<TileSnapshot, StoreError> {
        if Self::take_failure(&self.failing_reads) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(self.snapshot(key))
    }

    async fn write(&self, key: &TileKey, tile: &Tile) -> Result<(), StoreError> {
        if Self::take_failure(&self.failing_writes) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(key.clone()).or_default();
        slot.tile = Some(tile.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(tile = %key, strokes = tile.strokes.len(), "tile written");
        slot.publish(key);
        Ok(())
    }

    async fn create_if_absent(&self, key: &TileKey, tile: &Tile) -> Result<bool, StoreError> {
        if Self::take_failure(&self.failing_writes) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(key.clone()).or_default();
        if slot.tile.is_some() {
            return Ok(false);
        }
        slot.tile = Some(tile.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        slot.publish(key);
        Ok(true)
    }

    async fn subscribe(&self, key: &TileKey) -> Result<Subscription, StoreError> {
        if Self::take_failure(&self.failing_subscribes) {
            return Err(StoreError::Unavailable("injected subscribe failure".into()));
        }
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(key.clone()).or_default();
        if tx.try_send(slot.tile.clone()).is_err() {
            return Err(StoreError::Unavailable("subscription queue rejected initial state".into()));
        }
        slot.subscribers.push(tx);
        Ok(Subscription::new(rx))
    }
}
