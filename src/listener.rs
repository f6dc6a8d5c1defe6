//! Remote snapshot listener: keeps the local buffer reconciled with the tile.
//!
//! The listener task subscribes to the session's tile and folds every delivered
//! version into the buffer with [`StrokeBuffer::apply_remote`]. An absent tile
//! is bootstrapped empty. Versions arriving while the session is flushing are
//! skipped and remembered; the persister triggers one [`resync`] when it
//! releases the phase.
//!
//! A subscription that ends means notifications may have been lost. The task
//! subscribes again after a linear back-off, and the new subscription's first
//! delivery is a fresh read.
//!
//! [`StrokeBuffer::apply_remote`]: crate::buffer::StrokeBuffer::apply_remote

#[cfg(test)]
#[path = "listener_test.rs"]
mod listener_test;

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::persist::PersistPhase;
use crate::session::SessionInner;
use crate::store::{StoreError, TileSnapshot};
use crate::stroke::{Stroke, Tile, now_ms};

/// Spawn the listener for `inner`. The task holds the session weakly and ends
/// once the session is gone.
pub(crate) fn spawn_listener(inner: &Arc<SessionInner>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let store = Arc::clone(&inner.store);
    let tile = inner.tile.clone();
    let session = inner.id;

    tokio::spawn(async move {
        let mut attempt: u32 = 0;
        loop {
            match store.subscribe(&tile).await {
                Ok(mut subscription) => {
                    info!(%session, tile = %tile, "tile subscription established");
                    while let Some(snapshot) = subscription.next().await {
                        attempt = 0;
                        let Some(inner) = weak.upgrade() else {
                            return;
                        };
                        on_snapshot(&inner, snapshot).await;
                    }
                    warn!(%session, tile = %tile, "tile subscription ended; re-subscribing");
                }
                Err(e) => {
                    warn!(%session, tile = %tile, error = %e, code = e.error_code(), "tile subscribe failed");
                }
            }

            if Weak::strong_count(&weak) == 0 {
                return;
            }
            attempt = attempt.saturating_add(1);
            let delay = resubscribe_delay(&weak, attempt);
            debug!(%session, attempt, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "waiting before re-subscribe");
            tokio::time::sleep(delay).await;
        }
    })
}

fn resubscribe_delay(weak: &Weak<SessionInner>, attempt: u32) -> std::time::Duration {
    weak.upgrade()
        .map(|inner| inner.config.resubscribe_delay(attempt))
        .unwrap_or_default()
}

async fn on_snapshot(inner: &Arc<SessionInner>, snapshot: TileSnapshot) {
    match snapshot {
        Some(tile) => apply(inner, tile.strokes),
        None => {
            bootstrap(inner).await;
            apply(inner, Vec::new());
        }
    }
}

/// Create the tile empty. Losing the race to another session is fine: its
/// version arrives as the next notification.
async fn bootstrap(inner: &Arc<SessionInner>) {
    match inner.store.create_if_absent(&inner.tile, &Tile::empty(now_ms())).await {
        Ok(true) => info!(session = %inner.id, tile = %inner.tile, "tile created"),
        Ok(false) => debug!(session = %inner.id, tile = %inner.tile, "tile already created elsewhere"),
        Err(e) => warn!(session = %inner.id, tile = %inner.tile, error = %e, code = e.error_code(), "tile bootstrap failed"),
    }
}

/// Reconcile `remote` into the buffer unless a flush is in flight.
fn apply(inner: &Arc<SessionInner>, remote: Vec<Stroke>) {
    let owner = inner.owner();
    let mut state = inner.lock_state();
    if state.phase == PersistPhase::Flushing {
        state.resync_pending = true;
        debug!(session = %inner.id, "tile update deferred; flush in flight");
        return;
    }
    let count = remote.len();
    state.buffer.apply_remote(remote, owner.as_deref());
    debug!(session = %inner.id, remote = count, local = state.buffer.len(), "tile reconciled");
}

/// One fresh read and reconcile, for updates skipped while flushing.
///
/// # Errors
///
/// Returns the store error if the read fails.
pub(crate) async fn resync(inner: &Arc<SessionInner>) -> Result<(), StoreError> {
    let snapshot = inner.store.read(&inner.tile).await?;
    apply(inner, snapshot.map(|tile| tile.strokes).unwrap_or_default());
    Ok(())
}
