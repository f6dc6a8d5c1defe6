//! Save queue / debounced persister: the only writer of the shared tile.
//!
//! DESIGN
//! ======
//! A flush is a replace-by-owner write: read the tile, keep every stroke of
//! other owners verbatim, substitute this session's full current partition,
//! write the whole stroke array back. The save queue is never stored; it is
//! rebuilt from the live buffer on every attempt.
//!
//! One `Idle | Flushing` phase per session serializes the session's writes.
//! A flush that finds the phase `Flushing` returns `Busy` without touching the
//! store. After a successful write the phase stays `Flushing` for the echo
//! grace period so the listener skips the write's own echo; on release the
//! session catches up on anything it skipped (one fresh read) and flushes
//! edits that arrived while it was busy. Erasures are flushed at once; pen
//! edits wait until the gesture is over.
//!
//! ERROR HANDLING
//! ==============
//! A failed read or write releases the phase at once and leaves the strokes
//! pending. There is no retry loop: the next timer tick or pointer-up repeats
//! the same write. Failures raise a throttled `SaveFailed` notice.

#[cfg(test)]
#[path = "persist_test.rs"]
mod persist_test;

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ErrorCode;
use crate::listener;
use crate::notify::NoticeKind;
use crate::session::SessionInner;
use crate::store::StoreError;
use crate::stroke::{Stroke, Tile, now_ms};

// =============================================================================
// TYPES
// =============================================================================

/// Write phase of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistPhase {
    #[default]
    Idle,
    Flushing,
}

/// What a flush request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The tile was written with this session's `strokes` strokes.
    Written { strokes: usize },
    /// Another flush of this session is in flight.
    Busy,
    /// Nothing of this session's awaits a write.
    NothingPending,
    /// No signed-in identity, so nothing can be owned.
    NoSession,
}

#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error("reading tile before write failed: {0}")]
    Read(#[source] StoreError),
    #[error("writing tile failed: {0}")]
    Write(#[source] StoreError),
}

impl ErrorCode for FlushError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Read(_) => "E_FLUSH_READ",
            Self::Write(_) => "E_FLUSH_WRITE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Read(e) | Self::Write(e) => e.retryable(),
        }
    }
}

// =============================================================================
// FLUSH
// =============================================================================

/// Run `flush` on its own task. The task is never aborted by timers, so a
/// flush always runs to completion once started.
pub(crate) fn spawn_flush(inner: &Arc<SessionInner>, reason: &'static str) -> JoinHandle<Result<FlushOutcome, FlushError>> {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        debug!(session = %inner.id, reason, "flush requested");
        flush(&inner).await
    })
}

/// Write this session's strokes to the tile if anything is pending and no
/// other flush is in flight.
pub(crate) async fn flush(inner: &Arc<SessionInner>) -> Result<FlushOutcome, FlushError> {
    let Some(owner) = inner.owner() else {
        return Ok(FlushOutcome::NoSession);
    };

    {
        let mut state = inner.lock_state();
        if state.phase == PersistPhase::Flushing {
            debug!(session = %inner.id, "flush skipped; write in flight");
            return Ok(FlushOutcome::Busy);
        }
        if !state.buffer.has_pending(&owner) {
            return Ok(FlushOutcome::NothingPending);
        }
        state.phase = PersistPhase::Flushing;
    }

    let started = Instant::now();
    let remote = match inner.store.read(&inner.tile).await {
        Ok(remote) => remote,
        Err(e) => {
            let e = FlushError::Read(e);
            fail(inner, &e);
            return Err(e);
        }
    };

    let now = now_ms();
    let snapshot = inner.lock_state().buffer.snapshot_owned(&owner, now);
    let mut strokes: Vec<Stroke> = remote
        .map(|tile| tile.strokes)
        .unwrap_or_default()
        .into_iter()
        .filter(|s| !s.is_owned_by(&owner))
        .collect();
    let others = strokes.len();
    strokes.extend(snapshot.strokes.iter().cloned());
    let tile = Tile { strokes, updated_at: now };

    if let Err(e) = inner.store.write(&inner.tile, &tile).await {
        let e = FlushError::Write(e);
        fail(inner, &e);
        return Err(e);
    }

    inner.lock_state().buffer.acknowledge(&owner, &snapshot);
    info!(
        session = %inner.id,
        tile = %inner.tile,
        owner = %owner,
        mine = snapshot.len(),
        others,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "tile flushed"
    );

    schedule_release(inner);
    Ok(FlushOutcome::Written { strokes: snapshot.len() })
}

fn fail(inner: &Arc<SessionInner>, e: &FlushError) {
    error!(
        session = %inner.id,
        tile = %inner.tile,
        error = %e,
        code = e.error_code(),
        retryable = e.retryable(),
        "tile flush failed; strokes stay pending"
    );
    inner.notifier.notify(NoticeKind::SaveFailed);
    release(inner, false);
}

/// Keep the phase up for the echo grace period, then release it.
fn schedule_release(inner: &Arc<SessionInner>) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        tokio::time::sleep(inner.config.echo_grace).await;
        release(&inner, true);
    });
}

/// Return to `Idle` and catch up on notifications skipped while flushing.
/// After a successful write, flush whatever arrived in the meantime. Pen edits
/// wait for the gesture to end (the interval timer owns them while drawing);
/// erasures go out at once.
fn release(inner: &Arc<SessionInner>, follow_up: bool) {
    let owner = inner.owner();
    let (flush_again, resync) = {
        let mut state = inner.lock_state();
        state.phase = PersistPhase::Idle;
        let flush_again = follow_up
            && owner.as_deref().is_some_and(|o| {
                state.buffer.has_pending_removals(o) || (!state.drawing && state.buffer.has_pending(o))
            });
        // A resync read landing during the follow-up flush is deferred again.
        let resync = std::mem::take(&mut state.resync_pending);
        (flush_again, resync)
    };

    if flush_again {
        debug!(session = %inner.id, "edits arrived during flush; flushing again");
        spawn_flush(inner, "follow-up");
    }
    if resync {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            if let Err(e) = listener::resync(&inner).await {
                warn!(session = %inner.id, error = %e, code = e.error_code(), "resync after flush failed");
            }
        });
    }
}
