//! Local draw buffer: the canonical in-memory stroke list for one session.
//!
//! Every mutation of the list goes through here: pointer input creates and
//! extends strokes, the erase resolver removes them, the listener replaces the
//! list with a reconciled view, and the persister snapshots and acknowledges
//! this session's partition.
//!
//! INVARIANTS
//! ==========
//! - Only the last stroke is ever extended, and only by its owner.
//! - Timestamps handed out by `begin_stroke` strictly increase, so
//!   `(owner, timestamp)` identifies a stroke.
//! - Erased own strokes leave a tombstone until a write covering the removal
//!   is acknowledged.

#[cfg(test)]
#[path = "buffer_test.rs"]
mod buffer_test;

use tracing::debug;

use crate::reconcile::{self, Tombstone};
use crate::stroke::{Point, Stroke, StrokeError, Timestamp};

/// This session's partition as it was handed to a write.
#[derive(Debug, Clone)]
pub struct OwnedSnapshot {
    /// Strokes in persisted form (`saved`, concrete timestamps).
    pub strokes: Vec<Stroke>,
    /// `(timestamp, coordinate count)` for every stroke in the write.
    written: Vec<(Timestamp, usize)>,
    /// Removals this write makes durable.
    tombstones: Vec<Tombstone>,
}

impl OwnedSnapshot {
    #[must_use]
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}

/// In-memory stroke list plus pending-write bookkeeping.
#[derive(Debug, Default)]
pub struct StrokeBuffer {
    strokes: Vec<Stroke>,
    last_timestamp: Timestamp,
    tombstones: Vec<Tombstone>,
}

impl StrokeBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Start a new unsaved pen stroke and make it the active (last) stroke.
    ///
    /// # Errors
    ///
    /// Returns an error if `owner` is empty or `origin` is not finite.
    pub fn begin_stroke(
        &mut self,
        owner: &str,
        display_name: Option<&str>,
        color: &str,
        origin: Point,
        now: Timestamp,
    ) -> Result<&Stroke, StrokeError> {
        let timestamp = now.max(self.last_timestamp + 1);
        let mut stroke = Stroke::begin(owner, color, origin, timestamp)?;
        if let Some(name) = display_name {
            stroke = stroke.with_display_name(name);
        }
        self.last_timestamp = timestamp;
        self.strokes.push(stroke);
        Ok(&self.strokes[self.strokes.len() - 1])
    }

    /// Append `point` to the last stroke if `owner` owns it. A remote update
    /// that raced in mid-gesture may have put someone else's stroke last; in
    /// that case the point is dropped.
    pub fn extend_last(&mut self, owner: &str, point: Point) -> bool {
        let Some(last) = self.strokes.last_mut() else {
            return false;
        };
        match last.append(owner, point) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "pointer move not applied to last stroke");
                false
            }
        }
    }

    /// Whether `owner` has anything a write still needs to carry.
    #[must_use]
    pub fn has_pending(&self, owner: &str) -> bool {
        self.has_pending_removals(owner)
            || self.strokes.iter().any(|s| reconcile::is_pending(s, owner))
    }

    /// Whether `owner` erased strokes that no acknowledged write has removed yet.
    #[must_use]
    pub fn has_pending_removals(&self, owner: &str) -> bool {
        self.tombstones.iter().any(|t| t.owner == owner)
    }

    #[must_use]
    pub fn unsaved_count(&self, owner: &str) -> usize {
        self.strokes
            .iter()
            .filter(|s| s.is_owned_by(owner) && !s.is_saved())
            .count()
    }

    /// Remove every stroke of `owner` matching `hit`, leaving tombstones.
    /// Strokes of other owners are never passed to `hit`.
    pub fn remove_owned(&mut self, owner: &str, mut hit: impl FnMut(&Stroke) -> bool) -> usize {
        let before = self.strokes.len();
        let mut erased = Vec::new();
        self.strokes.retain(|stroke| {
            if !stroke.is_owned_by(owner) || !hit(stroke) {
                return true;
            }
            if let Some(timestamp) = stroke.timestamp() {
                erased.push(Tombstone { owner: owner.to_owned(), timestamp });
            }
            false
        });
        self.tombstones.extend(erased);
        before - self.strokes.len()
    }

    /// Replace the list with the reconciled view of `remote`.
    pub fn apply_remote(&mut self, remote: Vec<Stroke>, owner: Option<&str>) {
        let local = std::mem::take(&mut self.strokes);
        self.strokes = reconcile::merge_remote(local, remote, owner, &self.tombstones);
    }

    /// Capture `owner`'s full partition for a replace-by-owner write. Missing
    /// timestamps are filled in place so the local and written copies agree.
    pub fn snapshot_owned(&mut self, owner: &str, now: Timestamp) -> OwnedSnapshot {
        let mut strokes = Vec::new();
        let mut written = Vec::new();
        for stroke in self.strokes.iter_mut().filter(|s| s.is_owned_by(owner)) {
            let timestamp = stroke.ensure_timestamp(now);
            written.push((timestamp, stroke.points().len()));
            strokes.push(stroke.clone().into_saved());
        }
        let tombstones = self
            .tombstones
            .iter()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        OwnedSnapshot { strokes, written, tombstones }
    }

    /// Apply the acknowledgement of a write built from `snapshot`. Strokes
    /// created after the snapshot stay unsaved; strokes extended after it stay
    /// pending.
    pub fn acknowledge(&mut self, owner: &str, snapshot: &OwnedSnapshot) {
        for stroke in self.strokes.iter_mut().filter(|s| s.is_owned_by(owner)) {
            let Some(timestamp) = stroke.timestamp() else {
                continue;
            };
            if let Some((_, values)) = snapshot.written.iter().find(|(ts, _)| *ts == timestamp) {
                stroke.acknowledge(*values);
            }
        }
        self.tombstones.retain(|t| !snapshot.tombstones.contains(t));
    }
}
