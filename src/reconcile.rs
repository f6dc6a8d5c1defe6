//! Merge reconciler: fold a freshly observed tile into the local stroke list.
//!
//! The remote tile is authoritative for everything except this session's
//! pending strokes (never saved, or edited since the last acknowledged write).
//! Those are kept and appended after the remote strokes, and any remote copy of
//! them is dropped by timestamp so a stroke never shows up twice while it moves
//! from local to saved. Remote copies of strokes this session erased but has
//! not yet written are dropped as well.

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod reconcile_test;

use std::collections::HashSet;

use crate::stroke::{Stroke, Timestamp};

/// An own stroke erased locally whose removal no acknowledged write covers yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tombstone {
    pub owner: String,
    pub timestamp: Timestamp,
}

/// Whether `stroke` is one of `owner`'s edits the store has not caught up with.
#[must_use]
pub fn is_pending(stroke: &Stroke, owner: &str) -> bool {
    stroke.is_owned_by(owner) && (!stroke.is_saved() || stroke.has_local_edits())
}

/// Build the new in-memory list: `filtered_remote ++ pending_mine`.
///
/// With no session owner nothing is local, and the remote list is taken as is.
#[must_use]
pub fn merge_remote(local: Vec<Stroke>, remote: Vec<Stroke>, owner: Option<&str>, erased: &[Tombstone]) -> Vec<Stroke> {
    let Some(owner) = owner else {
        return remote;
    };

    let pending: Vec<Stroke> = local.into_iter().filter(|s| is_pending(s, owner)).collect();
    let pending_keys: HashSet<Timestamp> = pending.iter().filter_map(Stroke::timestamp).collect();
    let erased_keys: HashSet<Timestamp> = erased
        .iter()
        .filter(|t| t.owner == owner)
        .map(|t| t.timestamp)
        .collect();

    let mut merged: Vec<Stroke> = remote
        .into_iter()
        .filter(|stroke| {
            if !stroke.is_owned_by(owner) {
                return true;
            }
            match stroke.timestamp() {
                Some(ts) => !pending_keys.contains(&ts) && !erased_keys.contains(&ts),
                None => true,
            }
        })
        .collect();
    merged.extend(pending);
    merged
}
