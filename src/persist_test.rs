use std::sync::Arc;

use super::*;
use crate::session::test_helpers::{TestSession, draw, inner, session_for, settle};
use crate::store::{MemoryTileStore, TileStore};
use crate::stroke::{Point, TileKey};

fn saved(owner: &str, points: Vec<f64>, ts: i64) -> Stroke {
    Stroke::new(owner, "#000000", points, Some(ts)).unwrap().into_saved()
}

// =============================================================================
// Outcomes
// =============================================================================

#[tokio::test(start_paused = true)]
async fn flush_with_nothing_pending_does_not_write() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);

    assert_eq!(session.flush().await.unwrap(), FlushOutcome::NothingPending);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn flush_without_identity_reports_no_session() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, identity, .. } = session_for("a", &store);
    draw(&session, &[(0.0, 0.0), (1.0, 1.0)]);
    identity.sign_out();

    assert_eq!(session.flush().await.unwrap(), FlushOutcome::NoSession);
    assert_eq!(store.write_count(), 0);
}

// =============================================================================
// Replace-by-owner
// =============================================================================

#[tokio::test(start_paused = true)]
async fn flush_replaces_only_own_partition() {
    let key = TileKey::origin();
    let seeded = Tile {
        strokes: vec![
            saved("a", vec![0.0, 0.0], 1),
            saved("b", vec![7.0, 7.0, 8.0, 8.0], 2),
            saved("a", vec![1.0, 1.0], 3),
        ],
        updated_at: 3,
    };
    let store = Arc::new(MemoryTileStore::with_tile(&key, seeded));
    let TestSession { session, .. } = session_for("a", &store);
    draw(&session, &[(10.0, 10.0), (11.0, 11.0)]);
    draw(&session, &[(20.0, 20.0)]);
    draw(&session, &[(30.0, 30.0), (31.0, 31.0), (32.0, 32.0)]);

    assert_eq!(session.flush().await.unwrap(), FlushOutcome::Written { strokes: 3 });

    let tile = store.snapshot(&key).unwrap();
    assert_eq!(tile.strokes_by("a").count(), 3);
    let b: Vec<_> = tile.strokes_by("b").collect();
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].points(), &[7.0, 7.0, 8.0, 8.0]);
    assert_eq!(b[0].timestamp(), Some(2));
    assert!(tile.strokes_by("a").all(|s| s.timestamp().is_some_and(|ts| ts > 3)));
}

#[tokio::test(start_paused = true)]
async fn flush_marks_strokes_saved() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);
    draw(&session, &[(0.0, 0.0), (5.0, 5.0)]);
    assert_eq!(session.unsaved_count(), 1);

    session.flush().await.unwrap();

    assert_eq!(session.unsaved_count(), 0);
    assert!(session.strokes()[0].is_saved());
}

// =============================================================================
// In-flight guard
// =============================================================================

#[tokio::test(start_paused = true)]
async fn back_to_back_flushes_write_once() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);
    draw(&session, &[(0.0, 0.0), (5.0, 5.0)]);

    let (first, second) = tokio::join!(session.flush(), session.flush());

    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.retain(|o| *o != FlushOutcome::Busy);
    assert_eq!(outcomes, vec![FlushOutcome::Written { strokes: 1 }]);
    assert_eq!(store.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn phase_held_for_echo_grace() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);
    draw(&session, &[(0.0, 0.0), (5.0, 5.0)]);

    session.flush().await.unwrap();
    assert!(session.is_saving());
    settle(50).await;
    assert_eq!(inner(&session).lock_state().phase, PersistPhase::Flushing);
    settle(60).await;
    assert!(!session.is_saving());
    assert_eq!(session.flush().await.unwrap(), FlushOutcome::NothingPending);
    assert_eq!(store.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn edits_made_while_busy_are_flushed_after_release() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);
    draw(&session, &[(0.0, 0.0), (5.0, 5.0)]);
    session.flush().await.unwrap();

    draw(&session, &[(50.0, 50.0), (55.0, 55.0)]);
    assert_eq!(session.pointer_up().await.unwrap().unwrap(), FlushOutcome::Busy);
    assert_eq!(session.unsaved_count(), 1);

    settle(150).await;

    assert_eq!(store.write_count(), 2);
    assert_eq!(session.unsaved_count(), 0);
    assert_eq!(store.snapshot(&TileKey::origin()).unwrap().strokes.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn skipped_update_caught_up_when_follow_up_has_no_session() {
    let key = TileKey::origin();
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, identity, .. } = session_for("a", &store);
    let remote = Tile { strokes: vec![saved("b", vec![0.0, 0.0, 1.0, 1.0], 5)], updated_at: 5 };
    store.write(&key, &remote).await.unwrap();
    {
        let mut state = inner(&session).lock_state();
        state.phase = PersistPhase::Flushing;
        state.resync_pending = true;
        state
            .buffer
            .begin_stroke("a", None, "#000000", Point::new(9.0, 9.0), 10)
            .unwrap();
    }

    release(inner(&session), true);
    identity.sign_out();
    settle(1).await;

    let strokes = session.strokes();
    assert_eq!(strokes.len(), 1);
    assert_eq!(strokes[0].owner(), "b");
    assert_eq!(store.write_count(), 1);
    assert!(!session.is_saving());
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn failed_write_keeps_strokes_pending() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, sink, .. } = session_for("a", &store);
    draw(&session, &[(0.0, 0.0), (5.0, 5.0)]);
    store.fail_next_writes(1);

    let err = session.flush().await.unwrap_err();

    assert!(matches!(err, FlushError::Write(_)));
    assert_eq!(err.error_code(), "E_FLUSH_WRITE");
    assert!(err.retryable());
    assert_eq!(session.unsaved_count(), 1);
    assert!(!session.is_saving());
    assert_eq!(sink.count(NoticeKind::SaveFailed), 1);

    assert_eq!(session.flush().await.unwrap(), FlushOutcome::Written { strokes: 1 });
    assert_eq!(session.unsaved_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_read_releases_guard_without_writing() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);
    draw(&session, &[(0.0, 0.0), (5.0, 5.0)]);
    store.fail_next_reads(1);

    let err = session.flush().await.unwrap_err();

    assert_eq!(err.error_code(), "E_FLUSH_READ");
    assert_eq!(store.write_count(), 0);
    assert!(!session.is_saving());
    assert_eq!(session.unsaved_count(), 1);
}

// =============================================================================
// Triggers
// =============================================================================

#[tokio::test(start_paused = true)]
async fn interval_flushes_while_drawing() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);
    draw(&session, &[(0.0, 0.0), (5.0, 5.0)]);

    settle(1999).await;
    assert_eq!(store.write_count(), 0);
    settle(2).await;
    assert_eq!(store.write_count(), 1);

    session.pointer_move(Point::new(9.0, 9.0));
    settle(2000).await;
    assert_eq!(store.write_count(), 2);
    let tile = store.snapshot(&TileKey::origin()).unwrap();
    assert_eq!(tile.strokes[0].point_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn pointer_up_flushes_once_and_stops_interval() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);
    draw(&session, &[(0.0, 0.0), (5.0, 5.0), (9.0, 9.0)]);

    let outcome = session.pointer_up().await.unwrap().unwrap();

    assert_eq!(outcome, FlushOutcome::Written { strokes: 1 });
    settle(5000).await;
    assert_eq!(store.write_count(), 1);
}
