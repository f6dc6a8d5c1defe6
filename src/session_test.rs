use super::test_helpers::{TestSession, draw, session_for, settle};
use super::*;
use crate::store::MemoryTileStore;

#[derive(Default)]
struct RecordingTips {
    owners: Mutex<Vec<String>>,
}

impl TipHandler for RecordingTips {
    fn tip_requested(&self, owner: &str) {
        self.owners.lock().unwrap().push(owner.to_owned());
    }
}

async fn connected(owner: &str, store: &Arc<MemoryTileStore>) -> TestSession {
    let ts = session_for(owner, store);
    ts.session.connect();
    settle(1).await;
    ts
}

/// A second session that commits one horizontal stroke from (0,0) to (100,0).
async fn foreign_stroke(owner: &str, store: &Arc<MemoryTileStore>) {
    let other = session_for(owner, store);
    draw(&other.session, &[(0.0, 0.0), (100.0, 0.0)]);
    other.session.pointer_up().await.unwrap().unwrap();
    settle(1).await;
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test(start_paused = true)]
async fn released_stroke_reaches_other_session() {
    let store = Arc::new(MemoryTileStore::new());
    let a = connected("a", &store).await;
    let b = connected("b", &store).await;
    let bootstrap_writes = store.write_count();

    draw(&a.session, &[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
    let outcome = a.session.pointer_up().await.unwrap().unwrap();

    assert_eq!(outcome, FlushOutcome::Written { strokes: 1 });
    assert_eq!(store.write_count(), bootstrap_writes + 1);
    assert!(a.session.strokes()[0].is_saved());

    settle(1).await;
    let seen = b.session.strokes();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].owner(), "a");
    assert_eq!(seen[0].points(), &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);

    settle(500).await;
    assert_eq!(store.write_count(), bootstrap_writes + 1);
    assert_eq!(a.session.strokes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn local_stroke_survives_concurrent_foreign_flush() {
    let store = Arc::new(MemoryTileStore::new());
    let a = connected("a", &store).await;
    let b = connected("b", &store).await;

    draw(&a.session, &[(1.0, 1.0), (2.0, 2.0)]);
    draw(&b.session, &[(50.0, 50.0), (60.0, 60.0)]);
    b.session.pointer_up().await.unwrap().unwrap();
    settle(1).await;

    let strokes = a.session.strokes();
    assert_eq!(strokes.len(), 2);
    assert_eq!(strokes.iter().filter(|s| s.is_owned_by("a")).count(), 1);
    assert!(!strokes[1].is_saved());

    a.session.pointer_move(Point::new(3.0, 3.0));
    assert_eq!(a.session.strokes()[1].point_count(), 3);
    a.session.pointer_up().await.unwrap().unwrap();
    settle(200).await;

    for session in [&a.session, &b.session] {
        let strokes = session.strokes();
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes.iter().filter(|s| s.is_owned_by("a")).count(), 1);
        assert_eq!(strokes.iter().filter(|s| s.is_owned_by("b")).count(), 1);
    }
    let tile = store.snapshot(&TileKey::origin()).unwrap();
    assert_eq!(tile.strokes.len(), 2);
}

// =============================================================================
// Identity
// =============================================================================

#[tokio::test(start_paused = true)]
async fn drawing_requires_sign_in() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, identity, sink, .. } = session_for("a", &store);
    identity.sign_out();

    assert!(!session.pointer_down(Point::new(0.0, 0.0)));
    assert!(!session.pointer_down(Point::new(1.0, 1.0)));

    assert!(!session.is_drawing());
    assert!(session.strokes().is_empty());
    assert_eq!(sink.count(NoticeKind::SignInRequired), 1);

    identity.sign_in("a", Some("Ada"));
    assert!(session.pointer_down(Point::new(0.0, 0.0)));
    assert_eq!(session.strokes()[0].owner_display_name.as_deref(), Some("Ada"));
}

#[tokio::test(start_paused = true)]
async fn pen_stroke_uses_selected_color() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);
    assert_eq!(session.color(), input::DEFAULT_COLOR);
    session.set_color(input::PALETTE[2]);

    draw(&session, &[(0.0, 0.0)]);

    assert_eq!(session.strokes()[0].color, "#FF0000");
    assert!(session.is_drawing());
}

// =============================================================================
// Eraser
// =============================================================================

#[tokio::test(start_paused = true)]
async fn erasing_foreign_stroke_is_refused_with_one_notice() {
    let store = Arc::new(MemoryTileStore::new());
    let a = connected("a", &store).await;
    foreign_stroke("b", &store).await;
    assert_eq!(a.session.strokes().len(), 1);
    let writes = store.write_count();
    let before = a.session.strokes();

    a.session.set_tool(ToolKind::Eraser);
    assert!(a.session.pointer_down(Point::new(0.0, 0.0)));
    for x in 0..5 {
        a.session.pointer_move(Point::new(f64::from(x), 0.0));
    }

    assert_eq!(a.session.strokes(), before);
    assert_eq!(a.sink.count(NoticeKind::ForeignErase), 1);
    assert_eq!(store.write_count(), writes);
}

#[tokio::test(start_paused = true)]
async fn pointer_up_resets_foreign_erase_notice() {
    let store = Arc::new(MemoryTileStore::new());
    let a = connected("a", &store).await;
    foreign_stroke("b", &store).await;
    a.session.set_tool(ToolKind::Eraser);

    a.session.pointer_down(Point::new(0.0, 0.0));
    a.session.pointer_move(Point::new(0.0, 0.0));
    a.session.pointer_up().await.unwrap().unwrap();
    a.session.pointer_down(Point::new(0.0, 0.0));
    a.session.pointer_move(Point::new(0.0, 0.0));

    assert_eq!(a.sink.count(NoticeKind::ForeignErase), 2);
}

#[tokio::test(start_paused = true)]
async fn erasing_own_stroke_writes_before_pointer_up() {
    let store = Arc::new(MemoryTileStore::new());
    let a = connected("a", &store).await;
    foreign_stroke("b", &store).await;
    draw(&a.session, &[(10.0, 200.0), (20.0, 200.0)]);
    a.session.pointer_up().await.unwrap().unwrap();
    settle(200).await;
    assert_eq!(store.snapshot(&TileKey::origin()).unwrap().strokes.len(), 2);

    a.session.set_tool(ToolKind::Eraser);
    a.session.pointer_down(Point::new(15.0, 200.0));
    a.session.pointer_move(Point::new(12.0, 201.0));
    settle(1).await;

    let tile = store.snapshot(&TileKey::origin()).unwrap();
    assert_eq!(tile.strokes.len(), 1);
    assert_eq!(tile.strokes[0].owner(), "b");
    assert_eq!(a.session.strokes().len(), 1);

    // The write's echo and later notifications must not bring it back.
    settle(500).await;
    assert_eq!(a.session.strokes().len(), 1);
    assert!(a.session.is_drawing());
}

#[tokio::test(start_paused = true)]
async fn erase_during_echo_grace_is_written_on_release() {
    let store = Arc::new(MemoryTileStore::new());
    let a = connected("a", &store).await;
    draw(&a.session, &[(10.0, 100.0), (20.0, 100.0)]);
    a.session.pointer_up().await.unwrap().unwrap();
    draw(&a.session, &[(10.0, 300.0), (20.0, 300.0)]);
    a.session.pointer_up().await.unwrap().unwrap();
    settle(300).await;
    assert_eq!(store.snapshot(&TileKey::origin()).unwrap().strokes.len(), 2);
    assert!(!a.session.is_saving());

    a.session.set_tool(ToolKind::Eraser);
    a.session.pointer_down(Point::new(15.0, 100.0));
    a.session.pointer_move(Point::new(12.0, 101.0));
    settle(10).await;
    assert_eq!(store.snapshot(&TileKey::origin()).unwrap().strokes.len(), 1);

    // Still inside the first erase's echo grace, so this flush is refused.
    a.session.pointer_move(Point::new(15.0, 300.0));
    settle(1).await;
    assert!(a.session.strokes().is_empty());
    assert_eq!(store.snapshot(&TileKey::origin()).unwrap().strokes.len(), 1);

    settle(150).await;

    assert!(store.snapshot(&TileKey::origin()).unwrap().strokes.is_empty());
    assert!(a.session.is_drawing());
    assert!(a.session.strokes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn eraser_preview_follows_pointer() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);
    assert!(session.render_frame().eraser_preview.is_none());

    session.set_tool(ToolKind::Eraser);
    session.set_eraser_size(30.0);
    session.pointer_move(Point::new(10.0, 10.0));

    let preview = session.render_frame().eraser_preview.unwrap();
    assert_eq!(preview.center, Point::new(10.0, 10.0));
    assert!((preview.radius - 15.0).abs() < f64::EPSILON);

    session.pointer_leave().await.unwrap().unwrap();
    assert!(session.render_frame().eraser_preview.is_none());
}

#[tokio::test(start_paused = true)]
async fn eraser_size_is_clamped() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);
    assert!((session.eraser_size() - 20.0).abs() < f64::EPSILON);
    session.set_eraser_size(500.0);
    assert!((session.eraser_size() - input::ERASER_MAX_SIZE).abs() < f64::EPSILON);
    session.set_eraser_size(f64::NAN);
    assert!((session.eraser_size() - input::ERASER_MAX_SIZE).abs() < f64::EPSILON);
}

// =============================================================================
// Tooltip and tipping
// =============================================================================

#[tokio::test(start_paused = true)]
async fn tooltip_shows_on_hover_and_hides_after_delay() {
    let store = Arc::new(MemoryTileStore::new());
    let a = connected("a", &store).await;
    foreign_stroke("b", &store).await;

    a.session.pointer_move(Point::new(50.0, 3.0));
    let tooltip = a.session.tooltip().unwrap();
    assert_eq!(tooltip.owner, "b");
    assert!(tooltip.stroke_key.starts_with("b-"));

    a.session.pointer_move(Point::new(50.0, 50.0));
    assert!(a.session.tooltip().is_some());
    settle(50).await;
    a.session.pointer_move(Point::new(50.0, 2.0));
    settle(100).await;
    assert!(a.session.tooltip().is_some());

    a.session.pointer_move(Point::new(50.0, 8.0));
    settle(101).await;
    assert!(a.session.tooltip().is_none());
}

#[tokio::test(start_paused = true)]
async fn tip_request_hands_owner_over() {
    let store = Arc::new(MemoryTileStore::new());
    let tips = Arc::new(RecordingTips::default());
    let a = connected("a", &store).await;
    let session = a.session.clone().with_tip_handler(Arc::clone(&tips) as Arc<dyn TipHandler>);
    foreign_stroke("b", &store).await;

    assert_eq!(session.request_tip(), None);
    session.pointer_move(Point::new(50.0, 1.0));
    assert_eq!(session.request_tip(), Some("b".to_owned()));

    assert_eq!(*tips.owners.lock().unwrap(), vec!["b".to_owned()]);
    assert!(session.tooltip().is_none());
}

#[tokio::test(start_paused = true)]
async fn tip_request_without_handler_hands_nothing_over() {
    let store = Arc::new(MemoryTileStore::new());
    let a = connected("a", &store).await;
    foreign_stroke("b", &store).await;

    a.session.pointer_move(Point::new(50.0, 1.0));
    assert_eq!(a.session.request_tip(), None);
    assert!(a.session.tooltip().is_none());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent() {
    let store = Arc::new(MemoryTileStore::new());
    let a = connected("a", &store).await;
    a.session.connect();
    settle(1).await;
    assert_eq!(store.subscriber_count(&TileKey::origin()), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_stops_listening_and_interval() {
    let store = Arc::new(MemoryTileStore::new());
    let a = connected("a", &store).await;
    draw(&a.session, &[(0.0, 0.0), (1.0, 1.0)]);

    a.session.disconnect();
    settle(5000).await;

    assert!(!a.session.is_connected());
    assert!(!a.session.is_drawing());
    assert_eq!(store.subscriber_count(&TileKey::origin()), 0);
    assert_eq!(a.session.unsaved_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn clones_share_one_session() {
    let store = Arc::new(MemoryTileStore::new());
    let TestSession { session, .. } = session_for("a", &store);
    let clone = session.clone();
    draw(&session, &[(0.0, 0.0)]);
    assert_eq!(clone.id(), session.id());
    assert_eq!(clone.strokes().len(), 1);
    assert_eq!(clone.tile(), &TileKey::origin());
}
