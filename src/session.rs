//! Drawing session: one user's view of one tile.
//!
//! ARCHITECTURE
//! ============
//! `DrawSession` is a cheap handle over shared `SessionInner`. Pointer events
//! mutate the buffer synchronously under one mutex; everything that awaits
//! (flushes, the listener, the echo-grace release) runs on spawned tasks that
//! take the lock only between await points.
//!
//! ```text
//! pointer_down ── begin stroke, start interval timer ──► spawn_flush every period
//! pointer_move ── hover: hit-test → tooltip / hide timer
//!              ── pen:    extend last own stroke
//!              ── eraser: erase own strokes → spawn_flush, foreign → notice
//! pointer_up   ── stop timer, reset eraser notice ──► spawn_flush
//! listener     ── every tile version ──► reconcile (skipped while flushing)
//! ```
//!
//! Timers and the listener hold the session weakly, so dropping the last
//! handle stops them.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::StrokeBuffer;
use crate::config::SyncConfig;
use crate::erase;
use crate::hit;
use crate::identity::{IdentityProvider, TipHandler};
use crate::input::{self, DEFAULT_COLOR, EraserPreview, RenderFrame, ToolKind, Tooltip};
use crate::listener;
use crate::notify::{NoticeKind, NotificationSink, ThrottledNotifier};
use crate::persist::{self, FlushError, FlushOutcome, PersistPhase};
use crate::store::TileStore;
use crate::stroke::{Point, Stroke, TileKey, now_ms};
use crate::timer::{OneShotTimer, RepeatingTimer};

// =============================================================================
// SHARED STATE
// =============================================================================

/// Mutable state of a session. Only touched under `SessionInner::state`.
pub(crate) struct SessionState {
    pub(crate) buffer: StrokeBuffer,
    pub(crate) phase: PersistPhase,
    /// A tile version was skipped while flushing.
    pub(crate) resync_pending: bool,
    pub(crate) drawing: bool,
    tool: ToolKind,
    color: String,
    eraser_size: f64,
    pointer: Option<Point>,
    tooltip: Option<Tooltip>,
}

impl SessionState {
    fn new(config: &SyncConfig) -> Self {
        Self {
            buffer: StrokeBuffer::new(),
            phase: PersistPhase::Idle,
            resync_pending: false,
            drawing: false,
            tool: ToolKind::Pen,
            color: DEFAULT_COLOR.to_owned(),
            eraser_size: input::clamp_eraser_size(config.eraser_size).unwrap_or(input::ERASER_MIN_SIZE),
            pointer: None,
            tooltip: None,
        }
    }

    fn eraser_radius(&self) -> f64 {
        self.eraser_size / 2.0
    }
}

pub(crate) struct SessionInner {
    pub(crate) id: Uuid,
    pub(crate) tile: TileKey,
    pub(crate) store: Arc<dyn TileStore>,
    pub(crate) notifier: ThrottledNotifier,
    pub(crate) config: SyncConfig,
    identity: Arc<dyn IdentityProvider>,
    tips: Mutex<Option<Arc<dyn TipHandler>>>,
    state: Mutex<SessionState>,
    flush_timer: Mutex<RepeatingTimer>,
    tooltip_timer: Mutex<OneShotTimer>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionInner {
    /// Owner id of the signed-in user, if any.
    pub(crate) fn owner(&self) -> Option<String> {
        self.identity.wallet_public_key()
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hide_tooltip_later(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.tooltip_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .schedule(self.config.tooltip_hide_delay, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock_state().tooltip = None;
                }
            });
    }

    fn cancel_tooltip_hide(&self) {
        self.tooltip_timer.lock().unwrap_or_else(PoisonError::into_inner).cancel();
    }

    fn start_flush_timer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.flush_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start(self.config.flush_interval, move || {
                if let Some(inner) = weak.upgrade() {
                    persist::spawn_flush(&inner, "interval");
                }
            });
    }

    fn stop_flush_timer(&self) {
        self.flush_timer.lock().unwrap_or_else(PoisonError::into_inner).cancel();
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(task) = self.listener.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Handle to one drawing session. Clones share the same session.
#[derive(Clone)]
pub struct DrawSession {
    inner: Arc<SessionInner>,
}

impl DrawSession {
    #[must_use]
    pub fn new(
        store: Arc<dyn TileStore>,
        identity: Arc<dyn IdentityProvider>,
        sink: Arc<dyn NotificationSink>,
        config: SyncConfig,
    ) -> Self {
        let inner = SessionInner {
            id: Uuid::new_v4(),
            tile: config.tile.clone(),
            store,
            notifier: ThrottledNotifier::new(sink, config.notice_cooldown),
            state: Mutex::new(SessionState::new(&config)),
            config,
            identity,
            tips: Mutex::new(None),
            flush_timer: Mutex::new(RepeatingTimer::new()),
            tooltip_timer: Mutex::new(OneShotTimer::new()),
            listener: Mutex::new(None),
        };
        Self { inner: Arc::new(inner) }
    }

    #[must_use]
    pub fn with_tip_handler(self, handler: Arc<dyn TipHandler>) -> Self {
        *self.inner.tips.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
        self
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    #[must_use]
    pub fn tile(&self) -> &TileKey {
        &self.inner.tile
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start listening to the tile. Calling it again while connected is a no-op.
    pub fn connect(&self) {
        let mut slot = self.inner.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        info!(session = %self.inner.id, tile = %self.inner.tile, "session connecting");
        *slot = Some(listener::spawn_listener(&self.inner));
    }

    /// Stop listening and cancel the timers. A flush already in flight still
    /// completes.
    pub fn disconnect(&self) {
        if let Some(task) = self.inner.listener.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        self.inner.stop_flush_timer();
        self.inner.cancel_tooltip_hide();
        self.inner.lock_state().drawing = false;
        info!(session = %self.inner.id, "session disconnected");
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    // -------------------------------------------------------------------------
    // Tools
    // -------------------------------------------------------------------------

    pub fn set_tool(&self, tool: ToolKind) {
        self.inner.lock_state().tool = tool;
    }

    pub fn set_color(&self, color: impl Into<String>) {
        self.inner.lock_state().color = color.into();
    }

    /// Set the eraser diameter, clamped to the supported range.
    pub fn set_eraser_size(&self, size: f64) {
        match input::clamp_eraser_size(size) {
            Some(size) => self.inner.lock_state().eraser_size = size,
            None => warn!(session = %self.inner.id, size, "ignoring non-finite eraser size"),
        }
    }

    #[must_use]
    pub fn tool(&self) -> ToolKind {
        self.inner.lock_state().tool
    }

    #[must_use]
    pub fn color(&self) -> String {
        self.inner.lock_state().color.clone()
    }

    #[must_use]
    pub fn eraser_size(&self) -> f64 {
        self.inner.lock_state().eraser_size
    }

    // -------------------------------------------------------------------------
    // Pointer input
    // -------------------------------------------------------------------------

    /// Begin a gesture. Returns `false` (and raises a sign-in notice) when no
    /// one is signed in.
    pub fn pointer_down(&self, position: Point) -> bool {
        let Some(owner) = self.inner.owner() else {
            self.inner.notifier.notify(NoticeKind::SignInRequired);
            return false;
        };
        let display_name = self.inner.identity.display_name();

        {
            let mut state = self.inner.lock_state();
            state.pointer = Some(position);
            if state.tool == ToolKind::Pen {
                let color = state.color.clone();
                if let Err(e) = state
                    .buffer
                    .begin_stroke(&owner, display_name.as_deref(), &color, position, now_ms())
                {
                    warn!(session = %self.inner.id, error = %e, "stroke not started");
                    return false;
                }
            }
            state.drawing = true;
            state.tooltip = None;
        }

        self.inner.cancel_tooltip_hide();
        self.inner.start_flush_timer();
        true
    }

    /// Track the pointer: hover hit-test when idle, erase or extend while
    /// drawing.
    pub fn pointer_move(&self, position: Point) {
        let owner = self.inner.owner();
        let mut state = self.inner.lock_state();
        state.pointer = Some(position);

        if !state.drawing {
            let hovered = hit::stroke_at(state.buffer.strokes(), position, self.inner.config.hit_threshold)
                .map(|hit| Tooltip::for_stroke(hit.stroke, position));
            let showing = state.tooltip.is_some();
            match hovered {
                Some(tooltip) => {
                    state.tooltip = Some(tooltip);
                    drop(state);
                    self.inner.cancel_tooltip_hide();
                }
                None if showing => {
                    drop(state);
                    self.inner.hide_tooltip_later();
                }
                None => {}
            }
            return;
        }

        let Some(owner) = owner else {
            return;
        };
        let tool = state.tool;
        match tool {
            ToolKind::Pen => {
                state.buffer.extend_last(&owner, position);
            }
            ToolKind::Eraser => {
                let radius = state.eraser_radius();
                let report = erase::erase_at(&mut state.buffer, &owner, position, radius);
                drop(state);
                if report.touched_foreign() {
                    self.inner.notifier.notify(NoticeKind::ForeignErase);
                }
                if report.removed > 0 {
                    debug!(session = %self.inner.id, removed = report.removed, "strokes erased");
                    persist::spawn_flush(&self.inner, "erase");
                }
            }
        }
    }

    /// End the gesture and flush at once.
    pub fn pointer_up(&self) -> JoinHandle<Result<FlushOutcome, FlushError>> {
        self.end_gesture("pointer_up")
    }

    /// The pointer left the surface. Ends the gesture like `pointer_up` and
    /// hides the eraser preview.
    pub fn pointer_leave(&self) -> JoinHandle<Result<FlushOutcome, FlushError>> {
        self.inner.lock_state().pointer = None;
        self.end_gesture("pointer_leave")
    }

    fn end_gesture(&self, reason: &'static str) -> JoinHandle<Result<FlushOutcome, FlushError>> {
        self.inner.lock_state().drawing = false;
        self.inner.stop_flush_timer();
        self.inner.notifier.reset(NoticeKind::ForeignErase);
        persist::spawn_flush(&self.inner, reason)
    }

    /// Flush now, on the caller's task.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing the tile fails. The strokes stay
    /// pending and the next trigger retries.
    pub async fn flush(&self) -> Result<FlushOutcome, FlushError> {
        persist::flush(&self.inner).await
    }

    // -------------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------------

    /// Current in-memory stroke list, remote strokes first.
    #[must_use]
    pub fn strokes(&self) -> Vec<Stroke> {
        self.inner.lock_state().buffer.strokes().to_vec()
    }

    #[must_use]
    pub fn render_frame(&self) -> RenderFrame {
        let state = self.inner.lock_state();
        let eraser_preview = match (state.tool, state.pointer) {
            (ToolKind::Eraser, Some(center)) => Some(EraserPreview { center, radius: state.eraser_radius() }),
            _ => None,
        };
        RenderFrame { strokes: state.buffer.strokes().to_vec(), eraser_preview }
    }

    #[must_use]
    pub fn tooltip(&self) -> Option<Tooltip> {
        self.inner.lock_state().tooltip.clone()
    }

    /// Whether a flush is in flight (echo grace included).
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.inner.lock_state().phase == PersistPhase::Flushing
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.inner.lock_state().drawing
    }

    /// Number of this session's strokes never acknowledged by the store.
    #[must_use]
    pub fn unsaved_count(&self) -> usize {
        self.inner
            .owner()
            .map_or(0, |owner| self.inner.lock_state().buffer.unsaved_count(&owner))
    }

    // -------------------------------------------------------------------------
    // Tipping
    // -------------------------------------------------------------------------

    /// Hand the hovered stroke's owner to the tip handler and hide the
    /// tooltip. Returns the owner that was handed over.
    pub fn request_tip(&self) -> Option<String> {
        let tooltip = self.inner.lock_state().tooltip.take()?;
        self.inner.cancel_tooltip_hide();
        let handler = self.inner.tips.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match handler {
            Some(handler) => {
                info!(session = %self.inner.id, owner = %tooltip.owner, stroke = %tooltip.stroke_key, "tip requested");
                handler.tip_requested(&tooltip.owner);
                Some(tooltip.owner)
            }
            None => {
                debug!(session = %self.inner.id, "tip requested without a tip handler");
                None
            }
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
