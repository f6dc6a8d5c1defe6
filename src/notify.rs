//! User-facing notices and their throttling.
//!
//! DESIGN
//! ======
//! The notification sink is fire-and-forget. `ThrottledNotifier` keeps one
//! timestamp per notice kind and drops repeats inside the cooldown, so an
//! eraser lingering over someone else's strokes raises one notice, not one
//! per pointer sample.

#[cfg(test)]
#[path = "notify_test.rs"]
mod notify_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

// =============================================================================
// NOTICES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// The eraser passed over strokes owned by someone else.
    ForeignErase,
    /// A flush failed; the next trigger retries it.
    SaveFailed,
    /// Drawing was attempted without a session identity.
    SignInRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

impl NoticeKind {
    #[must_use]
    pub fn level(self) -> NoticeLevel {
        match self {
            Self::SignInRequired => NoticeLevel::Info,
            Self::ForeignErase | Self::SaveFailed => NoticeLevel::Error,
        }
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::ForeignErase => "Cannot erase other's drawings",
            Self::SaveFailed => "Failed to save drawing; retrying shortly",
            Self::SignInRequired => "Sign in to start drawing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub level: NoticeLevel,
    pub message: String,
}

impl From<NoticeKind> for Notice {
    fn from(kind: NoticeKind) -> Self {
        Self { kind, level: kind.level(), message: kind.message().to_owned() }
    }
}

/// Receiver of user-facing notices (toasts). No response contract.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Sink that only logs. Used when the host has no notification UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => info!(kind = ?notice.kind, "{}", notice.message),
            NoticeLevel::Error => warn!(kind = ?notice.kind, "{}", notice.message),
        }
    }
}

// =============================================================================
// THROTTLE
// =============================================================================

/// Forwards at most one notice per kind per cooldown window.
#[derive(Clone)]
pub struct ThrottledNotifier {
    sink: Arc<dyn NotificationSink>,
    cooldown: Duration,
    last_sent: Arc<Mutex<HashMap<NoticeKind, Instant>>>,
}

impl ThrottledNotifier {
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>, cooldown: Duration) -> Self {
        Self { sink, cooldown, last_sent: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Send `kind` unless one was sent within the cooldown. Returns whether
    /// the notice went out.
    pub fn notify(&self, kind: NoticeKind) -> bool {
        self.notify_at(kind, Instant::now())
    }

    fn notify_at(&self, kind: NoticeKind, now: Instant) -> bool {
        {
            let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(prev) = last_sent.get(&kind) {
                if now.duration_since(*prev) < self.cooldown {
                    debug!(?kind, "notice throttled");
                    return false;
                }
            }
            last_sent.insert(kind, now);
        }
        self.sink.notify(Notice::from(kind));
        true
    }

    /// Forget the last send time of `kind`, so the next one goes out at once.
    pub fn reset(&self, kind: NoticeKind) {
        self.last_sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind);
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
