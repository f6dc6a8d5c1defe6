//! Sync engine tuning, loaded from environment variables.
//!
//! Unset or unparsable variables fall back to the defaults below.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use tracing::info;

use crate::stroke::TileKey;

pub(crate) const DEFAULT_FLUSH_INTERVAL_MS: u64 = 2000;
pub(crate) const DEFAULT_ECHO_GRACE_MS: u64 = 100;
pub(crate) const DEFAULT_NOTICE_COOLDOWN_MS: u64 = 1000;
pub(crate) const DEFAULT_HIT_THRESHOLD_PX: f64 = 5.0;
pub(crate) const DEFAULT_TOOLTIP_HIDE_MS: u64 = 100;
pub(crate) const DEFAULT_ERASER_SIZE: f64 = 20.0;
pub(crate) const DEFAULT_RESUBSCRIBE_BASE_MS: u64 = 250;
pub(crate) const DEFAULT_RESUBSCRIBE_MAX_MS: u64 = 5000;

/// Timing and geometry knobs for a drawing session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Tile this session draws on.
    pub tile: TileKey,
    /// Period of the flush timer while a gesture is active.
    pub flush_interval: Duration,
    /// How long the in-flight guard stays up after a successful write, so the
    /// write's own echo is not reconciled.
    pub echo_grace: Duration,
    /// Minimum gap between two notices of the same kind.
    pub notice_cooldown: Duration,
    /// Hover distance, in pixels, at which a stroke counts as under the pointer.
    pub hit_threshold: f64,
    /// Delay before the tooltip hides once the pointer leaves every stroke.
    pub tooltip_hide_delay: Duration,
    /// Eraser diameter in pixels.
    pub eraser_size: f64,
    /// Step of the linear back-off between re-subscribe attempts.
    pub resubscribe_base: Duration,
    /// Ceiling of the re-subscribe back-off.
    pub resubscribe_max: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tile: TileKey::origin(),
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            echo_grace: Duration::from_millis(DEFAULT_ECHO_GRACE_MS),
            notice_cooldown: Duration::from_millis(DEFAULT_NOTICE_COOLDOWN_MS),
            hit_threshold: DEFAULT_HIT_THRESHOLD_PX,
            tooltip_hide_delay: Duration::from_millis(DEFAULT_TOOLTIP_HIDE_MS),
            eraser_size: DEFAULT_ERASER_SIZE,
            resubscribe_base: Duration::from_millis(DEFAULT_RESUBSCRIBE_BASE_MS),
            resubscribe_max: Duration::from_millis(DEFAULT_RESUBSCRIBE_MAX_MS),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let tile = std::env::var("SYNC_TILE_KEY").map_or_else(|_| TileKey::origin(), TileKey::new);
        let config = Self {
            tile,
            flush_interval: env_millis("SYNC_FLUSH_INTERVAL_MS", DEFAULT_FLUSH_INTERVAL_MS),
            echo_grace: env_millis("SYNC_ECHO_GRACE_MS", DEFAULT_ECHO_GRACE_MS),
            notice_cooldown: env_millis("SYNC_NOTICE_COOLDOWN_MS", DEFAULT_NOTICE_COOLDOWN_MS),
            hit_threshold: env_parse("SYNC_HIT_THRESHOLD_PX", DEFAULT_HIT_THRESHOLD_PX),
            tooltip_hide_delay: env_millis("SYNC_TOOLTIP_HIDE_MS", DEFAULT_TOOLTIP_HIDE_MS),
            eraser_size: env_parse("SYNC_ERASER_SIZE", DEFAULT_ERASER_SIZE),
            resubscribe_base: env_millis("SYNC_RESUBSCRIBE_BASE_MS", DEFAULT_RESUBSCRIBE_BASE_MS),
            resubscribe_max: env_millis("SYNC_RESUBSCRIBE_MAX_MS", DEFAULT_RESUBSCRIBE_MAX_MS),
        };
        info!(
            tile = %config.tile,
            flush_interval_ms = u64::try_from(config.flush_interval.as_millis()).unwrap_or(u64::MAX),
            echo_grace_ms = u64::try_from(config.echo_grace.as_millis()).unwrap_or(u64::MAX),
            "sync configured"
        );
        config
    }

    /// Back-off before re-subscribe attempt `attempt` (1-based).
    #[must_use]
    pub fn resubscribe_delay(&self, attempt: u32) -> Duration {
        self.resubscribe_base
            .saturating_mul(attempt.max(1))
            .min(self.resubscribe_max)
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: u64) -> Duration {
    Duration::from_millis(env_parse(key, default))
}
