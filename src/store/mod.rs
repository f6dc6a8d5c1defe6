//! Realtime document store: the single shared mutable resource.
//!
//! ARCHITECTURE
//! ============
//! A store offers a point read, an atomic replace-or-create write, and a
//! subscription that delivers the current state first and then every later
//! version to every subscriber, the writer included. A subscription that ends
//! means "notifications may have been missed"; the listener answers that by
//! subscribing again, which starts with a fresh read.
//!
//! Backends: [`MemoryTileStore`] (in-process, with fault injection for tests)
//! and [`PgTileStore`] (Postgres rows + `LISTEN/NOTIFY`).

mod memory;
mod postgres;

pub use memory::MemoryTileStore;
pub use postgres::PgTileStore;

use tokio::sync::mpsc;

use crate::error::ErrorCode;
use crate::stroke::{Tile, TileKey};

/// Capacity of a subscription queue. A subscriber that falls this far behind
/// is disconnected and catches up through a fresh subscription.
pub const SUBSCRIPTION_CAPACITY: usize = 64;

/// One delivered document version. `None` means the tile does not exist.
pub type TileSnapshot = Option<Tile>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("tile encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "E_DATABASE",
            Self::Migrate(_) => "E_MIGRATE",
            Self::Encoding(_) => "E_TILE_ENCODING",
            Self::Unavailable(_) => "E_STORE_UNAVAILABLE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Unavailable(_))
    }
}

/// Stream of document versions for one tile.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<TileSnapshot>,
}

impl Subscription {
    #[must_use]
    pub fn new(rx: mpsc::Receiver<TileSnapshot>) -> Self {
        Self { rx }
    }

    /// Next document version, or `None` once the backend dropped the
    /// subscription.
    pub async fn next(&mut self) -> Option<TileSnapshot> {
        self.rx.recv().await
    }
}

/// Backend holding the shared tiles.
#[async_trait::async_trait]
pub trait TileStore: Send + Sync {
    /// Current state of `key`, `None` if the tile does not exist.
    async fn read(&self, key: &TileKey) -> Result<TileSnapshot, StoreError>;

    /// Replace (or create) the whole tile and notify every subscriber.
    async fn write(&self, key: &TileKey, tile: &Tile) -> Result<(), StoreError>;

    /// Create the tile only if it does not exist yet. Returns whether it was
    /// created.
    async fn create_if_absent(&self, key: &TileKey, tile: &Tile) -> Result<bool, StoreError>;

    /// Subscribe to `key`. The first delivery is the current state.
    async fn subscribe(&self, key: &TileKey) -> Result<Subscription, StoreError>;
}
