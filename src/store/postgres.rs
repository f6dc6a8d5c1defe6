//! Postgres-backed tile store.
//!
//! DESIGN
//! ======
//! One row per tile: `tiles(key, strokes JSONB, updated_at)`. A write upserts
//! the row and calls `pg_notify('tile_changed', key)` in the same transaction,
//! so a notification is only ever sent for a committed version.
//!
//! Subscriptions hold a `PgListener` on `tile_changed`; every notification for
//! the subscribed key triggers a read of the row, which is then delivered.
//! Reading on notify (instead of shipping the document in the payload) keeps
//! payloads under the 8000-byte NOTIFY limit.
//!
//! ERROR HANDLING
//! ==============
//! When the listener connection drops, notifications sent in between are
//! lost. The subscription is closed in that case so the session re-subscribes
//! and starts over from a fresh read.

#[cfg(test)]
#[path = "postgres_test.rs"]
mod postgres_test;

use sqlx::PgPool;
use sqlx::postgres::{PgListener, PgPoolOptions};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{SUBSCRIPTION_CAPACITY, StoreError, Subscription, TileSnapshot, TileStore};
use crate::codec;
use crate::stroke::{Tile, TileKey};

/// Channel carrying the key of every written tile.
pub const TILE_CHANNEL: &str = "tile_changed";

#[derive(Clone)]
pub struct PgTileStore {
    pool: PgPool,
}

impl PgTileStore {
    /// Connect and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or migrations fail.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("src/store/migrations").run(&pool).await?;
        info!("tile store migrations applied");

        Ok(Self { pool })
    }

    /// Wrap an existing pool. Migrations are the caller's responsibility.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn read_row(pool: &PgPool, key: &TileKey) -> Result<TileSnapshot, StoreError> {
        let row = sqlx::query_as::<_, (serde_json::Value, i64)>("SELECT strokes, updated_at FROM tiles WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(pool)
            .await?;

        Ok(row.map(|(strokes, updated_at)| Tile { strokes: codec::decode_strokes(strokes), updated_at }))
    }
}

#[async_trait::async_trait]
impl TileStore for PgTileStore {
    async fn read(&self, key: &TileKey) -> Result<TileSnapshot, StoreError> {
        Self::read_row(&self.pool, key).await
    }

    async fn write(&self, key: &TileKey, tile: &Tile) -> Result<(), StoreError> {
        let strokes = codec::encode_strokes(&tile.strokes)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO tiles (key, strokes, updated_at) VALUES ($1, $2, $3)
             ON CONFLICT (key) DO UPDATE SET strokes = EXCLUDED.strokes, updated_at = EXCLUDED.updated_at",
        )
        .bind(key.as_str())
        .bind(&strokes)
        .bind(tile.updated_at)
        .execute(tx.as_mut())
        .await?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(TILE_CHANNEL)
            .bind(key.as_str())
            .execute(tx.as_mut())
            .await?;
        tx.commit().await?;

        debug!(tile = %key, strokes = tile.strokes.len(), "tile written");
        Ok(())
    }

    async fn create_if_absent(&self, key: &TileKey, tile: &Tile) -> Result<bool, StoreError> {
        let strokes = codec::encode_strokes(&tile.strokes)?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO tiles (key, strokes, updated_at) VALUES ($1, $2, $3)
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(key.as_str())
        .bind(&strokes)
        .bind(tile.updated_at)
        .execute(tx.as_mut())
        .await?;
        let created = result.rows_affected() > 0;
        if created {
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(TILE_CHANNEL)
                .bind(key.as_str())
                .execute(tx.as_mut())
                .await?;
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn subscribe(&self, key: &TileKey) -> Result<Subscription, StoreError> {
        // Listen before the initial read so no version committed in between is missed.
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(TILE_CHANNEL).await?;
        let initial = Self::read_row(&self.pool, key).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        if tx.send(initial).await.is_err() {
            return Err(StoreError::Unavailable("subscription dropped before initial state".into()));
        }

        let pool = self.pool.clone();
        let key = key.clone();
        tokio::spawn(async move {
            loop {
                let notification = match listener.try_recv().await {
                    Ok(Some(notification)) => notification,
                    Ok(None) => {
                        warn!(tile = %key, "tile listener connection lost; closing subscription");
                        break;
                    }
                    Err(e) => {
                        warn!(tile = %key, error = %e, "tile listener failed; closing subscription");
                        break;
                    }
                };
                if notification.payload() != key.as_str() {
                    continue;
                }
                let snapshot = match Self::read_row(&pool, &key).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        warn!(tile = %key, error = %e, "tile read after notify failed; closing subscription");
                        break;
                    }
                };
                if tx.send(snapshot).await.is_err() {
                    debug!(tile = %key, "subscriber gone; stopping tile listener");
                    break;
                }
            }
        });

        Ok(Subscription::new(rx))
    }
}
