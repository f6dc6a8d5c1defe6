//! Demo: two sessions drawing on one tile.
//!
//! Uses Postgres when `DATABASE_URL` is set, the in-memory store otherwise.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use strokesync::identity::{IdentityProvider, StaticIdentity};
use strokesync::notify::{NotificationSink, TracingSink};
use strokesync::store::{MemoryTileStore, PgTileStore, TileStore};
use strokesync::{DrawSession, Point, SyncConfig};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = dotenvy::dotenv() {
        debug!(error = %e, "no .env loaded");
    }
    tracing_subscriber::fmt::init();

    let config = SyncConfig::from_env();
    let store: Arc<dyn TileStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => Arc::new(PgTileStore::connect(&url).await?),
        Err(_) => {
            info!("DATABASE_URL not set; using in-memory tile store");
            Arc::new(MemoryTileStore::new())
        }
    };

    let alice = session(&store, "alice-wallet", "Alice", &config);
    let bob = session(&store, "bob-wallet", "Bob", &config);
    alice.connect();
    bob.connect();

    let mut rng = rand::rng();
    for round in 0..3 {
        for drawer in [&alice, &bob] {
            let mut at = Point::new(rng.random_range(0.0..800.0), rng.random_range(0.0..600.0));
            drawer.pointer_down(at);
            for _ in 0..rng.random_range(3..12) {
                at = Point::new(at.x + rng.random_range(-20.0..20.0), at.y + rng.random_range(-20.0..20.0));
                drawer.pointer_move(at);
            }
            let outcome = drawer.pointer_up().await??;
            info!(round, session = %drawer.id(), ?outcome, "stroke released");
        }
    }

    tokio::time::sleep(config.echo_grace + Duration::from_millis(200)).await;
    info!(
        alice = alice.strokes().len(),
        bob = bob.strokes().len(),
        tile = %config.tile,
        "demo finished"
    );

    alice.disconnect();
    bob.disconnect();
    Ok(())
}

fn session(store: &Arc<dyn TileStore>, wallet: &str, name: &str, config: &SyncConfig) -> DrawSession {
    let identity: Arc<dyn IdentityProvider> = Arc::new(StaticIdentity::new(wallet, Some(name)));
    let sink: Arc<dyn NotificationSink> = Arc::new(TracingSink);
    DrawSession::new(Arc::clone(store), identity, sink, config.clone())
}
