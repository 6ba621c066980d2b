use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::activity::ActivityTracker;
use crate::config::Config;
use crate::db::DbPool;
use crate::game::{GameRegistry, GameResultHandler, LobbySessionFactory, ResumeRegeneration};
use crate::notify::PlayerNotifier;
use crate::regen::{spawn_regeneration_ticker, RegenerationScheduler};
use crate::store::{CharacterRepository, KvStore, SqliteCharacterRepository, SqliteKvStore};
use crate::ws::{self, ConnectionRegistry, WsBroadcaster};

/// Shared application state passed to all handlers via axum State extractor.
/// Every service is built once in `initialize` and handed out by reference.
#[derive(Clone)]
pub struct AppState {
    /// Character records (health, level, clan)
    pub characters: Arc<dyn CharacterRepository>,
    /// Per-player playing / busy-job flags
    pub activity: Arc<ActivityTracker>,
    /// In-flight health regeneration
    pub regen: Arc<RegenerationScheduler>,
    /// Live games and matchmaking
    pub registry: Arc<GameRegistry>,
    /// Active spectator WebSocket connections
    pub connections: ConnectionRegistry,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AppState {
    /// Build every service, restore persisted state and start the tick loop.
    pub async fn initialize(config: &Config, db: DbPool, notifier: Arc<dyn PlayerNotifier>) -> Self {
        let store: Arc<dyn KvStore> = Arc::new(SqliteKvStore::new(db.clone()));
        let characters: Arc<dyn CharacterRepository> =
            Arc::new(SqliteCharacterRepository::new(db));

        let activity = Arc::new(ActivityTracker::new(store.clone()));
        let regen = Arc::new(RegenerationScheduler::new(
            config.regeneration.base_duration_secs,
            activity.clone(),
            characters.clone(),
            store.clone(),
            notifier.clone(),
        ));

        let connections = ws::new_connection_registry();
        let results: Arc<dyn GameResultHandler> =
            Arc::new(ResumeRegeneration::new(regen.clone(), characters.clone()));
        let registry = GameRegistry::new(
            Arc::new(LobbySessionFactory::new(activity.clone(), Some(results))),
            activity.clone(),
            characters.clone(),
            store,
            notifier,
            Arc::new(WsBroadcaster::new(connections.clone())),
            config.matchmaking.clone(),
        );

        activity.restore().await;
        regen.restore().await;
        registry.restore().await;
        regen.restart().await;

        let period = Duration::from_millis(config.regeneration.tick_interval_ms.max(1));
        let ticker = spawn_regeneration_ticker(regen.clone(), period);

        tracing::info!(
            tracked = regen.tracked_count(),
            "Services initialized"
        );

        Self {
            characters,
            activity,
            regen,
            registry,
            connections,
            ticker: Arc::new(Mutex::new(Some(ticker))),
        }
    }

    /// Stop the tick loop and persist every snapshot.
    pub async fn shutdown(&self) {
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = ticker {
            handle.abort();
        }

        self.activity.persist().await;
        self.regen.persist().await;
        self.registry.persist().await;

        tracing::info!("Services shut down");
    }
}
