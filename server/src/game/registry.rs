//! Live games, waiting subscribers and matchmaking.
//!
//! The registry is the only writer of the game and subscriber collections.
//! Its lock guards plain collection reads and writes and is always released
//! before a session or client is called, so sessions may call back into the
//! registry through [`LifecycleSink`] at any time.

use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::predicates::{
    is_pending_game, is_range_level, is_same_clan, is_same_format, is_same_level,
    is_same_prev_opponent,
};
use super::{
    GameId, GameSnapshot, LifecycleSink, MatchClient, Session, SessionFactory, TeamId,
    TurnResults,
};
use crate::activity::ActivityTracker;
use crate::config::MatchmakingConfig;
use crate::db::models::PlayerId;
use crate::error::StoreError;
use crate::notify::{PlayerNotifier, MSG_GAME_LOST};
use crate::store::{self, CharacterRepository, KvStore, GAMES_KEY};
use crate::ws::Broadcaster;

/// Spectator event carrying the ordered list of game snapshots.
pub const GAMES_LOG_EVENT: &str = "games:log";

/// A player waiting for a compatible group game.
#[derive(Clone)]
pub struct SubscriberEntry {
    pub client: Arc<dyn MatchClient>,
    /// Game currently offered to the subscriber, if any.
    pub game_id: Option<GameId>,
}

#[derive(Default)]
struct RegistryInner {
    /// Creation order; group search relies on it.
    games: Vec<Arc<dyn Session>>,
    subscribers: HashMap<PlayerId, SubscriberEntry>,
}

pub struct GameRegistry {
    this: Weak<GameRegistry>,
    factory: Arc<dyn SessionFactory>,
    activity: Arc<ActivityTracker>,
    repo: Arc<dyn CharacterRepository>,
    store: Arc<dyn KvStore>,
    notifier: Arc<dyn PlayerNotifier>,
    broadcaster: Arc<dyn Broadcaster>,
    matchmaking: MatchmakingConfig,
    inner: Mutex<RegistryInner>,
}

impl GameRegistry {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        activity: Arc<ActivityTracker>,
        repo: Arc<dyn CharacterRepository>,
        store: Arc<dyn KvStore>,
        notifier: Arc<dyn PlayerNotifier>,
        broadcaster: Arc<dyn Broadcaster>,
        matchmaking: MatchmakingConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            factory,
            activity,
            repo,
            store,
            notifier,
            broadcaster,
            matchmaking,
            inner: Mutex::new(RegistryInner::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- Queries ----

    pub fn game(&self, game_id: GameId) -> Option<Arc<dyn Session>> {
        self.lock()
            .games
            .iter()
            .find(|g| g.id() == game_id)
            .cloned()
    }

    /// Every live game in creation order.
    pub fn games(&self) -> Vec<Arc<dyn Session>> {
        self.lock().games.clone()
    }

    pub fn pending_games(&self) -> Vec<Arc<dyn Session>> {
        self.games()
            .into_iter()
            .filter(|g| is_pending_game(g.as_ref()))
            .collect()
    }

    /// Snapshot of every live game, in creation order.
    pub fn games_log(&self) -> Vec<GameSnapshot> {
        self.games().iter().map(|g| g.state()).collect()
    }

    pub fn subscriber(&self, player_id: PlayerId) -> Option<SubscriberEntry> {
        self.lock().subscribers.get(&player_id).cloned()
    }

    pub fn is_subscribed(&self, player_id: PlayerId) -> bool {
        self.lock().subscribers.contains_key(&player_id)
    }

    /// The game a player currently participates in.
    pub fn find_game(&self, player_id: PlayerId) -> Option<Arc<dyn Session>> {
        self.games().into_iter().find(|g| g.has_player(player_id))
    }

    // ---- Matchmaking ----

    /// Refuse players already in combat and send players with a live game
    /// back into it. Returns true when the search must stop here.
    pub async fn is_game_exists(&self, client: &Arc<dyn MatchClient>) -> bool {
        let player_id = client.player_id();
        if self.activity.is_playing(player_id) {
            tracing::debug!(player_id, "Search refused, player already playing");
            client.on_game_exists();
            return true;
        }
        if self.find_game(player_id).is_some() {
            self.player_rejoin(client.clone()).await;
            return true;
        }
        false
    }

    /// Single combat: join a random compatible pending game or create one.
    pub async fn find_single_game(&self, client: Arc<dyn MatchClient>) {
        if self.is_game_exists(&client).await {
            return;
        }

        let candidates: Vec<Arc<dyn Session>> = self
            .games()
            .into_iter()
            .filter(|g| self.is_single_candidate(g.as_ref(), client.as_ref()))
            .collect();
        let chosen = candidates.choose(&mut rand::rng()).cloned();

        match chosen {
            Some(game) => {
                tracing::debug!(
                    player_id = client.player_id(),
                    game_id = %game.id(),
                    candidates = candidates.len(),
                    "Single game matched"
                );
                self.join_game(game.id(), client).await;
            }
            None => {
                self.player_create(client).await;
            }
        }
    }

    fn is_single_candidate(&self, game: &dyn Session, client: &dyn MatchClient) -> bool {
        if !is_pending_game(game) || !is_same_format(game, client) {
            return false;
        }
        if is_same_prev_opponent(game, client) {
            return false;
        }
        client.is_proximo() || (is_same_level(game, client) && !is_same_clan(game, client))
    }

    fn find_group_candidate(&self, client: &dyn MatchClient) -> Option<Arc<dyn Session>> {
        let gap = self.matchmaking.level_gap(client.params().format);
        self.games().into_iter().find(|g| {
            is_pending_game(g.as_ref())
                && is_same_format(g.as_ref(), client)
                && is_range_level(g.as_ref(), client, gap)
                && !g.has_player(client.player_id())
        })
    }

    /// Group formats: offer the first compatible pending game without joining.
    /// The client stays subscribed and is told when a game qualifies later.
    pub async fn find_group_game(&self, client: Arc<dyn MatchClient>) {
        if self.is_game_exists(&client).await {
            return;
        }

        let found = self.find_group_candidate(client.as_ref());
        self.subscribe(client.clone(), found.as_ref().map(|g| g.id()));

        match found {
            Some(game) => client.on_game_pending(&game.state()),
            None => client.on_game_empty(),
        }
    }

    // ---- Lifecycle dispatch ----

    /// Replace the client's character with the repository's current record.
    async fn pre_sync(&self, client: &Arc<dyn MatchClient>) {
        let player_id = client.player_id();
        let repo = self.repo.clone();
        let result = tokio::task::spawn_blocking(move || repo.find_one(player_id))
            .await
            .map_err(StoreError::from)
            .and_then(|r| r);

        match result {
            Ok(Some(character)) => client.set_character(character),
            Ok(None) => {
                tracing::warn!(player_id, "No character record, keeping client snapshot");
            }
            Err(e) => {
                tracing::warn!(player_id, "Character pre-sync failed: {}", e);
            }
        }
    }

    /// Create a game anchored by the client. Returns the new game id.
    pub async fn player_create(&self, client: Arc<dyn MatchClient>) -> Option<GameId> {
        self.pre_sync(&client).await;

        let player_id = client.player_id();
        // The player may have started or joined another game while we awaited
        if self.activity.is_playing(player_id) || self.find_game(player_id).is_some() {
            client.on_game_exists();
            return None;
        }

        let id = uuid::Uuid::new_v4();
        let sink: Weak<dyn LifecycleSink> = self.this.clone();
        let game = self.factory.create(id, client.params(), sink);
        {
            let mut inner = self.lock();
            inner.games.push(game.clone());
            inner.subscribers.remove(&player_id);
        }

        tracing::info!(player_id, game_id = %id, format = ?client.params().format, "Game registered");
        game.player_create(client);
        Some(id)
    }

    /// Join the game named by the client's own `game_id`.
    pub async fn player_join(&self, client: Arc<dyn MatchClient>) {
        let Some(game_id) = client.game_id() else {
            return;
        };
        self.join_game(game_id, client).await;
    }

    pub async fn join_game(&self, game_id: GameId, client: Arc<dyn MatchClient>) {
        if self.game(game_id).is_none() {
            return;
        }
        self.pre_sync(&client).await;

        let player_id = client.player_id();
        // A concurrent search may have seated the player elsewhere
        if self.activity.is_playing(player_id) || self.find_game(player_id).is_some() {
            client.on_game_exists();
            return;
        }

        let Some(game) = self.game(game_id) else {
            tracing::debug!(game_id = %game_id, "Game vanished during join");
            client.on_game_refused();
            return;
        };
        if !game.is_pending() {
            client.on_game_refused();
            return;
        }

        self.unsubscribe(player_id);
        game.player_join(client);
    }

    pub async fn player_rejoin(&self, client: Arc<dyn MatchClient>) {
        let player_id = client.player_id();
        let Some(game) = self.find_game(player_id) else {
            return;
        };
        self.pre_sync(&client).await;

        let game_id = game.id();
        match self.game(game_id) {
            Some(game) if game.has_player(player_id) => game.player_rejoin(client),
            _ => tracing::debug!(player_id, game_id = %game_id, "Game vanished during rejoin"),
        }
    }

    pub fn player_cancel(&self, game_id: GameId) {
        if let Some(game) = self.game(game_id) {
            game.player_cancel();
        }
    }

    pub fn player_leave(&self, game_id: GameId, player_id: PlayerId, team_id: Option<TeamId>) {
        if let Some(game) = self.game(game_id) {
            game.player_leave(player_id, team_id);
        }
    }

    pub fn player_surrender(&self, game_id: GameId, player_id: PlayerId) {
        if let Some(game) = self.game(game_id) {
            game.player_surrender(player_id);
        }
    }

    pub fn player_finish_turn(&self, game_id: GameId, results: TurnResults) {
        if let Some(game) = self.game(game_id) {
            game.player_finish_turn(results);
        }
    }

    pub fn player_timeout(&self, game_id: GameId, player_id: PlayerId) {
        if let Some(game) = self.game(game_id) {
            game.player_timeout(player_id);
        }
    }

    // ---- Subscribers ----

    /// Register a waiting player. A newer search replaces the older entry.
    pub fn subscribe(&self, client: Arc<dyn MatchClient>, game_id: Option<GameId>) {
        let player_id = client.player_id();
        self.lock()
            .subscribers
            .insert(player_id, SubscriberEntry { client, game_id });
    }

    pub fn unsubscribe(&self, player_id: PlayerId) -> Option<SubscriberEntry> {
        self.lock().subscribers.remove(&player_id)
    }

    // ---- Notifications ----

    /// Re-evaluate group subscribers and push the games log to spectators.
    pub fn on_game_refresh(&self) {
        let subscribers: Vec<(PlayerId, SubscriberEntry)> = self
            .lock()
            .subscribers
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect();

        for (player_id, entry) in subscribers {
            if !entry.client.params().format.is_group() {
                continue;
            }
            let Some(candidate) = self.find_group_candidate(entry.client.as_ref()) else {
                continue;
            };
            if entry.game_id == Some(candidate.id()) {
                continue;
            }

            let still_waiting = {
                let mut inner = self.lock();
                match inner.subscribers.get_mut(&player_id) {
                    Some(current) if Arc::ptr_eq(&current.client, &entry.client) => {
                        current.game_id = Some(candidate.id());
                        true
                    }
                    _ => false,
                }
            };
            if still_waiting {
                entry.client.on_subscriber_updated(&candidate.state());
            }
        }

        self.broadcast_games_log();
    }

    fn broadcast_games_log(&self) {
        match serde_json::to_value(self.games_log()) {
            Ok(payload) => self.broadcaster.emit(GAMES_LOG_EVENT, payload),
            Err(e) => tracing::error!("Failed to serialize games log: {}", e),
        }
    }

    /// Drop a game and tell the subscribers that were offered it.
    pub fn destroy_game(&self, game_id: GameId) {
        let (removed, refused) = {
            let mut inner = self.lock();
            let before = inner.games.len();
            inner.games.retain(|g| g.id() != game_id);
            let removed = inner.games.len() != before;

            let refused: Vec<Arc<dyn MatchClient>> = inner
                .subscribers
                .values_mut()
                .filter(|entry| entry.game_id == Some(game_id))
                .map(|entry| {
                    entry.game_id = None;
                    entry.client.clone()
                })
                .collect();
            (removed, refused)
        };

        for client in &refused {
            client.on_game_refused();
        }
        if removed {
            tracing::info!(game_id = %game_id, refused = refused.len(), "Game destroyed");
            self.broadcast_games_log();
        }
    }

    // ---- Durability ----

    /// Every participant id across live games, ascending and unique.
    pub fn participant_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self
            .games()
            .iter()
            .flat_map(|g| g.client_ids())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Store the participant ids of every live game. Game state itself is
    /// never persisted.
    pub async fn persist(&self) {
        let ids = self.participant_ids();
        let result = if ids.is_empty() {
            store::del_blob(&self.store, GAMES_KEY).await
        } else {
            match serde_json::to_string(&ids) {
                Ok(blob) => store::set_blob(&self.store, GAMES_KEY, blob).await,
                Err(e) => Err(StoreError::from(e)),
            }
        };

        match result {
            Ok(()) => tracing::info!(players = ids.len(), "Game participants persisted"),
            Err(e) => tracing::error!("Failed to persist game participants: {}", e),
        }
    }

    /// Tell every player whose game was alive at shutdown that it is lost,
    /// then discard the stored list.
    pub async fn restore(&self) {
        let blob = match store::get_blob(&self.store, GAMES_KEY).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Failed to read game participants: {}", e);
                return;
            }
        };

        match serde_json::from_str::<Vec<PlayerId>>(&blob) {
            Ok(ids) => {
                for player_id in &ids {
                    if let Err(e) = self.notifier.send(*player_id, MSG_GAME_LOST) {
                        tracing::warn!(player_id, "Failed to send game lost notice: {}", e);
                    }
                }
                tracing::info!(players = ids.len(), "Lost games reported");
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable game participant list: {}", e);
            }
        }

        if let Err(e) = store::del_blob(&self.store, GAMES_KEY).await {
            tracing::error!("Failed to clear game participants: {}", e);
        }
    }
}

impl LifecycleSink for GameRegistry {
    fn notify_destroyed(&self, game_id: GameId) {
        self.destroy_game(game_id);
    }

    fn notify_refreshed(&self, _game_id: GameId) {
        self.on_game_refresh();
    }
}
