use std::sync::Mutex;
use tokio::sync::mpsc;

use super::{GameId, GameParams, GameSnapshot};
use crate::db::models::{CharacterRecord, PlayerId};

/// A player's handle as seen by matchmaking and sessions.
pub trait MatchClient: Send + Sync {
    fn player_id(&self) -> PlayerId;
    fn player_level(&self) -> u32;
    fn clan(&self) -> Option<String>;
    fn last_opponent_id(&self) -> Option<PlayerId>;
    fn set_last_opponent(&self, player_id: PlayerId);
    fn params(&self) -> GameParams;
    /// Game the player explicitly asked to join, if any.
    fn game_id(&self) -> Option<GameId>;
    /// Privileged mode: single search ignores level and clan.
    fn is_proximo(&self) -> bool;
    fn character(&self) -> Option<CharacterRecord>;
    fn set_character(&self, snapshot: CharacterRecord);

    fn on_game_exists(&self);
    fn on_game_pending(&self, state: &GameSnapshot);
    fn on_game_empty(&self);
    fn on_subscriber_updated(&self, state: &GameSnapshot);
    fn on_game_refused(&self);
    fn on_game_update(&self, state: &GameSnapshot);
}

/// Events delivered to the chat front-end for one player.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    GameExists,
    GamePending(GameSnapshot),
    GameEmpty,
    SubscriberUpdated(GameSnapshot),
    GameRefused,
    GameUpdate(GameSnapshot),
}

pub type ClientEventSender = mpsc::UnboundedSender<ClientEvent>;

/// `MatchClient` backed by the chat bot: callbacks become queued events.
pub struct ChatClient {
    player_id: PlayerId,
    params: GameParams,
    game_id: Option<GameId>,
    proximo: bool,
    last_opponent: Mutex<Option<PlayerId>>,
    character: Mutex<CharacterRecord>,
    tx: ClientEventSender,
}

impl ChatClient {
    pub fn new(character: CharacterRecord, params: GameParams, tx: ClientEventSender) -> Self {
        Self {
            player_id: character.id,
            params,
            game_id: None,
            proximo: false,
            last_opponent: Mutex::new(None),
            character: Mutex::new(character),
            tx,
        }
    }

    pub fn with_game_id(mut self, game_id: GameId) -> Self {
        self.game_id = Some(game_id);
        self
    }

    pub fn with_last_opponent(self, player_id: PlayerId) -> Self {
        self.set_last_opponent(player_id);
        self
    }

    pub fn proximo(mut self) -> Self {
        self.proximo = true;
        self
    }

    fn emit(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!(player_id = self.player_id, "Client event dropped, receiver gone");
        }
    }

    fn with_character<T>(&self, f: impl FnOnce(&CharacterRecord) -> T) -> T {
        let guard = self.character.lock().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }
}

impl MatchClient for ChatClient {
    fn player_id(&self) -> PlayerId {
        self.player_id
    }

    fn player_level(&self) -> u32 {
        self.with_character(|c| c.level)
    }

    fn clan(&self) -> Option<String> {
        self.with_character(|c| c.clan.clone())
    }

    fn last_opponent_id(&self) -> Option<PlayerId> {
        *self.last_opponent.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_last_opponent(&self, player_id: PlayerId) {
        *self.last_opponent.lock().unwrap_or_else(|e| e.into_inner()) = Some(player_id);
    }

    fn params(&self) -> GameParams {
        self.params
    }

    fn game_id(&self) -> Option<GameId> {
        self.game_id
    }

    fn is_proximo(&self) -> bool {
        self.proximo
    }

    fn character(&self) -> Option<CharacterRecord> {
        Some(self.with_character(|c| c.clone()))
    }

    fn set_character(&self, snapshot: CharacterRecord) {
        *self.character.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    fn on_game_exists(&self) {
        self.emit(ClientEvent::GameExists);
    }

    fn on_game_pending(&self, state: &GameSnapshot) {
        self.emit(ClientEvent::GamePending(state.clone()));
    }

    fn on_game_empty(&self) {
        self.emit(ClientEvent::GameEmpty);
    }

    fn on_subscriber_updated(&self, state: &GameSnapshot) {
        self.emit(ClientEvent::SubscriberUpdated(state.clone()));
    }

    fn on_game_refused(&self) {
        self.emit(ClientEvent::GameRefused);
    }

    fn on_game_update(&self, state: &GameSnapshot) {
        self.emit(ClientEvent::GameUpdate(state.clone()));
    }
}
