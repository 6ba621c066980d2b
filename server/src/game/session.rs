//! Lifecycle interface of a single game.
//!
//! The registry never looks at combat mechanics. It only reads the fields it
//! needs for matchmaking and forwards player actions.

use std::sync::{Arc, Weak};

use super::{GameId, GameParams, GamePhase, GameSnapshot, MatchClient, TeamId, TurnResults};
use crate::db::models::PlayerId;

pub trait Session: Send + Sync {
    fn id(&self) -> GameId;
    fn params(&self) -> GameParams;
    fn phase(&self) -> GamePhase;

    fn is_pending(&self) -> bool {
        self.phase() == GamePhase::Pending
    }

    /// Level of the anchor participant.
    fn level(&self) -> u32;
    fn average_level(&self) -> u32;
    /// The first participant, used for every compatibility check.
    fn anchor(&self) -> Option<PlayerId>;
    fn anchor_clan(&self) -> Option<String>;
    fn has_player(&self, player_id: PlayerId) -> bool;
    fn client_ids(&self) -> Vec<PlayerId>;
    fn state(&self) -> GameSnapshot;

    fn player_create(&self, client: Arc<dyn MatchClient>);
    fn player_join(&self, client: Arc<dyn MatchClient>);
    fn player_rejoin(&self, client: Arc<dyn MatchClient>);
    fn player_cancel(&self);
    fn player_leave(&self, player_id: PlayerId, team_id: Option<TeamId>);
    fn player_surrender(&self, player_id: PlayerId);
    fn player_finish_turn(&self, results: TurnResults);
    fn player_timeout(&self, player_id: PlayerId);
    fn refresh(&self);
}

/// Receives lifecycle events from sessions.
///
/// Sessions hold a `Weak` handle so they never keep the registry alive.
pub trait LifecycleSink: Send + Sync {
    fn notify_destroyed(&self, game_id: GameId);
    fn notify_refreshed(&self, game_id: GameId);
}

pub trait SessionFactory: Send + Sync {
    fn create(
        &self,
        id: GameId,
        params: GameParams,
        sink: Weak<dyn LifecycleSink>,
    ) -> Arc<dyn Session>;
}
