//! Matchmaking and the live-game registry.
//!
//! Games are opaque [`Session`] collaborators driven through a fixed lifecycle
//! interface. [`GameRegistry`] owns every live game and every waiting
//! subscriber, decides who may play together, and fans state changes out to
//! subscribers and spectators.

pub mod client;
pub mod lobby;
pub mod predicates;
pub mod registry;
pub mod results;
pub mod session;

use serde::{Deserialize, Serialize};

use crate::db::models::PlayerId;

pub use client::{ChatClient, ClientEvent, MatchClient};
pub use lobby::{LobbySession, LobbySessionFactory};
pub use registry::{GameRegistry, SubscriberEntry, GAMES_LOG_EVENT};
pub use results::{GameResultHandler, ResumeRegeneration};
pub use session::{LifecycleSink, Session, SessionFactory};

pub type GameId = uuid::Uuid;
pub type TeamId = u8;
/// Opaque per-turn payload produced by the combat rules.
pub type TurnResults = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameFormat {
    Single,
    Teams,
    Royal,
}

impl GameFormat {
    pub fn is_group(&self) -> bool {
        !matches!(self, GameFormat::Single)
    }
}

/// Requested game parameters. Two requests are compatible only when equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameParams {
    pub format: GameFormat,
    /// Participants needed before the game starts.
    pub players: usize,
}

impl GameParams {
    pub fn single() -> Self {
        Self {
            format: GameFormat::Single,
            players: 2,
        }
    }

    pub fn teams() -> Self {
        Self {
            format: GameFormat::Teams,
            players: 4,
        }
    }

    pub fn royal() -> Self {
        Self {
            format: GameFormat::Royal,
            players: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Pending,
    Active,
    Finished,
    Cancelled,
}

/// Participant entry in a game snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantSummary {
    pub player_id: PlayerId,
    pub name: Option<String>,
    pub level: u32,
    pub team: TeamId,
}

/// Compact game state pushed to clients and spectators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameSnapshot {
    pub id: GameId,
    pub params: GameParams,
    pub phase: GamePhase,
    pub level: u32,
    pub average_level: u32,
    pub turn: u32,
    pub players: Vec<ParticipantSummary>,
}
