//! Database row types.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.

use serde::{Deserialize, Serialize};

/// Stable player identifier (the chat platform's user id).
pub type PlayerId = i64;

/// Character record in the characters table.
///
/// This is the authoritative snapshot attached to a match client before it
/// enters a game, and the source of regeneration rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: PlayerId,
    pub name: String,
    pub level: u32,
    pub clan: Option<String>,
    pub health: f64,
    pub max_health: f64,
    /// Percentage bonus to regeneration speed from light affinity.
    pub light_bonus: f64,
    /// Percentage bonus to regeneration speed from active effects.
    pub effect_bonus: f64,
}

impl CharacterRecord {
    pub fn needs_regeneration(&self) -> bool {
        self.health < self.max_health
    }
}

