//! Hooks run when a game ends.

use std::sync::Arc;

use super::GameSnapshot;
use crate::db::models::PlayerId;
use crate::error::StoreError;
use crate::regen::RegenerationScheduler;
use crate::store::CharacterRepository;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Called once with the final snapshot of a finished game.
/// Errors are logged by the caller and never abort the session teardown.
pub trait GameResultHandler: Send + Sync {
    fn on_game_finished(&self, state: &GameSnapshot) -> Result<(), HandlerError>;
}

/// Puts every wounded participant back into the regeneration scheduler.
pub struct ResumeRegeneration {
    regen: Arc<RegenerationScheduler>,
    repo: Arc<dyn CharacterRepository>,
}

impl ResumeRegeneration {
    pub fn new(regen: Arc<RegenerationScheduler>, repo: Arc<dyn CharacterRepository>) -> Self {
        Self { regen, repo }
    }
}

impl GameResultHandler for ResumeRegeneration {
    fn on_game_finished(&self, state: &GameSnapshot) -> Result<(), HandlerError> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let ids: Vec<PlayerId> = state.players.iter().map(|p| p.player_id).collect();
        let regen = self.regen.clone();
        let repo = self.repo.clone();
        let game_id = state.id;

        runtime.spawn(async move {
            let characters = match tokio::task::spawn_blocking(move || repo.find_by_ids(&ids))
                .await
                .map_err(StoreError::from)
                .and_then(|r| r)
            {
                Ok(characters) => characters,
                Err(e) => {
                    tracing::error!(game_id = %game_id, "Failed to load participants: {}", e);
                    return;
                }
            };

            for character in characters.iter().filter(|c| c.needs_regeneration()) {
                regen.sync(character).await;
            }
        });

        Ok(())
    }
}
