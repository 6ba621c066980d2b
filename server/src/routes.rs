use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::db::models::PlayerId;
use crate::game::GameSnapshot;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Presentation view of a player's activity and regeneration.
#[derive(Debug, Serialize)]
pub struct PlayerStatus {
    pub player_id: PlayerId,
    pub icon: &'static str,
    pub playing: bool,
    pub working: bool,
    pub regenerating: bool,
    /// Rounded in-flight health, present only while regenerating.
    pub health: Option<i64>,
}

/// GET /api/games: snapshot of every live game, in creation order.
async fn list_games(State(state): State<AppState>) -> Json<Vec<GameSnapshot>> {
    Json(state.registry.games_log())
}

/// GET /api/players/{id}/status
async fn player_status(
    State(state): State<AppState>,
    Path(player_id): Path<PlayerId>,
) -> Json<PlayerStatus> {
    Json(PlayerStatus {
        player_id,
        icon: state.activity.activity_icon(player_id),
        playing: state.activity.is_playing(player_id),
        working: state.activity.is_working(player_id),
        regenerating: state.regen.is_tracked(player_id),
        health: state.regen.display_value(player_id),
    })
}

/// Build the axum Router with the spectator feed and read-only API.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/games", get(ws_handler::ws_upgrade))
        .route("/api/games", get(list_games))
        .route("/api/players/{id}/status", get(player_status))
        .with_state(state)
}
