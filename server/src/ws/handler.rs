use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// GET /ws/games
/// Spectator feed. Read-only, so no authentication: every connection gets the
/// current games log and then each `games:log` broadcast.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let connection_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(connection_id = %connection_id, "Spectator connecting");
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, connection_id))
}
