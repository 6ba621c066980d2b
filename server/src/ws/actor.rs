use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::game::GAMES_LOG_EVENT;
use crate::state::AppState;
use crate::ws::broadcast::encode_event;
use crate::ws::ConnectionSender;

/// Ping interval: server sends WebSocket ping every 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run one spectator connection.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: answers pings and watches for close
///
/// Broadcasts reach the spectator through the channel registered in
/// `state.connections`.
pub async fn run_connection(socket: WebSocket, state: AppState, connection_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    register_connection(&state, &connection_id, tx.clone());

    // Send the current games log to the newly connected spectator
    match serde_json::to_value(state.registry.games_log()) {
        Ok(payload) => {
            if let Some(msg) = encode_event(GAMES_LOG_EVENT, &payload) {
                let _ = tx.send(msg);
            }
        }
        Err(e) => tracing::error!("Failed to serialize games log: {}", e),
    }

    tracing::info!(connection_id = %connection_id, "Spectator actor started");

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing spectator connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: spectators only listen, so inbound data is ignored
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        "Ignoring spectator text message: {}",
                        text.chars().take(100).collect::<String>()
                    );
                }
                Message::Binary(_) => {
                    tracing::debug!(connection_id = %connection_id, "Ignoring spectator binary message");
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id = %connection_id,
                        reason = ?frame,
                        "Spectator initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(connection_id = %connection_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    unregister_connection(&state, &connection_id);

    tracing::info!(connection_id = %connection_id, "Spectator actor stopped");
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}

fn register_connection(state: &AppState, connection_id: &str, tx: ConnectionSender) {
    state
        .connections
        .entry(connection_id.to_string())
        .or_default()
        .push(tx);

    tracing::debug!(
        connection_id = %connection_id,
        spectators = state.connections.len(),
        "Connection registered"
    );
}

fn unregister_connection(state: &AppState, connection_id: &str) {
    state.connections.remove(connection_id);
    tracing::debug!(connection_id = %connection_id, "Connection unregistered");
}
