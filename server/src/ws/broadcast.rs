use axum::extract::ws::Message;
use serde::Serialize;

use super::ConnectionRegistry;

/// Real-time channel for spectators.
pub trait Broadcaster: Send + Sync {
    fn emit(&self, event: &str, payload: serde_json::Value);
}

/// Wire frame sent to spectators as a JSON text message.
#[derive(Debug, Serialize)]
pub struct EventFrame<'a> {
    pub event: &'a str,
    pub payload: &'a serde_json::Value,
}

/// Encode an event as a WebSocket text frame.
pub fn encode_event(event: &str, payload: &serde_json::Value) -> Option<Message> {
    match serde_json::to_string(&EventFrame { event, payload }) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(event, "Failed to encode broadcast frame: {}", e);
            None
        }
    }
}

/// Send a message to every connected spectator.
pub fn broadcast_to_all(registry: &ConnectionRegistry, msg: &Message) {
    for entry in registry.iter() {
        for sender in entry.value().iter() {
            let _ = sender.send(msg.clone());
        }
    }
}

/// `Broadcaster` that fans events out over the spectator WebSockets.
#[derive(Clone)]
pub struct WsBroadcaster {
    connections: ConnectionRegistry,
}

impl WsBroadcaster {
    pub fn new(connections: ConnectionRegistry) -> Self {
        Self { connections }
    }
}

impl Broadcaster for WsBroadcaster {
    fn emit(&self, event: &str, payload: serde_json::Value) {
        if let Some(msg) = encode_event(event, &payload) {
            broadcast_to_all(&self.connections, &msg);
        }
    }
}
