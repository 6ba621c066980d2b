pub mod actor;
pub mod broadcast;
pub mod handler;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use broadcast::{Broadcaster, WsBroadcaster};

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific spectator.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Connection registry: tracks all active spectator connections.
/// Each connection gets its own id, so every entry normally holds one sender.
/// Arc<DashMap<ConnectionId, Vec<ConnectionSender>>>
pub type ConnectionRegistry = Arc<DashMap<String, Vec<ConnectionSender>>>;

/// Create a new empty connection registry.
pub fn new_connection_registry() -> ConnectionRegistry {
    Arc::new(DashMap::new())
}
