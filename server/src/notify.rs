//! Outbound chat messages to individual players.
//!
//! The chat platform renders messages from a message key; this crate only
//! decides who gets which key. `OutboxNotifier` queues messages on a channel
//! that the bot front-end drains.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::db::models::PlayerId;
use crate::error::NotifyError;

/// Sent when health regeneration finished while the player was idle.
pub const MSG_HEALTH_RESTORED: &str = "regen.health_restored";
/// Sent on startup to every player whose game was alive at shutdown/crash.
pub const MSG_GAME_LOST: &str = "game.lost";

/// A message queued for delivery to a single player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub player_id: PlayerId,
    pub message_key: String,
    pub sent_at: chrono::DateTime<chrono::Utc>,
}

/// Messaging collaborator used by the scheduler and registry.
pub trait PlayerNotifier: Send + Sync {
    fn send(&self, player_id: PlayerId, message_key: &str) -> Result<(), NotifyError>;
}

pub type OutboxReceiver = mpsc::UnboundedReceiver<OutboundMessage>;

/// Channel-backed notifier.
#[derive(Clone)]
pub struct OutboxNotifier {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl OutboxNotifier {
    pub fn new() -> (Self, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PlayerNotifier for OutboxNotifier {
    fn send(&self, player_id: PlayerId, message_key: &str) -> Result<(), NotifyError> {
        self.tx
            .send(OutboundMessage {
                player_id,
                message_key: message_key.to_string(),
                sent_at: chrono::Utc::now(),
            })
            .map_err(|_| NotifyError::ChannelClosed)
    }
}

/// Drain the outbox, logging each message.
/// Stands in for the chat platform's delivery loop.
pub fn spawn_outbox_logger(mut rx: OutboxReceiver) {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            tracing::info!(
                player_id = msg.player_id,
                message_key = %msg.message_key,
                "Outbound chat message"
            );
        }
    });
}
