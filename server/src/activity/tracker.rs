use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::models::PlayerId;
use crate::error::StoreError;
use crate::store::{self, KvStore, ACTIVITY_KEY};

pub const ICON_PLAYING: &str = "⚔️";
pub const ICON_WORKING: &str = "⛏";
pub const ICON_IDLE: &str = "🟢";

/// Flags tracked per player. An absent record means all flags are off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(default)]
    pub playing: bool,
    /// Opaque token of the job the player is busy with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_job: Option<String>,
}

/// In-memory activity map with snapshot persistence.
pub struct ActivityTracker {
    /// player_id -> ActivityRecord, created lazily on first write
    records: DashMap<PlayerId, ActivityRecord>,
    store: Arc<dyn KvStore>,
}

impl ActivityTracker {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            records: DashMap::new(),
            store,
        }
    }

    pub fn set_busy_job(&self, player_id: PlayerId, token: impl Into<String>) {
        self.records.entry(player_id).or_default().busy_job = Some(token.into());
    }

    pub fn clear_busy_job(&self, player_id: PlayerId) {
        if let Some(mut record) = self.records.get_mut(&player_id) {
            record.busy_job = None;
        }
    }

    pub fn set_playing(&self, player_id: PlayerId, playing: bool) {
        self.records.entry(player_id).or_default().playing = playing;
    }

    pub fn is_playing(&self, player_id: PlayerId) -> bool {
        self.records
            .get(&player_id)
            .map(|r| r.playing)
            .unwrap_or(false)
    }

    pub fn is_working(&self, player_id: PlayerId) -> bool {
        self.records
            .get(&player_id)
            .map(|r| r.busy_job.is_some())
            .unwrap_or(false)
    }

    /// Status icon for menus: playing wins over working.
    pub fn activity_icon(&self, player_id: PlayerId) -> &'static str {
        if self.is_playing(player_id) {
            ICON_PLAYING
        } else if self.is_working(player_id) {
            ICON_WORKING
        } else {
            ICON_IDLE
        }
    }

    /// Serialized form of the whole map, keys in ascending order.
    pub fn snapshot(&self) -> Result<String, StoreError> {
        let ordered: BTreeMap<PlayerId, ActivityRecord> = self
            .records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        Ok(serde_json::to_string(&ordered)?)
    }

    /// Write the map to durable storage. Failures are logged, never returned.
    pub async fn persist(&self) {
        let result = match self.snapshot() {
            Ok(blob) => store::set_blob(&self.store, ACTIVITY_KEY, blob).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => tracing::debug!(players = self.records.len(), "Activity map persisted"),
            Err(e) => tracing::error!("Failed to persist activity map: {}", e),
        }
    }

    /// Load the map from durable storage.
    ///
    /// Every `playing` flag is forced off: nobody can still be mid-combat after
    /// a restart. Missing or corrupt data leaves the map empty.
    pub async fn restore(&self) {
        let blob = match store::get_blob(&self.store, ACTIVITY_KEY).await {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                tracing::info!("No activity snapshot to restore");
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to read activity snapshot: {}", e);
                return;
            }
        };

        let parsed: BTreeMap<PlayerId, ActivityRecord> = match serde_json::from_str(&blob) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("Discarding unreadable activity snapshot: {}", e);
                return;
            }
        };

        self.records.clear();
        for (player_id, mut record) in parsed {
            record.playing = false;
            self.records.insert(player_id, record);
        }

        tracing::info!(players = self.records.len(), "Activity map restored");
    }
}
