use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::activity::ActivityTracker;
use crate::db::models::{CharacterRecord, PlayerId};
use crate::error::StoreError;
use crate::notify::{PlayerNotifier, MSG_HEALTH_RESTORED};
use crate::store::{self, CharacterRepository, KvStore, REGENERATION_KEY};

/// Shortest regeneration duration any bonus can produce.
const MIN_DURATION_SECS: f64 = 1.0;

/// In-flight regeneration state for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenerationRecord {
    pub current_value: f64,
    pub max_value: f64,
    pub rate_per_second: f64,
    /// One-shot bonus consumed by the next tick.
    #[serde(default)]
    pub pending_bonus: Option<f64>,
    pub on_complete_message_key: String,
    /// Registration order; ticks visit players in ascending `seq`.
    #[serde(default)]
    pub seq: u64,
}

/// Seconds needed to regenerate from zero to full.
///
/// `light_bonus` and `effect_bonus` are additive percentages that shorten the
/// base duration. The combined bonus is clamped to 0..=100.
pub fn regen_duration_secs(base_secs: f64, light_bonus: f64, effect_bonus: f64) -> f64 {
    let bonus = (light_bonus + effect_bonus).clamp(0.0, 100.0);
    (base_secs * (100.0 - bonus) / 100.0).max(MIN_DURATION_SECS)
}

pub struct RegenerationScheduler {
    /// player_id -> in-flight record
    records: DashMap<PlayerId, RegenerationRecord>,
    next_seq: AtomicU64,
    base_duration_secs: f64,
    activity: Arc<ActivityTracker>,
    repo: Arc<dyn CharacterRepository>,
    store: Arc<dyn KvStore>,
    notifier: Arc<dyn PlayerNotifier>,
}

impl RegenerationScheduler {
    pub fn new(
        base_duration_secs: f64,
        activity: Arc<ActivityTracker>,
        repo: Arc<dyn CharacterRepository>,
        store: Arc<dyn KvStore>,
        notifier: Arc<dyn PlayerNotifier>,
    ) -> Self {
        Self {
            records: DashMap::new(),
            next_seq: AtomicU64::new(0),
            base_duration_secs,
            activity,
            repo,
            store,
            notifier,
        }
    }

    pub fn is_tracked(&self, player_id: PlayerId) -> bool {
        self.records.contains_key(&player_id)
    }

    pub fn record(&self, player_id: PlayerId) -> Option<RegenerationRecord> {
        self.records.get(&player_id).map(|r| r.value().clone())
    }

    pub fn tracked_count(&self) -> usize {
        self.records.len()
    }

    /// Health rounded for display. Stored values are never rounded.
    pub fn display_value(&self, player_id: PlayerId) -> Option<i64> {
        self.records
            .get(&player_id)
            .map(|r| r.current_value.round() as i64)
    }

    /// Start or refresh tracking from a character snapshot, then persist.
    pub async fn sync(&self, character: &CharacterRecord) {
        self.track(character);
        self.persist().await;
    }

    /// Merge a snapshot into the map. A higher stored value wins over the
    /// snapshot's health; every other field is replaced.
    fn track(&self, character: &CharacterRecord) {
        let duration =
            regen_duration_secs(self.base_duration_secs, character.light_bonus, character.effect_bonus);
        let rate_per_second = character.max_health / duration;

        match self.records.entry(character.id) {
            Entry::Occupied(mut entry) => {
                let previous = entry.get();
                let record = RegenerationRecord {
                    current_value: previous.current_value.max(character.health),
                    max_value: character.max_health,
                    rate_per_second,
                    pending_bonus: None,
                    on_complete_message_key: MSG_HEALTH_RESTORED.to_string(),
                    seq: previous.seq,
                };
                entry.insert(record);
            }
            Entry::Vacant(entry) => {
                entry.insert(RegenerationRecord {
                    current_value: character.health,
                    max_value: character.max_health,
                    rate_per_second,
                    pending_bonus: None,
                    on_complete_message_key: MSG_HEALTH_RESTORED.to_string(),
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                });
            }
        }

        tracing::debug!(
            player_id = character.id,
            rate_per_second,
            "Regeneration synced"
        );
    }

    /// Queue a one-shot bonus for the next tick.
    ///
    /// Returns the amount actually granted, capped so the queued total never
    /// lifts the player above max. Untracked players get nothing.
    pub fn regenerate(&self, player_id: PlayerId, amount: f64) -> f64 {
        let Some(mut record) = self.records.get_mut(&player_id) else {
            return 0.0;
        };
        let pending = record.pending_bonus.unwrap_or(0.0);
        let headroom = (record.max_value - record.current_value - pending).max(0.0);
        let granted = amount.max(0.0).min(headroom);
        if granted > 0.0 {
            record.pending_bonus = Some(pending + granted);
        }
        granted
    }

    /// Drop a player's in-flight record without writing it back.
    pub fn cancel(&self, player_id: PlayerId) -> Option<RegenerationRecord> {
        let removed = self.records.remove(&player_id).map(|(_, record)| record);
        if removed.is_some() {
            tracing::debug!(player_id, "Regeneration cancelled");
        }
        removed
    }

    /// Advance every tracked player by one interval.
    ///
    /// The visiting order is fixed from a snapshot taken at the start, so a
    /// player synced mid-tick is first advanced on the next tick.
    pub async fn tick(&self) {
        let mut order: Vec<(u64, PlayerId)> = self
            .records
            .iter()
            .map(|entry| (entry.value().seq, *entry.key()))
            .collect();
        if order.is_empty() {
            return;
        }
        order.sort_unstable();

        for (_, player_id) in order {
            let (full, message_key) = {
                let Some(mut record) = self.records.get_mut(&player_id) else {
                    continue;
                };
                let bonus = record.pending_bonus.take().unwrap_or(0.0);
                record.current_value += record.rate_per_second + bonus;
                (
                    record.current_value >= record.max_value,
                    record.on_complete_message_key.clone(),
                )
            };

            let playing = self.activity.is_playing(player_id);
            if !playing && !full {
                continue;
            }

            if !playing {
                if let Err(e) = self.notifier.send(player_id, &message_key) {
                    tracing::warn!(player_id, "Failed to send regeneration notice: {}", e);
                }
            }
            self.write_back(player_id).await;
        }

        self.persist().await;
    }

    /// Hand a player's value back to the character repository.
    ///
    /// Clamps to max, removes the in-flight record and writes the health. If
    /// the write fails the record goes back into the map (unless a newer sync
    /// already replaced it) so the next tick retries.
    pub async fn complete(&self, player_id: PlayerId) {
        if self.write_back(player_id).await {
            self.persist().await;
        }
    }

    /// Completion without persisting the map; `tick` persists once at the end.
    /// Returns false when the player was not tracked.
    async fn write_back(&self, player_id: PlayerId) -> bool {
        let Some((_, mut record)) = self.records.remove(&player_id) else {
            return false;
        };
        if record.current_value > record.max_value {
            record.current_value = record.max_value;
        }

        let repo = self.repo.clone();
        let health = record.current_value;
        let result = tokio::task::spawn_blocking(move || repo.update_health(player_id, health))
            .await
            .map_err(StoreError::from)
            .and_then(|r| r);

        match result {
            Ok(()) => {
                tracing::info!(player_id, health, "Regeneration completed");
            }
            Err(e) => {
                tracing::error!(player_id, "Failed to write regenerated health: {}", e);
                self.records.entry(player_id).or_insert(record);
            }
        }
        true
    }

    /// Re-track every wounded character not already in the map.
    /// Recovers regeneration lost across a cold restart without double-crediting
    /// players restored from the snapshot.
    pub async fn restart(&self) {
        let repo = self.repo.clone();
        let wounded = match tokio::task::spawn_blocking(move || repo.find_regenerating())
            .await
            .map_err(StoreError::from)
            .and_then(|r| r)
        {
            Ok(characters) => characters,
            Err(e) => {
                tracing::error!("Failed to load wounded characters: {}", e);
                return;
            }
        };

        let mut added = 0usize;
        for character in &wounded {
            if !self.records.contains_key(&character.id) {
                self.track(character);
                added += 1;
            }
        }

        tracing::info!(
            added,
            already_tracked = wounded.len() - added,
            "Regeneration restart complete"
        );

        if added > 0 {
            self.persist().await;
        }
    }

    /// Serialized form of the whole map, keys in ascending order.
    pub fn snapshot(&self) -> Result<String, StoreError> {
        let ordered: BTreeMap<PlayerId, RegenerationRecord> = self
            .records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        Ok(serde_json::to_string(&ordered)?)
    }

    /// Write the map to durable storage. Failures are logged, never returned.
    pub async fn persist(&self) {
        let result = match self.snapshot() {
            Ok(blob) => store::set_blob(&self.store, REGENERATION_KEY, blob).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!("Failed to persist regeneration map: {}", e);
        }
    }

    /// Load the map from durable storage. Values resume as-is.
    pub async fn restore(&self) {
        let blob = match store::get_blob(&self.store, REGENERATION_KEY).await {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                tracing::info!("No regeneration snapshot to restore");
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to read regeneration snapshot: {}", e);
                return;
            }
        };

        let parsed: BTreeMap<PlayerId, RegenerationRecord> = match serde_json::from_str(&blob) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("Discarding unreadable regeneration snapshot: {}", e);
                return;
            }
        };

        self.records.clear();
        let next_seq = parsed.values().map(|r| r.seq + 1).max().unwrap_or(0);
        for (player_id, record) in parsed {
            self.records.insert(player_id, record);
        }
        self.next_seq.store(next_seq, Ordering::Relaxed);

        tracing::info!(players = self.records.len(), "Regeneration map restored");
    }
}
