//! Integration tests for the regeneration scheduler, its ticker and the
//! hand-off from finished games back into regeneration.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arena_server::activity::ActivityTracker;
use arena_server::config::MatchmakingConfig;
use arena_server::db::models::{CharacterRecord, PlayerId};
use arena_server::error::NotifyError;
use arena_server::game::{
    ChatClient, GameParams, GameRegistry, GameResultHandler, LobbySessionFactory,
    ResumeRegeneration, Session,
};
use arena_server::notify::{PlayerNotifier, MSG_HEALTH_RESTORED};
use arena_server::regen::{spawn_regeneration_ticker, RegenerationScheduler};
use arena_server::store::{CharacterRepository, KvStore, SqliteCharacterRepository, SqliteKvStore};
use arena_server::ws::Broadcaster;
use tokio::sync::mpsc;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(PlayerId, String)>>,
}

impl PlayerNotifier for RecordingNotifier {
    fn send(&self, player_id: PlayerId, message_key: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((player_id, message_key.to_string()));
        Ok(())
    }
}

struct NullBroadcaster;

impl Broadcaster for NullBroadcaster {
    fn emit(&self, _event: &str, _payload: serde_json::Value) {}
}

struct Harness {
    scheduler: Arc<RegenerationScheduler>,
    activity: Arc<ActivityTracker>,
    repo: Arc<SqliteCharacterRepository>,
    store: Arc<dyn KvStore>,
    notifier: Arc<RecordingNotifier>,
    _tmp: tempfile::TempDir,
}

/// Helper: scheduler over a fresh database. With max health 100 the rate is
/// `100 / base_secs` per tick.
fn harness(base_secs: f64) -> Harness {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let db = arena_server::db::init_db(tmp.path().to_str().unwrap()).expect("Failed to init DB");
    let store: Arc<dyn KvStore> = Arc::new(SqliteKvStore::new(db.clone()));
    let repo = Arc::new(SqliteCharacterRepository::new(db));
    let activity = Arc::new(ActivityTracker::new(store.clone()));
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = Arc::new(RegenerationScheduler::new(
        base_secs,
        activity.clone(),
        repo.clone(),
        store.clone(),
        notifier.clone(),
    ));

    Harness {
        scheduler,
        activity,
        repo,
        store,
        notifier,
        _tmp: tmp,
    }
}

fn character(id: PlayerId, health: f64) -> CharacterRecord {
    CharacterRecord {
        id,
        name: format!("hero-{}", id),
        level: 5,
        clan: None,
        health,
        max_health: 100.0,
        light_bonus: 0.0,
        effect_bonus: 0.0,
    }
}

async fn track(h: &Harness, record: CharacterRecord) {
    h.repo.upsert(&record).unwrap();
    h.scheduler.sync(&record).await;
}

#[tokio::test]
async fn test_idle_player_regenerates_to_full() {
    let h = harness(20.0);
    track(&h, character(1, 50.0)).await;
    assert_eq!(h.scheduler.record(1).unwrap().rate_per_second, 5.0);

    h.scheduler.tick().await;
    assert_eq!(h.scheduler.record(1).unwrap().current_value, 55.0);

    for _ in 0..9 {
        h.scheduler.tick().await;
    }

    assert!(!h.scheduler.is_tracked(1));
    assert_eq!(h.repo.find_one(1).unwrap().unwrap().health, 100.0);
    assert_eq!(
        h.notifier.sent.lock().unwrap().as_slice(),
        &[(1, MSG_HEALTH_RESTORED.to_string())]
    );
}

#[tokio::test]
async fn test_playing_player_completes_silently_at_full() {
    let h = harness(10.0);
    track(&h, character(1, 90.0)).await;
    h.activity.set_playing(1, true);

    h.scheduler.tick().await;

    assert!(!h.scheduler.is_tracked(1));
    assert_eq!(h.repo.find_one(1).unwrap().unwrap().health, 100.0);
    assert!(h.notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_values_never_decrease_or_exceed_max() {
    let h = harness(40.0);
    for id in 1..=3 {
        track(&h, character(id, 10.0 * id as f64)).await;
    }

    let mut last = [0.0f64; 4];
    for round in 0..50 {
        if round % 7 == 0 {
            h.scheduler.regenerate(2, 35.0);
        }
        h.scheduler.tick().await;

        for id in 1..=3usize {
            let value = match h.scheduler.record(id as PlayerId) {
                Some(record) => record.current_value,
                None => h.repo.find_one(id as PlayerId).unwrap().unwrap().health,
            };
            assert!(value >= last[id], "player {} regressed", id);
            assert!(value <= 100.0 || h.scheduler.is_tracked(id as PlayerId));
            last[id] = value;
        }
    }

    assert_eq!(h.scheduler.tracked_count(), 0);
    for id in 1..=3 {
        assert_eq!(h.repo.find_one(id).unwrap().unwrap().health, 100.0);
    }
}

#[tokio::test]
async fn test_persisted_map_is_stable() {
    let h = harness(20.0);
    track(&h, character(2, 40.0)).await;
    track(&h, character(1, 70.0)).await;

    h.scheduler.persist().await;
    let first = h.store.get("regeneration").unwrap().unwrap();
    h.scheduler.persist().await;
    let second = h.store.get("regeneration").unwrap().unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_ticker_drives_completion() {
    let h = harness(0.1);
    track(&h, character(1, 10.0)).await;

    let handle = spawn_regeneration_ticker(h.scheduler.clone(), Duration::from_millis(10));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.scheduler.is_tracked(1) {
        assert!(tokio::time::Instant::now() < deadline, "ticker never completed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.abort();

    assert_eq!(h.repo.find_one(1).unwrap().unwrap().health, 100.0);
}

#[tokio::test]
async fn test_finished_game_resumes_regeneration() {
    let h = harness(1800.0);
    let results: Arc<dyn GameResultHandler> =
        Arc::new(ResumeRegeneration::new(h.scheduler.clone(), h.repo.clone()));
    let registry = GameRegistry::new(
        Arc::new(LobbySessionFactory::new(h.activity.clone(), Some(results))),
        h.activity.clone(),
        h.repo.clone(),
        h.store.clone(),
        h.notifier.clone(),
        Arc::new(NullBroadcaster),
        MatchmakingConfig::default(),
    );

    let mut clients = Vec::new();
    for (id, health) in [(1, 40.0), (2, 100.0)] {
        let record = character(id, health);
        h.repo.upsert(&record).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        clients.push(rx);
        registry
            .find_single_game(Arc::new(ChatClient::new(record, GameParams::single(), tx)))
            .await;
    }
    let game_id = registry.find_game(1).unwrap().id();

    // Combat damage is written by the combat rules; simulate it
    h.repo.update_health(2, 65.0).unwrap();
    registry.player_surrender(game_id, 1);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !(h.scheduler.is_tracked(1) && h.scheduler.is_tracked(2)) {
        assert!(tokio::time::Instant::now() < deadline, "regeneration never resumed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.scheduler.record(2).unwrap().current_value, 65.0);
}
