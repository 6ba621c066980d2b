//! Integration tests for the spectator WebSocket feed and the read-only API.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use arena_server::config::Config;
use arena_server::db::models::CharacterRecord;
use arena_server::game::{ChatClient, GameParams};
use arena_server::notify::OutboxNotifier;
use arena_server::state::AppState;
use arena_server::store::CharacterRepository;

type WsRead = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Helper: start the server on a random port and return (base_url, state, addr).
async fn start_test_server() -> (String, AppState, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = arena_server::db::init_db(&data_dir).expect("Failed to init DB");
    let config = Config {
        data_dir,
        ..Config::default()
    };
    let (notifier, _outbox) = OutboxNotifier::new();
    let state = AppState::initialize(&config, db, Arc::new(notifier)).await;

    let app = arena_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, state, addr)
}

/// Read the next text frame as JSON, skipping control frames.
async fn next_event(read: &mut WsRead) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), read.next())
            .await
            .expect("Timed out waiting for event")
            .expect("Stream ended")
            .expect("WebSocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("Event is JSON");
        }
    }
}

async fn search(state: &AppState, id: i64, level: u32) {
    let record = CharacterRecord {
        id,
        name: format!("hero-{}", id),
        level,
        clan: None,
        health: 100.0,
        max_health: 100.0,
        light_bonus: 0.0,
        effect_bonus: 0.0,
    };
    state.characters.upsert(&record).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    state
        .registry
        .find_single_game(Arc::new(ChatClient::new(record, GameParams::single(), tx)))
        .await;
}

#[tokio::test]
async fn test_spectator_receives_snapshot_on_connect() {
    let (_base_url, state, addr) = start_test_server().await;
    search(&state, 1, 5).await;

    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/games", addr))
        .await
        .expect("Failed to connect");
    let (_write, mut read) = ws.split();

    let event = next_event(&mut read).await;
    assert_eq!(event["event"], "games:log");
    let games = event["payload"].as_array().unwrap();
    assert_eq!(games.len(), 1);
    assert_eq!(games[0]["players"][0]["player_id"], 1);
}

#[tokio::test]
async fn test_spectator_follows_game_changes() {
    let (_base_url, state, addr) = start_test_server().await;

    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/games", addr))
        .await
        .expect("Failed to connect");
    let (_write, mut read) = ws.split();
    assert_eq!(next_event(&mut read).await["payload"], serde_json::json!([]));

    search(&state, 1, 5).await;
    let created = next_event(&mut read).await;
    assert_eq!(created["payload"][0]["phase"], "pending");

    search(&state, 2, 5).await;
    let started = next_event(&mut read).await;
    assert_eq!(started["payload"][0]["phase"], "active");
    assert_eq!(started["payload"][0]["players"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_ping_pong() {
    let (_base_url, _state, addr) = start_test_server().await;

    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/games", addr))
        .await
        .expect("Failed to connect");
    let (mut write, mut read) = ws.split();
    next_event(&mut read).await;

    write
        .send(Message::Ping(vec![9, 8, 7].into()))
        .await
        .unwrap();

    let pong = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match read.next().await {
                Some(Ok(Message::Pong(data))) => return data,
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame {:?}", other),
            }
        }
    })
    .await
    .expect("Timed out waiting for pong");
    assert_eq!(pong.as_ref(), &[9, 8, 7]);
}

#[tokio::test]
async fn test_games_and_status_endpoints() {
    let (base_url, state, _addr) = start_test_server().await;
    search(&state, 1, 5).await;
    search(&state, 2, 5).await;

    let client = reqwest::Client::new();
    let games: serde_json::Value = client
        .get(format!("{}/api/games", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(games.as_array().unwrap().len(), 1);
    assert_eq!(games[0]["params"]["format"], "single");

    let status: serde_json::Value = client
        .get(format!("{}/api/players/1/status", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["playing"], true);
    assert_eq!(status["icon"], arena_server::activity::ICON_PLAYING);
    assert_eq!(status["health"], serde_json::Value::Null);

    let idle: serde_json::Value = client
        .get(format!("{}/api/players/99/status", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(idle["icon"], arena_server::activity::ICON_IDLE);
    assert_eq!(idle["regenerating"], false);
}
