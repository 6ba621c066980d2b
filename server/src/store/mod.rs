//! Durable storage seams.
//!
//! `KvStore` holds the three snapshot blobs (activity, regeneration, games);
//! `CharacterRepository` is the source of truth for character stats and
//! health. Both are synchronous (rusqlite) and are driven from async code
//! through `spawn_blocking`.

pub mod characters;
pub mod kv;

use std::sync::Arc;

use crate::error::StoreError;

pub use characters::{CharacterRepository, SqliteCharacterRepository};
pub use kv::{KvStore, SqliteKvStore};

/// Blob key for the activity tracker snapshot.
pub const ACTIVITY_KEY: &str = "activity";
/// Blob key for the regeneration scheduler snapshot.
pub const REGENERATION_KEY: &str = "regeneration";
/// Blob key for the live-game participant list.
pub const GAMES_KEY: &str = "games";

/// Read a blob without blocking the runtime.
pub async fn get_blob(store: &Arc<dyn KvStore>, key: &'static str) -> Result<Option<String>, StoreError> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.get(key)).await?
}

/// Write a blob without blocking the runtime.
pub async fn set_blob(
    store: &Arc<dyn KvStore>,
    key: &'static str,
    value: String,
) -> Result<(), StoreError> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.set(key, &value)).await?
}

/// Delete a blob without blocking the runtime.
pub async fn del_blob(store: &Arc<dyn KvStore>, key: &'static str) -> Result<(), StoreError> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.del(key)).await?
}
