use crate::db::DbPool;
use crate::error::StoreError;

/// Key/value blob storage.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn del(&self, key: &str) -> Result<(), StoreError>;
}

/// `KvStore` backed by the kv_store table.
#[derive(Clone)]
pub struct SqliteKvStore {
    db: DbPool,
}

impl SqliteKvStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl KvStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        match conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            [key],
            |row| row.get::<_, String>(0),
        ) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn del(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;

    #[test]
    fn test_get_missing_key_is_none() {
        let store = SqliteKvStore::new(init_memory_db().unwrap());
        assert!(store.get("nothing").unwrap().is_none());
    }

    #[test]
    fn test_set_overwrites_and_del_removes() {
        let store = SqliteKvStore::new(init_memory_db().unwrap());
        store.set("activity", "{}").unwrap();
        store.set("activity", r#"{"1":{"playing":false}}"#).unwrap();
        assert_eq!(
            store.get("activity").unwrap().as_deref(),
            Some(r#"{"1":{"playing":false}}"#)
        );

        store.del("activity").unwrap();
        assert!(store.get("activity").unwrap().is_none());
        // Deleting twice is fine
        store.del("activity").unwrap();
    }
}
