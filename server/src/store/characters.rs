use crate::db::models::{CharacterRecord, PlayerId};
use crate::db::DbPool;
use crate::error::StoreError;

/// Record repository for character stats and health.
pub trait CharacterRepository: Send + Sync {
    fn find_by_ids(&self, ids: &[PlayerId]) -> Result<Vec<CharacterRecord>, StoreError>;
    fn find_one(&self, id: PlayerId) -> Result<Option<CharacterRecord>, StoreError>;
    /// Characters whose recorded health is below their maximum.
    fn find_regenerating(&self) -> Result<Vec<CharacterRecord>, StoreError>;
    fn update_health(&self, id: PlayerId, health: f64) -> Result<(), StoreError>;
    fn upsert(&self, record: &CharacterRecord) -> Result<(), StoreError>;
}

const SELECT_COLUMNS: &str =
    "SELECT id, name, level, clan, health, max_health, light_bonus, effect_bonus FROM characters";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CharacterRecord> {
    Ok(CharacterRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        level: row.get(2)?,
        clan: row.get(3)?,
        health: row.get(4)?,
        max_health: row.get(5)?,
        light_bonus: row.get(6)?,
        effect_bonus: row.get(7)?,
    })
}

/// `CharacterRepository` backed by the characters table.
#[derive(Clone)]
pub struct SqliteCharacterRepository {
    db: DbPool,
}

impl SqliteCharacterRepository {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl CharacterRepository for SqliteCharacterRepository {
    fn find_by_ids(&self, ids: &[PlayerId]) -> Result<Vec<CharacterRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "{} WHERE id IN ({}) ORDER BY id",
            SELECT_COLUMNS, placeholders
        ))?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn find_one(&self, id: PlayerId) -> Result<Option<CharacterRecord>, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        match conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_COLUMNS),
            [id],
            map_row,
        ) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn find_regenerating(&self) -> Result<Vec<CharacterRecord>, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE health < max_health ORDER BY id",
            SELECT_COLUMNS
        ))?;
        let records = stmt
            .query_map([], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn update_health(&self, id: PlayerId, health: f64) -> Result<(), StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            "UPDATE characters SET health = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![health, chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    fn upsert(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO characters
                (id, name, level, clan, health, max_health, light_bonus, effect_bonus, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                record.id,
                record.name,
                record.level,
                record.clan,
                record.health,
                record.max_health,
                record.light_bonus,
                record.effect_bonus,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
