use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking, no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Snapshot blobs

CREATE TABLE kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
",
        ),
        M::up(
            "-- Migration 2: Character records

CREATE TABLE characters (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    level INTEGER NOT NULL DEFAULT 1,
    clan TEXT,
    health REAL NOT NULL,
    max_health REAL NOT NULL,
    light_bonus REAL NOT NULL DEFAULT 0,
    effect_bonus REAL NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE INDEX idx_characters_regen ON characters(health, max_health);
",
        ),
    ])
}
