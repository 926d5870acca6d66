//! SQLite schema for persisted records
//!
//! One `notes` table per database file. The in-memory store is the source of
//! truth during a session; this table is its downstream mirror.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Columns a caller may order by
pub const ORDERABLE_COLUMNS: &[&str] = &["id", "title", "created", "updated", "item_type", "parent_id"];

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Notes and folders
        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            item_type TEXT NOT NULL,
            parent_id TEXT,
            title TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            created TEXT NOT NULL DEFAULT '',
            updated TEXT NOT NULL DEFAULT '',
            is_deleted INTEGER,
            note_count INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0
        );

        -- Load order
        CREATE INDEX IF NOT EXISTS idx_notes_created ON notes(created);

        -- Change queries
        CREATE INDEX IF NOT EXISTS idx_notes_updated ON notes(updated);

        -- Children of a folder
        CREATE INDEX IF NOT EXISTS idx_notes_parent_id ON notes(parent_id);

        -- Listing by type within a folder
        CREATE INDEX IF NOT EXISTS idx_notes_type_parent_deleted
            ON notes(item_type, parent_id, is_deleted);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

/// Map an order-by field to a column name, rejecting anything not whitelisted
pub fn orderable_column(field: &str) -> Option<&'static str> {
    ORDERABLE_COLUMNS.iter().copied().find(|c| *c == field)
}
