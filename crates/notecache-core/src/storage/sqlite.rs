//! SQLite-backed table
//!
//! Each scope (the main collection, or one user's collection) gets its own
//! database file holding a single `notes` table. Writes run in a transaction
//! so a bulk operation lands completely or not at all.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use tracing::debug;

use super::error::{StorageError, StorageResult};
use super::schema::{init_schema, needs_init, orderable_column};
use super::table::{PersistentTable, Predicate};
use crate::models::{ItemType, Record};

const SELECT_COLUMNS: &str =
    "id, item_type, parent_id, title, content, created, updated, is_deleted, note_count, version";

/// Raw row before the item type is validated
struct RecordRow {
    id: String,
    item_type: String,
    parent_id: Option<String>,
    title: String,
    content: String,
    created: String,
    updated: String,
    is_deleted: Option<i64>,
    note_count: i64,
    version: i64,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            item_type: row.get(1)?,
            parent_id: row.get(2)?,
            title: row.get(3)?,
            content: row.get(4)?,
            created: row.get(5)?,
            updated: row.get(6)?,
            is_deleted: row.get(7)?,
            note_count: row.get(8)?,
            version: row.get(9)?,
        })
    }

    fn hydrate(self) -> StorageResult<Record> {
        let item_type = ItemType::parse(&self.item_type).ok_or_else(|| StorageError::InvalidRow {
            id: self.id.clone(),
            details: format!("unknown item_type '{}'", self.item_type),
        })?;

        Ok(Record {
            id: self.id,
            item_type,
            parent_id: self.parent_id,
            title: self.title,
            content: self.content,
            created: self.created,
            updated: self.updated,
            is_deleted: self.is_deleted,
            note_count: self.note_count,
            version: self.version,
        })
    }
}

/// A [`PersistentTable`] of records stored in SQLite
pub struct SqliteTable {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteTable {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
        }

        let conn = Connection::open(path)?;
        if needs_init(&conn) {
            init_schema(&conn)?;
        }
        debug!("Opened record table at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Location of the database file, `None` for in-memory tables
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn query(&self, sql: &str) -> StorageResult<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], RecordRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.hydrate()?);
        }
        Ok(records)
    }
}

#[async_trait]
impl PersistentTable<Record> for SqliteTable {
    async fn read_all(&self) -> StorageResult<Vec<Record>> {
        self.query(&format!("SELECT {} FROM notes ORDER BY rowid", SELECT_COLUMNS))
    }

    async fn read_all_ordered_by(&self, field: &str) -> StorageResult<Vec<Record>> {
        let column =
            orderable_column(field).ok_or_else(|| StorageError::UnknownField(field.to_string()))?;
        self.query(&format!(
            "SELECT {} FROM notes ORDER BY {}, rowid",
            SELECT_COLUMNS, column
        ))
    }

    async fn bulk_upsert(&self, items: &[Record]) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO notes (id, item_type, parent_id, title, content, created, updated,
                                   is_deleted, note_count, version)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO UPDATE SET
                    item_type = excluded.item_type,
                    parent_id = excluded.parent_id,
                    title = excluded.title,
                    content = excluded.content,
                    created = excluded.created,
                    updated = excluded.updated,
                    is_deleted = excluded.is_deleted,
                    note_count = excluded.note_count,
                    version = excluded.version
                "#,
            )?;
            for record in items {
                stmt.execute(params![
                    record.id,
                    record.item_type.as_str(),
                    record.parent_id,
                    record.title,
                    record.content,
                    record.created,
                    record.updated,
                    record.is_deleted,
                    record.note_count,
                    record.version,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn bulk_delete(&self, ids: &[String]) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM notes WHERE id = ?")?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.conn()?.execute("DELETE FROM notes", [])?;
        Ok(())
    }

    async fn filter(&self, predicate: &Predicate<'_, Record>) -> StorageResult<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notes ORDER BY rowid",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map([], RecordRow::from_row)?;

        let mut matches = Vec::new();
        for row in rows {
            let record = row?.hydrate()?;
            if predicate(&record) {
                matches.push(record);
            }
        }
        Ok(matches)
    }

    async fn count(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, created: &str) -> Record {
        let mut record = Record::note(format!("title {}", id), format!("body {}", id)).with_id(id);
        record.created = created.to_string();
        record
    }

    #[tokio::test]
    async fn test_upsert_and_read_back() {
        let table = SqliteTable::open_in_memory().unwrap();
        let mut folder = Record::folder("Work").with_id("f1");
        folder.note_count = 3;
        let note = record("n1", "2026-01-01 00:00:00.000Z").in_folder("f1");

        table.bulk_upsert(&[folder.clone(), note.clone()]).await.unwrap();

        let rows = table.read_all().await.unwrap();
        assert_eq!(rows, vec![folder, note]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_row() {
        let table = SqliteTable::open_in_memory().unwrap();
        let mut note = record("n1", "1");
        table.bulk_upsert(&[note.clone()]).await.unwrap();

        note.title = "changed".to_string();
        note.is_deleted = Some(1);
        table.bulk_upsert(&[note.clone()]).await.unwrap();

        assert_eq!(table.count().await.unwrap(), 1);
        assert_eq!(table.read_all().await.unwrap()[0], note);
    }

    #[tokio::test]
    async fn test_missing_deleted_flag_round_trips_as_none() {
        let table = SqliteTable::open_in_memory().unwrap();
        let mut note = record("n1", "1");
        note.is_deleted = None;
        table.bulk_upsert(&[note]).await.unwrap();

        assert!(table.read_all().await.unwrap()[0].is_deleted.is_none());
    }

    #[tokio::test]
    async fn test_read_ordered_by_created() {
        let table = SqliteTable::open_in_memory().unwrap();
        table
            .bulk_upsert(&[record("c", "3"), record("a", "1"), record("b", "2"), record("d", "1")])
            .await
            .unwrap();

        let ids: Vec<String> = table
            .read_all_ordered_by("created")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "d", "b", "c"]);
    }

    #[tokio::test]
    async fn test_read_ordered_rejects_unknown_field() {
        let table = SqliteTable::open_in_memory().unwrap();
        let err = table.read_all_ordered_by("created DESC").await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownField(_)));
    }

    #[tokio::test]
    async fn test_bulk_delete_and_clear() {
        let table = SqliteTable::open_in_memory().unwrap();
        table
            .bulk_upsert(&[record("a", "1"), record("b", "2"), record("c", "3")])
            .await
            .unwrap();

        table
            .bulk_delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(table.count().await.unwrap(), 2);

        table.clear().await.unwrap();
        assert_eq!(table.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_filter() {
        let table = SqliteTable::open_in_memory().unwrap();
        table
            .bulk_upsert(&[record("a", "1"), record("b", "2")])
            .await
            .unwrap();

        let hits = table
            .filter(&|r: &Record| r.content.contains("body b"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_invalid_item_type_is_reported() {
        let table = SqliteTable::open_in_memory().unwrap();
        table
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO notes (id, item_type) VALUES ('x', 'link')",
                [],
            )
            .unwrap();

        let err = table.read_all().await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRow { .. }));
    }

    #[tokio::test]
    async fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("notes.db");

        {
            let table = SqliteTable::open(&path).unwrap();
            table.bulk_upsert(&[record("a", "1")]).await.unwrap();
            assert_eq!(table.path(), Some(path.as_path()));
        }

        let table = SqliteTable::open(&path).unwrap();
        let rows = table.read_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "title a");
    }
}
