//! In-memory table
//!
//! Backs ephemeral sessions and tests. Rows keep their insertion position
//! when replaced, like SQLite's `rowid` under `ON CONFLICT DO UPDATE`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::{StorageError, StorageResult};
use super::table::{PersistentTable, Predicate, Syncable};

/// A [`PersistentTable`] held in process memory
#[derive(Debug)]
pub struct MemoryTable<T> {
    rows: Mutex<Vec<T>>,
    /// Bulk upsert / delete / clear calls that reached the table
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl<T: Syncable> MemoryTable<T> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Create a table pre-filled with `rows`
    pub fn with_rows(rows: Vec<T>) -> Self {
        let table = Self::new();
        if let Ok(mut guard) = table.rows.lock() {
            *guard = rows;
        }
        table
    }

    /// Number of write operations performed so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of the current rows
    pub fn snapshot(&self) -> Vec<T> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    /// Make subsequent reads fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("read rejected".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("write rejected".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rows(&self) -> StorageResult<std::sync::MutexGuard<'_, Vec<T>>> {
        self.rows.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

#[async_trait]
impl<T: Syncable> PersistentTable<T> for MemoryTable<T> {
    async fn read_all(&self) -> StorageResult<Vec<T>> {
        self.check_read()?;
        Ok(self.rows()?.clone())
    }

    async fn read_all_ordered_by(&self, field: &str) -> StorageResult<Vec<T>> {
        self.check_read()?;
        let mut rows = self.rows()?.clone();
        if let Some(first) = rows.first() {
            if first.sort_field(field).is_none() {
                return Err(StorageError::UnknownField(field.to_string()));
            }
        }
        rows.sort_by(|a, b| a.sort_field(field).cmp(&b.sort_field(field)));
        Ok(rows)
    }

    async fn bulk_upsert(&self, items: &[T]) -> StorageResult<()> {
        self.check_write()?;
        let mut rows = self.rows()?;
        for item in items {
            match rows.iter_mut().find(|row| row.sync_id() == item.sync_id()) {
                Some(existing) => *existing = item.clone(),
                None => rows.push(item.clone()),
            }
        }
        Ok(())
    }

    async fn bulk_delete(&self, ids: &[String]) -> StorageResult<()> {
        self.check_write()?;
        self.rows()?
            .retain(|row| !ids.iter().any(|id| id == row.sync_id()));
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.check_write()?;
        self.rows()?.clear();
        Ok(())
    }

    async fn filter(&self, predicate: &Predicate<'_, T>) -> StorageResult<Vec<T>> {
        self.check_read()?;
        Ok(self
            .rows()?
            .iter()
            .filter(|row| predicate(row))
            .cloned()
            .collect())
    }

    async fn count(&self) -> StorageResult<usize> {
        self.check_read()?;
        Ok(self.rows()?.len())
    }
}
