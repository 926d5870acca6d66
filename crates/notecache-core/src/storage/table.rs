//! Persistent table abstraction
//!
//! The store and the sync engine never talk to a database directly. They
//! consume a [`PersistentTable`]: a keyed collection that can be read in full,
//! bulk upserted, bulk deleted, cleared and scanned with a predicate.

use async_trait::async_trait;

use super::error::StorageResult;
use crate::models::Record;

/// An item that can be mirrored into a [`PersistentTable`]
pub trait Syncable: Clone + Send + Sync + 'static {
    /// Unique key of the item
    fn sync_id(&self) -> &str;

    /// Timestamp of the last logical mutation; compared as a string
    fn updated(&self) -> &str;

    /// Value of a named field used for ordering, `None` if there is no such field
    fn sort_field(&self, field: &str) -> Option<&str>;
}

impl Syncable for Record {
    fn sync_id(&self) -> &str {
        &self.id
    }

    fn updated(&self) -> &str {
        &self.updated
    }

    fn sort_field(&self, field: &str) -> Option<&str> {
        self.field(field)
    }
}

/// Predicate accepted by [`PersistentTable::filter`]
pub type Predicate<'a, T> = dyn Fn(&T) -> bool + Send + Sync + 'a;

/// Keyed persistent collection of `T`
#[async_trait]
pub trait PersistentTable<T: Syncable>: Send + Sync {
    /// Every row, in storage order
    async fn read_all(&self) -> StorageResult<Vec<T>>;

    /// Every row, ascending by `field`; ties keep insertion order
    async fn read_all_ordered_by(&self, field: &str) -> StorageResult<Vec<T>>;

    /// Insert or replace rows by key
    async fn bulk_upsert(&self, items: &[T]) -> StorageResult<()>;

    /// Remove rows by key; unknown keys are ignored
    async fn bulk_delete(&self, ids: &[String]) -> StorageResult<()>;

    /// Remove every row
    async fn clear(&self) -> StorageResult<()>;

    /// Rows matching `predicate`, in storage order
    async fn filter(&self, predicate: &Predicate<'_, T>) -> StorageResult<Vec<T>>;

    /// Number of rows
    async fn count(&self) -> StorageResult<usize>;
}
