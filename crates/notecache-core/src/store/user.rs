//! Per-user stores
//!
//! A [`UserNoteStore`] holds one user's notes and folders with its own table
//! and sync engine. It answers the same queries as [`NoteStore`] but keeps no
//! indexes: lookups scan the sequence. Per-user collections are small, so the
//! scan is cheaper than keeping two maps in step.
//!
//! [`UserStores`] is the registry of these stores, keyed by username. Stores
//! are created on first use through a [`TableProvider`].
//!
//! [`NoteStore`]: super::NoteStore

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::hierarchy::{self, Hierarchy};
use super::{search_table, stamp_new, ListenerId, Listeners, StoreResult};
use super::{DEFAULT_TRASH_RETENTION_DAYS, ORDER_FIELD};
use crate::config::Config;
use crate::models::{FolderNode, Record, RecordPatch, SearchHit, UNFILED_NOTES};
use crate::storage::{MemoryTable, PersistentTable, SqliteTable, StorageError, StorageResult};
use crate::sync::{ChangeQueue, SyncConfig, SyncEngine, SyncStatus};
use crate::timestamp;

/// Source of the table behind each user's store
pub trait TableProvider: Send + Sync {
    fn open_table(&self, username: &str) -> StorageResult<Arc<dyn PersistentTable<Record>>>;
}

/// One SQLite file per user under the data directory
pub struct SqliteTableProvider {
    config: Config,
}

impl SqliteTableProvider {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Database file used for `username`
    pub fn path_for(&self, username: &str) -> PathBuf {
        self.config.user_db_path(username)
    }
}

impl TableProvider for SqliteTableProvider {
    fn open_table(&self, username: &str) -> StorageResult<Arc<dyn PersistentTable<Record>>> {
        let table = SqliteTable::open(&self.path_for(username))?;
        Ok(Arc::new(table))
    }
}

/// Ephemeral per-user tables; the same table is handed out for a username
/// every time
#[derive(Default)]
pub struct MemoryTableProvider {
    tables: Mutex<HashMap<String, Arc<MemoryTable<Record>>>>,
}

impl MemoryTableProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table for `username`, created empty on first use
    pub fn table(&self, username: &str) -> StorageResult<Arc<MemoryTable<Record>>> {
        let mut tables = self.tables.lock().map_err(|_| StorageError::LockPoisoned)?;
        let table = tables
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(MemoryTable::new()));
        Ok(Arc::clone(table))
    }
}

impl TableProvider for MemoryTableProvider {
    fn open_table(&self, username: &str) -> StorageResult<Arc<dyn PersistentTable<Record>>> {
        let table: Arc<dyn PersistentTable<Record>> = self.table(username)?;
        Ok(table)
    }
}

/// One user's notes and folders
pub struct UserNoteStore {
    username: String,
    /// Records ordered by `created`
    records: Vec<Record>,
    loaded: bool,
    engine: SyncEngine<Record>,
    changes: ChangeQueue<Record>,
    retention_days: i64,
    listeners: Listeners,
}

impl UserNoteStore {
    pub fn new(
        username: impl Into<String>,
        table: Arc<dyn PersistentTable<Record>>,
        config: SyncConfig,
    ) -> Self {
        let engine = SyncEngine::new(table, config);
        Self {
            username: username.into(),
            records: Vec::new(),
            loaded: false,
            changes: engine.queue(),
            engine,
            retention_days: DEFAULT_TRASH_RETENTION_DAYS,
            listeners: Listeners::default(),
        }
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.records.iter()
    }

    /// Fill from the user's table once; a failed read is retried on the next call
    pub async fn load(&mut self) -> bool {
        if self.loaded {
            return true;
        }

        match self.engine.hydrate(ORDER_FIELD).await {
            Ok(mut records) => {
                records.sort_by(|a, b| a.created.cmp(&b.created));
                self.records = records;
                self.loaded = true;
                self.engine.start_watching();
                debug!("Loaded {} record(s) for user '{}'", self.records.len(), self.username);
                true
            }
            Err(e) => {
                warn!("Store for user '{}' not loaded: {}", self.username, e);
                false
            }
        }
    }

    /// Write pending changes, then re-read the user's table
    pub async fn reload(&mut self) -> bool {
        if !self.engine.manual_sync().await {
            warn!(
                "Reload for user '{}' skipped, pending changes could not be written",
                self.username
            );
            return false;
        }

        match self.engine.hydrate(ORDER_FIELD).await {
            Ok(mut records) => {
                records.sort_by(|a, b| a.created.cmp(&b.created));
                self.records = records;
                self.loaded = true;
                true
            }
            Err(_) => false,
        }
    }

    // ==================== Mutations ====================

    pub fn add(&mut self, mut record: Record) -> Record {
        stamp_new(&mut record);
        self.records.retain(|existing| existing.id != record.id);

        let position = self
            .records
            .partition_point(|existing| existing.created <= record.created);
        self.records.insert(position, record.clone());
        self.changes.upsert(record.clone());
        record
    }

    pub fn update(&mut self, id: &str, patch: RecordPatch) -> Option<Record> {
        let record = self.records.iter_mut().find(|r| r.id == id)?;
        record.apply(patch);
        let updated = record.clone();

        self.changes.upsert(updated.clone());
        self.listeners.notify(&updated);
        Some(updated)
    }

    pub fn delete(&mut self, id: &str) -> Option<Record> {
        let position = self.records.iter().position(|r| r.id == id)?;
        let record = self.records.remove(position);
        self.changes.delete(record.id.clone());
        Some(record)
    }

    pub fn soft_delete(&mut self, id: &str) -> Option<Record> {
        self.update(id, RecordPatch::new().deleted(true))
    }

    pub fn restore(&mut self, id: &str) -> Option<Record> {
        self.update(id, RecordPatch::new().deleted(false))
    }

    // ==================== Queries ====================

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn query_by_parent(&self, key: &str, include_deleted: bool) -> Vec<&Record> {
        hierarchy::query_by_parent(self, key, include_deleted)
    }

    pub fn list_folders(&self) -> Vec<&Record> {
        hierarchy::list_folders(self)
    }

    pub fn list_deleted(&self) -> Vec<&Record> {
        let cutoff = timestamp::days_ago(self.retention_days);
        hierarchy::list_deleted(self, &cutoff)
    }

    pub fn count_by_parent(&self, key: &str) -> i64 {
        hierarchy::count_by_parent(self, key)
    }

    pub fn propagate_count_up_to_root(&mut self, record: &Record) -> StoreResult<()> {
        for id in hierarchy::folder_ancestors(self, record)? {
            let count = self.count_by_parent(&id);
            self.update(&id, RecordPatch::new().note_count(count));
        }
        Ok(())
    }

    /// Whether `id` is `root` or one of its descendants
    ///
    /// Moving `root` under such an `id` would close a parent cycle.
    pub fn is_in_subtree(&self, root: &str, id: &str) -> bool {
        hierarchy::is_in_subtree(self, root, id)
    }

    pub fn build_folder_tree(&self, key: &str) -> StoreResult<Vec<FolderNode>> {
        hierarchy::build_folder_tree(self, key)
    }

    pub fn search_by_keyword(
        &self,
        key: &str,
        label: &str,
        keyword: &str,
    ) -> StoreResult<Vec<SearchHit>> {
        hierarchy::search_by_keyword(self, key, label, keyword)
    }

    pub async fn search_in_persisted_store(&self, keyword: &str) -> Vec<Record> {
        search_table(self.engine.table().as_ref(), keyword).await
    }

    /// The earliest created record
    pub fn first_note(&self) -> Option<&Record> {
        self.records.first()
    }

    /// Records whose `updated` is later than `since`
    pub fn updated_since(&self, since: &str) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|r| r.updated.as_str() > since)
            .collect()
    }

    pub fn unfiled_notes_count(&self) -> usize {
        self.query_by_parent(UNFILED_NOTES, false).len()
    }

    pub fn on_update<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&Record) + Send + Sync + 'static,
    {
        self.listeners.add(Box::new(listener))
    }

    pub fn remove_update_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // ==================== Sync ====================

    pub async fn manual_sync(&self) -> bool {
        self.engine.manual_sync().await
    }

    pub async fn clear_all(&mut self) -> bool {
        if !self.engine.clear_all().await {
            return false;
        }
        self.records.clear();
        true
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.engine.status()
    }

    pub fn pending_changes(&self) -> usize {
        self.engine.pending()
    }

    pub fn subscribe_sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.engine.subscribe_status()
    }

    pub fn start_watching(&mut self) -> bool {
        self.engine.start_watching()
    }

    pub fn stop_watching(&mut self) {
        self.engine.stop_watching();
    }

    pub fn is_watching(&self) -> bool {
        self.engine.is_watching()
    }
}

impl Hierarchy for UserNoteStore {
    fn record(&self, id: &str) -> Option<&Record> {
        self.get(id)
    }

    fn children(&self, key: &str) -> Vec<&Record> {
        self.records.iter().filter(|r| r.parent_key() == key).collect()
    }

    fn all(&self) -> Vec<&Record> {
        self.records.iter().collect()
    }
}

/// Registry of per-user stores
pub struct UserStores {
    provider: Arc<dyn TableProvider>,
    config: SyncConfig,
    retention_days: i64,
    stores: HashMap<String, UserNoteStore>,
}

impl UserStores {
    pub fn new(provider: Arc<dyn TableProvider>, config: SyncConfig) -> Self {
        Self {
            provider,
            config,
            retention_days: DEFAULT_TRASH_RETENTION_DAYS,
            stores: HashMap::new(),
        }
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    /// The store for `username`, created and loaded on first use
    ///
    /// Calling this again for a loaded user returns the same store without
    /// touching storage. A failed load leaves the store registered but
    /// unloaded, so the next call retries.
    pub async fn initialize(&mut self, username: &str) -> StoreResult<&mut UserNoteStore> {
        let store = match self.stores.entry(username.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let table = self.provider.open_table(username)?;
                info!("Opened store for user '{}'", username);
                entry.insert(
                    UserNoteStore::new(username, table, self.config)
                        .with_retention_days(self.retention_days),
                )
            }
        };
        store.load().await;
        Ok(store)
    }

    pub fn get(&self, username: &str) -> Option<&UserNoteStore> {
        self.stores.get(username)
    }

    pub fn get_mut(&mut self, username: &str) -> Option<&mut UserNoteStore> {
        self.stores.get_mut(username)
    }

    pub fn usernames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stores.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Stop every watcher and write what is pending; false if any write failed
    pub async fn flush_all(&mut self) -> bool {
        let mut ok = true;
        for store in self.stores.values_mut() {
            store.stop_watching();
            ok &= store.manual_sync().await;
        }
        ok
    }
}
