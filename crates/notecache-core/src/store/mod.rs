//! Indexed note store
//!
//! The `NoteStore` is the authoritative in-memory collection of notes and
//! folders for one scope. It keeps:
//!
//! - the sequence: record ids ordered by `created`, ties in insertion order
//! - a by-id map that owns the records
//! - a by-parent map from parent key to child ids, in sequence order
//!
//! Only [`add`](NoteStore::add), [`update`](NoteStore::update),
//! [`delete`](NoteStore::delete) and load/clear touch these structures, and
//! each of them keeps all three in agreement.
//!
//! ## Persistence
//!
//! Every mutation pushes a change onto the store's [`SyncEngine`], which
//! writes to the persistent table after a quiet period. Reads never wait on
//! storage. Load and write failures are logged and exposed through
//! [`NoteStore::sync_status`]; they never roll back memory.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = NoteStore::new(table, SyncConfig::default());
//! store.load().await;
//!
//! let folder = store.add(Record::folder("Work"));
//! let note = store.add(Record::note("Plan", "ship it").in_folder(&folder.id));
//! store.propagate_count_up_to_root(&note)?;
//!
//! let tree = store.build_folder_tree(ROOT_KEY)?;
//! ```

mod error;
mod hierarchy;
pub mod user;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::models::{FolderNode, Record, RecordPatch, SearchHit, UNFILED_NOTES};
use crate::storage::PersistentTable;
use crate::sync::{ChangeQueue, SyncConfig, SyncEngine, SyncStatus};
use crate::timestamp;

pub use error::{StoreError, StoreResult};
use hierarchy::Hierarchy;
pub use user::{MemoryTableProvider, SqliteTableProvider, TableProvider, UserNoteStore, UserStores};

/// Days a soft-deleted record stays visible in [`NoteStore::list_deleted`]
pub const DEFAULT_TRASH_RETENTION_DAYS: i64 = 30;

/// Field the sequence is ordered by
pub(crate) const ORDER_FIELD: &str = "created";

/// Handle returned by [`NoteStore::on_update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback fired after every successful update
pub type UpdateListener = Box<dyn Fn(&Record) + Send + Sync>;

/// Registered update callbacks
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, UpdateListener)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, listener: UpdateListener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub(crate) fn notify(&self, record: &Record) {
        for (_, listener) in &self.entries {
            listener(record);
        }
    }
}

/// Fill in missing timestamps on a record about to be added
pub(crate) fn stamp_new(record: &mut Record) {
    if record.updated.is_empty() {
        record.updated = timestamp::now();
    }
    if record.created.is_empty() {
        record.created = record.updated.clone();
    }
}

/// In-memory notes and folders with O(1) lookup by id and by parent
pub struct NoteStore {
    /// Record ids ordered by `created`
    order: Vec<String>,
    /// Records by id
    by_id: HashMap<String, Record>,
    /// Child ids by parent key
    by_parent: HashMap<String, Vec<String>>,
    /// Set once a load succeeded
    loaded: bool,
    engine: SyncEngine<Record>,
    /// Producer side of the engine's queue
    changes: ChangeQueue<Record>,
    retention_days: i64,
    listeners: Listeners,
}

impl NoteStore {
    /// Create an empty store over `table`; call [`load`](Self::load) to fill it
    pub fn new(table: Arc<dyn PersistentTable<Record>>, config: SyncConfig) -> Self {
        let engine = SyncEngine::new(table, config);
        Self {
            order: Vec::new(),
            by_id: HashMap::new(),
            by_parent: HashMap::new(),
            loaded: false,
            changes: engine.queue(),
            engine,
            retention_days: DEFAULT_TRASH_RETENTION_DAYS,
            listeners: Listeners::default(),
        }
    }

    /// Builder: how many days soft-deleted records stay listed
    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Records in sequence order
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    // ==================== Loading ====================

    /// Fill the store from its table and start writing changes back
    ///
    /// Runs once: after a successful load further calls return immediately.
    /// A failed read is logged, leaves the store as it was and lets a later
    /// call retry. Returns whether the store is loaded.
    pub async fn load(&mut self) -> bool {
        if self.loaded {
            debug!("Store already loaded");
            return true;
        }

        match self.engine.hydrate(ORDER_FIELD).await {
            Ok(records) => {
                self.replace(records);
                self.loaded = true;
                self.engine.start_watching();
                true
            }
            Err(e) => {
                warn!("Store not loaded, next load will retry: {}", e);
                false
            }
        }
    }

    /// Write pending changes, then re-read the table
    ///
    /// Returns false if either step failed; memory is only replaced after a
    /// successful read.
    pub async fn reload(&mut self) -> bool {
        if !self.engine.manual_sync().await {
            warn!("Reload skipped, pending changes could not be written");
            return false;
        }

        match self.engine.hydrate(ORDER_FIELD).await {
            Ok(records) => {
                self.replace(records);
                self.loaded = true;
                true
            }
            Err(_) => false,
        }
    }

    fn replace(&mut self, mut records: Vec<Record>) {
        records.sort_by(|a, b| a.created.cmp(&b.created));
        self.order = records.iter().map(|r| r.id.clone()).collect();
        self.by_id = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        self.rebuild_indexes();
    }

    /// Recompute the by-parent index from the sequence
    ///
    /// Also drops by-id entries no longer in the sequence.
    pub fn rebuild_indexes(&mut self) {
        let live: HashSet<&String> = self.order.iter().collect();
        self.by_id.retain(|id, _| live.contains(id));

        let mut by_parent: HashMap<String, Vec<String>> = HashMap::new();
        for record in self.order.iter().filter_map(|id| self.by_id.get(id)) {
            by_parent
                .entry(record.parent_key().to_string())
                .or_default()
                .push(record.id.clone());
        }
        self.by_parent = by_parent;
        debug!("Rebuilt indexes for {} record(s)", self.order.len());
    }

    // ==================== Mutations ====================

    /// Insert a record at its place by `created`
    ///
    /// Missing `created` / `updated` are set to now. A record whose id is
    /// already present replaces the existing one.
    pub fn add(&mut self, mut record: Record) -> Record {
        stamp_new(&mut record);

        if self.by_id.contains_key(&record.id) {
            self.detach(&record.id);
        }

        let key = record.parent_key().to_string();
        let position = sorted_position(&self.by_id, &self.order, &record.created);
        self.order.insert(position, record.id.clone());

        let bucket = self.by_parent.entry(key).or_default();
        let position = sorted_position(&self.by_id, bucket, &record.created);
        bucket.insert(position, record.id.clone());

        self.by_id.insert(record.id.clone(), record.clone());
        self.changes.upsert(record.clone());
        record
    }

    /// Merge `patch` into the record with `id`
    ///
    /// Returns the updated record, or `None` if there is no such record.
    /// Update listeners fire after the indexes are refreshed.
    pub fn update(&mut self, id: &str, patch: RecordPatch) -> Option<Record> {
        let record = self.by_id.get_mut(id)?;
        let old_key = record.parent_key().to_string();
        record.apply(patch);
        let updated = record.clone();

        if updated.parent_key() != old_key {
            self.remove_from_bucket(&old_key, id);
            let bucket = self
                .by_parent
                .entry(updated.parent_key().to_string())
                .or_default();
            let position = sorted_position(&self.by_id, bucket, &updated.created);
            bucket.insert(position, id.to_string());
        }

        self.changes.upsert(updated.clone());
        self.listeners.notify(&updated);
        Some(updated)
    }

    /// Remove the record with `id`; returns it, or `None` if absent
    pub fn delete(&mut self, id: &str) -> Option<Record> {
        let record = self.detach(id)?;
        self.changes.delete(record.id.clone());
        Some(record)
    }

    /// Mark as deleted without removing
    pub fn soft_delete(&mut self, id: &str) -> Option<Record> {
        self.update(id, RecordPatch::new().deleted(true))
    }

    /// Clear the deleted mark
    pub fn restore(&mut self, id: &str) -> Option<Record> {
        self.update(id, RecordPatch::new().deleted(false))
    }

    /// Remove from the sequence and both indexes without queueing a change
    fn detach(&mut self, id: &str) -> Option<Record> {
        let record = self.by_id.remove(id)?;
        self.order.retain(|existing| existing != id);
        self.remove_from_bucket(record.parent_key(), id);
        Some(record)
    }

    fn remove_from_bucket(&mut self, key: &str, id: &str) {
        if let Some(bucket) = self.by_parent.get_mut(key) {
            bucket.retain(|existing| existing != id);
            if bucket.is_empty() {
                self.by_parent.remove(key);
            }
        }
    }

    // ==================== Queries ====================

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.by_id.get(id)
    }

    /// Records under a parent key
    ///
    /// [`ALL_NOTES`](crate::models::ALL_NOTES) selects every active note,
    /// [`UNFILED_NOTES`](crate::models::UNFILED_NOTES) the active notes at the
    /// root. Any other key selects the direct children of that bucket, active
    /// only unless `include_deleted`.
    pub fn query_by_parent(&self, key: &str, include_deleted: bool) -> Vec<&Record> {
        hierarchy::query_by_parent(self, key, include_deleted)
    }

    pub fn list_folders(&self) -> Vec<&Record> {
        hierarchy::list_folders(self)
    }

    /// Soft-deleted records updated within the retention window
    pub fn list_deleted(&self) -> Vec<&Record> {
        let cutoff = timestamp::days_ago(self.retention_days);
        hierarchy::list_deleted(self, &cutoff)
    }

    /// Active notes under `key` plus the cached counts of its active subfolders
    pub fn count_by_parent(&self, key: &str) -> i64 {
        hierarchy::count_by_parent(self, key)
    }

    /// Refresh `note_count` on every folder ancestor of `record`, nearest first
    ///
    /// Nothing is changed if the ancestor chain contains a cycle.
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

    /// Active folders under `key`, each with its nested active subfolders
    pub fn build_folder_tree(&self, key: &str) -> StoreResult<Vec<FolderNode>> {
        hierarchy::build_folder_tree(self, key)
    }

    /// Notes under `key` whose content contains `keyword`, recursing into folders
    ///
    /// Matching is a case-sensitive substring test. Hits directly under `key`
    /// are labelled `label`; deeper hits carry their folder's title.
    pub fn search_by_keyword(
        &self,
        key: &str,
        label: &str,
        keyword: &str,
    ) -> StoreResult<Vec<SearchHit>> {
        hierarchy::search_by_keyword(self, key, label, keyword)
    }

    /// Active notes in the persistent table whose title or content contains `keyword`
    ///
    /// Reads the table rather than memory, so unflushed changes are not seen.
    /// A failed read is logged and yields no results.
    pub async fn search_in_persisted_store(&self, keyword: &str) -> Vec<Record> {
        search_table(self.engine.table().as_ref(), keyword).await
    }

    /// The earliest created record
    pub fn first_note(&self) -> Option<&Record> {
        self.records().next()
    }

    /// Records whose `updated` is later than `since`
    pub fn updated_since(&self, since: &str) -> Vec<&Record> {
        self.records()
            .filter(|r| r.updated.as_str() > since)
            .collect()
    }

    /// Active notes without a parent
    pub fn unfiled_notes_count(&self) -> usize {
        self.query_by_parent(UNFILED_NOTES, false).len()
    }

    // ==================== Listeners ====================

    /// Register a callback fired with the record after every update
    pub fn on_update<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&Record) + Send + Sync + 'static,
    {
        self.listeners.add(Box::new(listener))
    }

    /// Unregister a callback; returns false if it was not registered
    pub fn remove_update_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // ==================== Sync ====================

    /// Write pending changes now; returns false on failure
    pub async fn manual_sync(&self) -> bool {
        self.engine.manual_sync().await
    }

    /// Delete everything, in memory and in the table
    ///
    /// Memory is only cleared once the table was cleared.
    pub async fn clear_all(&mut self) -> bool {
        if !self.engine.clear_all().await {
            return false;
        }
        self.order.clear();
        self.by_id.clear();
        self.by_parent.clear();
        true
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.engine.status()
    }

    pub fn subscribe_sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.engine.subscribe_status()
    }

    /// Changes not yet written
    pub fn pending_changes(&self) -> usize {
        self.engine.pending()
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

impl Hierarchy for NoteStore {
    fn record(&self, id: &str) -> Option<&Record> {
        self.by_id.get(id)
    }

    fn children(&self, key: &str) -> Vec<&Record> {
        self.by_parent
            .get(key)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    fn all(&self) -> Vec<&Record> {
        self.records().collect()
    }
}

/// Index at which a record created at `created` goes so `ids` stays sorted
///
/// Equal timestamps keep insertion order: the new id goes after them.
fn sorted_position(by_id: &HashMap<String, Record>, ids: &[String], created: &str) -> usize {
    ids.partition_point(|id| {
        by_id
            .get(id)
            .map_or(true, |existing| existing.created.as_str() <= created)
    })
}

/// Filter a table for active notes mentioning `keyword`
pub(crate) async fn search_table(
    table: &dyn PersistentTable<Record>,
    keyword: &str,
) -> Vec<Record> {
    let matches = |r: &Record| {
        r.is_note() && r.is_active() && (r.content.contains(keyword) || r.title.contains(keyword))
    };
    match table.filter(&matches).await {
        Ok(records) => records,
        Err(e) => {
            warn!("Persisted search failed: {}", e);
            Vec::new()
        }
    }
}
