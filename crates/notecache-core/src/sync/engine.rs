//! Debounced write-back engine
//!
//! Mirrors an in-memory collection into a [`PersistentTable`]. Producers push
//! changes into the engine's [`ChangeQueue`]; a watcher task waits for the
//! queue to go quiet for `debounce`, then flushes the cumulative delta in one
//! bulk delete and one bulk upsert.
//!
//! ## Delta rules
//!
//! The engine keeps a snapshot of what it believes the table holds (id to
//! `updated`). A queued upsert is written when its id is not in the snapshot
//! or its `updated` is strictly newer. A queued delete is written only when
//! the id is in the snapshot. Deletes go out before upserts.
//!
//! Failures never roll back the in-memory collection: the error lands in
//! [`SyncStatus`], the drained changes go back on the queue and are retried by
//! the next flush.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::queue::{coalesce, Change, ChangeQueue};
use super::status::SyncStatus;
use crate::storage::{PersistentTable, StorageResult, Syncable};
use crate::timestamp;

/// Default quiet period before a flush
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last change before writing
    pub debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl SyncConfig {
    pub fn from_millis(millis: u64) -> Self {
        Self {
            debounce: Duration::from_millis(millis),
        }
    }
}

/// Rows to write in one flush
#[derive(Debug)]
struct Delta<T> {
    upserts: Vec<T>,
    deletes: Vec<String>,
}

impl<T: Syncable> Delta<T> {
    fn compute(changes: Vec<Change<T>>, snapshot: &HashMap<String, String>) -> Self {
        let mut upserts = Vec::new();
        let mut deletes = Vec::new();

        for change in coalesce(changes) {
            match change {
                Change::Upsert(item) => {
                    let newer = snapshot
                        .get(item.sync_id())
                        .map_or(true, |known| item.updated() > known.as_str());
                    if newer {
                        upserts.push(item);
                    }
                }
                Change::Delete(id) => {
                    if snapshot.contains_key(&id) {
                        deletes.push(id);
                    }
                }
            }
        }

        Self { upserts, deletes }
    }

    fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    fn apply(&self, snapshot: &mut HashMap<String, String>) {
        for id in &self.deletes {
            snapshot.remove(id);
        }
        for item in &self.upserts {
            snapshot.insert(item.sync_id().to_string(), item.updated().to_string());
        }
    }
}

/// State shared between the engine handle and its watcher task
struct Inner<T: Syncable> {
    table: Arc<dyn PersistentTable<T>>,
    queue: ChangeQueue<T>,
    /// Persisted versions by id; also serializes flushes
    snapshot: Mutex<HashMap<String, String>>,
    status: watch::Sender<SyncStatus>,
}

impl<T: Syncable> Inner<T> {
    /// Write the pending delta; returns false if the write failed
    async fn flush(&self) -> bool {
        let mut snapshot = self.snapshot.lock().await;

        let changes = self.queue.drain();
        if changes.is_empty() {
            return true;
        }

        let delta = Delta::compute(changes.clone(), &snapshot);
        if delta.is_empty() {
            debug!("Flush skipped, {} change(s) already persisted", changes.len());
            return true;
        }

        self.status.send_modify(|status| {
            status.is_loading = true;
            status.error = None;
        });

        match self.write(&delta).await {
            Ok(()) => {
                delta.apply(&mut snapshot);
                debug!(
                    "Flushed {} upsert(s), {} delete(s)",
                    delta.upserts.len(),
                    delta.deletes.len()
                );
                self.status.send_modify(|status| {
                    status.is_loading = false;
                    status.last_sync_time = Some(timestamp::now());
                });
                true
            }
            Err(e) => {
                if e.is_recoverable() {
                    warn!("Sync failed, will retry: {}", e);
                } else {
                    error!("Sync failed: {}", e);
                }
                if let Some(hint) = e.recovery_suggestion() {
                    warn!("{}", hint);
                }
                self.queue.requeue(changes);
                self.status.send_modify(|status| {
                    status.is_loading = false;
                    status.error = Some(format!("Sync failed: {}", e));
                });
                false
            }
        }
    }

    async fn write(&self, delta: &Delta<T>) -> StorageResult<()> {
        if !delta.deletes.is_empty() {
            self.table.bulk_delete(&delta.deletes).await?;
        }
        if !delta.upserts.is_empty() {
            self.table.bulk_upsert(&delta.upserts).await?;
        }
        Ok(())
    }
}

/// Running watcher task
struct Watcher {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// One-way mirror of an in-memory collection into a table
pub struct SyncEngine<T: Syncable> {
    inner: Arc<Inner<T>>,
    config: SyncConfig,
    watcher: Option<Watcher>,
}

impl<T: Syncable> SyncEngine<T> {
    /// Create an engine writing to `table`; nothing is read or watched yet
    pub fn new(table: Arc<dyn PersistentTable<T>>, config: SyncConfig) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            inner: Arc::new(Inner {
                table,
                queue: ChangeQueue::new(),
                snapshot: Mutex::new(HashMap::new()),
                status,
            }),
            config,
            watcher: None,
        }
    }

    /// The table this engine writes to
    pub fn table(&self) -> &Arc<dyn PersistentTable<T>> {
        &self.inner.table
    }

    /// Producer handle for pushing changes
    pub fn queue(&self) -> ChangeQueue<T> {
        self.inner.queue.clone()
    }

    /// Number of changes waiting for the next flush
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// Current status
    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Read every row ordered by `order_field` and adopt it as the persisted state
    ///
    /// The snapshot is replaced by the rows read and any queued changes are
    /// dropped, so freshly loaded data is never written straight back. On
    /// failure the snapshot and queue are left alone.
    pub async fn hydrate(&self, order_field: &str) -> StorageResult<Vec<T>> {
        let mut snapshot = self.inner.snapshot.lock().await;
        self.inner.status.send_modify(|status| {
            status.is_loading = true;
            status.error = None;
        });

        match self.inner.table.read_all_ordered_by(order_field).await {
            Ok(items) => {
                *snapshot = items
                    .iter()
                    .map(|item| (item.sync_id().to_string(), item.updated().to_string()))
                    .collect();
                self.inner.queue.discard();
                info!("Loaded {} row(s)", items.len());
                self.inner.status.send_modify(|status| {
                    status.is_loading = false;
                    status.last_sync_time = Some(timestamp::now());
                });
                Ok(items)
            }
            Err(e) => {
                error!("Load failed: {}", e);
                self.inner.status.send_modify(|status| {
                    status.is_loading = false;
                    status.error = Some(format!("Load failed: {}", e));
                });
                Err(e)
            }
        }
    }

    /// Flush now, without waiting for the debounce; returns false on failure
    pub async fn manual_sync(&self) -> bool {
        self.inner.flush().await
    }

    /// Empty the table, the queue and the snapshot; returns false on failure
    pub async fn clear_all(&self) -> bool {
        let mut snapshot = self.inner.snapshot.lock().await;

        match self.inner.table.clear().await {
            Ok(()) => {
                snapshot.clear();
                self.inner.queue.discard();
                self.inner.status.send_modify(|status| {
                    status.error = None;
                    status.last_sync_time = Some(timestamp::now());
                });
                true
            }
            Err(e) => {
                error!("Clearing table failed: {}", e);
                self.inner.status.send_modify(|status| {
                    status.error = Some(format!("Clear failed: {}", e));
                });
                false
            }
        }
    }

    /// Start the debounced watcher; no-op if already running
    ///
    /// Returns false when called outside a Tokio runtime.
    pub fn start_watching(&mut self) -> bool {
        if self.is_watching() {
            return true;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Cannot watch for changes outside a Tokio runtime");
            return false;
        };

        let (stop, stop_rx) = oneshot::channel();
        let handle = runtime.spawn(watch_loop(
            Arc::clone(&self.inner),
            self.config.debounce,
            stop_rx,
        ));
        self.watcher = Some(Watcher { stop, handle });
        true
    }

    /// Stop scheduling debounced flushes; no-op if not running
    ///
    /// A flush already writing is allowed to finish. Changes queued while
    /// stopped stay queued for [`manual_sync`](Self::manual_sync) or the next
    /// [`start_watching`](Self::start_watching).
    pub fn stop_watching(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.stop.send(());
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .as_ref()
            .is_some_and(|watcher| !watcher.handle.is_finished())
    }
}

impl<T: Syncable> Drop for SyncEngine<T> {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

/// Watcher task: wait for a change, wait for quiet, flush, repeat
async fn watch_loop<T: Syncable>(
    inner: Arc<Inner<T>>,
    debounce: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    // Changes left queued by a previous watcher must not wait for a new one
    let mut pending = !inner.queue.is_empty();

    loop {
        if !pending {
            tokio::select! {
                _ = inner.queue.changed() => {}
                _ = &mut stop => return,
            }
        }
        pending = false;

        // Trailing edge: every further change restarts the quiet period
        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => break,
                _ = inner.queue.changed() => {}
                _ = &mut stop => return,
            }
        }

        inner.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, RecordPatch};
    use crate::storage::MemoryTable;

    const DEBOUNCE: Duration = Duration::from_millis(40);

    fn note(id: &str) -> Record {
        Record::note(format!("title {}", id), "").with_id(id)
    }

    fn engine_with(table: &Arc<MemoryTable<Record>>) -> SyncEngine<Record> {
        SyncEngine::new(
            Arc::clone(table) as Arc<dyn PersistentTable<Record>>,
            SyncConfig { debounce: DEBOUNCE },
        )
    }

    async fn settle() {
        tokio::time::sleep(DEBOUNCE * 5).await;
    }

    #[tokio::test]
    async fn test_manual_sync_writes_new_items() {
        let table = Arc::new(MemoryTable::new());
        let engine = engine_with(&table);

        engine.queue().upsert(note("a"));
        engine.queue().upsert(note("b"));
        assert!(engine.manual_sync().await);

        assert_eq!(table.snapshot().len(), 2);
        assert_eq!(table.write_count(), 1);
        assert!(engine.status().last_sync_time.is_some());
        assert_eq!(engine.pending(), 0);
    }

    #[tokio::test]
    async fn test_nothing_to_write_skips_table() {
        let table = Arc::new(MemoryTable::new());
        let engine = engine_with(&table);

        assert!(engine.manual_sync().await);
        assert_eq!(table.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unchanged_updated_is_not_rewritten() {
        let table = Arc::new(MemoryTable::with_rows(vec![note("a")]));
        let engine = engine_with(&table);
        let loaded = engine.hydrate("created").await.unwrap();

        engine.queue().upsert(loaded[0].clone());
        assert!(engine.manual_sync().await);
        assert_eq!(table.write_count(), 0);

        let mut edited = loaded[0].clone();
        edited.apply(RecordPatch::new().title("edited"));
        engine.queue().upsert(edited);
        assert!(engine.manual_sync().await);
        assert_eq!(table.write_count(), 1);
        assert_eq!(table.snapshot()[0].title, "edited");
    }

    #[tokio::test]
    async fn test_delete_only_persisted_ids() {
        let table = Arc::new(MemoryTable::with_rows(vec![note("a")]));
        let engine = engine_with(&table);
        engine.hydrate("created").await.unwrap();

        // Added and removed before any flush: never reaches the table
        engine.queue().upsert(note("b"));
        engine.queue().delete("b".to_string());
        assert!(engine.manual_sync().await);
        assert_eq!(table.write_count(), 0);

        engine.queue().delete("a".to_string());
        assert!(engine.manual_sync().await);
        assert!(table.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_debounce_coalesces_burst_into_one_write() {
        let table = Arc::new(MemoryTable::new());
        let mut engine = engine_with(&table);
        assert!(engine.start_watching());

        let mut record = note("a");
        for title in ["one", "two", "three"] {
            record.apply(RecordPatch::new().title(title));
            engine.queue().upsert(record.clone());
            tokio::time::sleep(DEBOUNCE / 4).await;
        }

        settle().await;

        assert_eq!(table.write_count(), 1);
        let rows = table.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "three");
    }

    #[tokio::test]
    async fn test_failed_write_is_retried() {
        let table = Arc::new(MemoryTable::new());
        let engine = engine_with(&table);

        table.set_fail_writes(true);
        engine.queue().upsert(note("a"));
        assert!(!engine.manual_sync().await);

        let status = engine.status();
        assert!(status.error.as_deref().unwrap().contains("write rejected"));
        assert!(!status.is_loading);
        assert_eq!(engine.pending(), 1);

        table.set_fail_writes(false);
        assert!(engine.manual_sync().await);
        assert!(engine.status().is_healthy());
        assert_eq!(table.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_hydrate_failure_reports_error() {
        let table: Arc<MemoryTable<Record>> = Arc::new(MemoryTable::new());
        table.set_fail_reads(true);
        let engine = engine_with(&table);

        assert!(engine.hydrate("created").await.is_err());
        assert!(engine.status().error.unwrap().starts_with("Load failed"));
    }

    #[tokio::test]
    async fn test_hydrate_drops_queued_changes() {
        let table = Arc::new(MemoryTable::with_rows(vec![note("a")]));
        let engine = engine_with(&table);

        engine.queue().upsert(note("stale"));
        let rows = engine.hydrate("created").await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(engine.pending(), 0);
        assert!(engine.manual_sync().await);
        assert_eq!(table.write_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_all_resets_snapshot() {
        let table = Arc::new(MemoryTable::with_rows(vec![note("a"), note("b")]));
        let engine = engine_with(&table);
        engine.hydrate("created").await.unwrap();
        engine.queue().upsert(note("c"));

        assert!(engine.clear_all().await);
        assert!(table.snapshot().is_empty());
        assert_eq!(engine.pending(), 0);

        // "a" is unknown again, so re-adding it is written
        engine.queue().upsert(note("a"));
        assert!(engine.manual_sync().await);
        assert_eq!(table.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_watching_keeps_changes_queued() {
        let table = Arc::new(MemoryTable::new());
        let mut engine = engine_with(&table);

        assert!(engine.start_watching());
        assert!(engine.start_watching());
        engine.stop_watching();
        engine.stop_watching();
        settle().await;
        assert!(!engine.is_watching());

        engine.queue().upsert(note("a"));
        settle().await;
        assert_eq!(table.write_count(), 0);
        assert_eq!(engine.pending(), 1);

        assert!(engine.start_watching());
        settle().await;
        assert_eq!(table.write_count(), 1);
    }

    #[tokio::test]
    async fn test_restart_during_quiet_period_still_flushes() {
        let table = Arc::new(MemoryTable::new());
        let mut engine = engine_with(&table);

        assert!(engine.start_watching());
        engine.queue().upsert(note("a"));
        tokio::time::sleep(DEBOUNCE / 4).await;

        // The first watcher already took the wakeup for "a"
        engine.stop_watching();
        assert!(engine.start_watching());
        settle().await;

        assert_eq!(engine.pending(), 0);
        assert_eq!(table.write_count(), 1);
        assert!(engine.is_watching());
    }

    #[tokio::test]
    async fn test_status_is_observable() {
        let table = Arc::new(MemoryTable::new());
        let engine = engine_with(&table);
        let mut status_rx = engine.subscribe_status();

        engine.queue().upsert(note("a"));
        engine.manual_sync().await;

        assert!(status_rx.has_changed().unwrap());
        assert!(status_rx.borrow_and_update().last_sync_time.is_some());
    }

    #[test]
    fn test_start_watching_outside_runtime() {
        let table = Arc::new(MemoryTable::new());
        let mut engine = engine_with(&table);
        assert!(!engine.start_watching());
        assert!(!engine.is_watching());
    }
}
