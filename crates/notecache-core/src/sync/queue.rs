//! Change queue
//!
//! Store mutations push a [`Change`] here; the engine drains the queue after
//! a quiet period. Draining coalesces to the last change per id, so a burst of
//! edits to one record costs a single row write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::storage::Syncable;

/// A pending mutation of one item
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    /// The item was added or modified; carries its state after the mutation
    Upsert(T),
    /// The item with this id was removed
    Delete(String),
}

impl<T: Syncable> Change<T> {
    pub fn id(&self) -> &str {
        match self {
            Change::Upsert(item) => item.sync_id(),
            Change::Delete(id) => id,
        }
    }
}

#[derive(Debug)]
struct Shared<T> {
    pending: Mutex<Vec<Change<T>>>,
    changed: Notify,
}

/// Producer handle onto an engine's pending changes
#[derive(Debug)]
pub struct ChangeQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ChangeQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Syncable> ChangeQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(Vec::new()),
                changed: Notify::new(),
            }),
        }
    }

    /// Enqueue a change and wake the watcher
    pub fn push(&self, change: Change<T>) {
        self.with_pending(|pending| pending.push(change));
        self.shared.changed.notify_one();
    }

    pub fn upsert(&self, item: T) {
        self.push(Change::Upsert(item));
    }

    pub fn delete(&self, id: impl Into<String>) {
        self.push(Change::Delete(id.into()));
    }

    /// Number of changes waiting to be flushed (before coalescing)
    pub fn len(&self) -> usize {
        self.with_pending(|pending| pending.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until a change is pushed
    pub(crate) async fn changed(&self) {
        self.shared.changed.notified().await;
    }

    /// Take every pending change, oldest first
    pub(crate) fn drain(&self) -> Vec<Change<T>> {
        self.with_pending(std::mem::take)
    }

    /// Put changes back at the head of the queue after a failed flush
    ///
    /// Changes queued since the drain stay behind them, so they still win
    /// when the queue is next coalesced.
    pub(crate) fn requeue(&self, mut changes: Vec<Change<T>>) {
        self.with_pending(|pending| {
            changes.append(pending);
            *pending = changes;
        });
    }

    /// Drop every pending change
    pub(crate) fn discard(&self) {
        self.with_pending(|pending| pending.clear());
    }

    fn with_pending<R>(&self, f: impl FnOnce(&mut Vec<Change<T>>) -> R) -> R {
        match self.shared.pending.lock() {
            Ok(mut pending) => f(&mut pending),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

/// Collapse a change list to the last change per id, in first-seen order
pub(crate) fn coalesce<T: Syncable>(changes: Vec<Change<T>>) -> Vec<Change<T>> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut latest: Vec<Change<T>> = Vec::new();

    for change in changes {
        match positions.get(change.id()) {
            Some(&index) => latest[index] = change,
            None => {
                positions.insert(change.id().to_string(), latest.len());
                latest.push(change);
            }
        }
    }

    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;

    fn note(id: &str, title: &str) -> Record {
        Record::note(title, "").with_id(id)
    }

    #[test]
    fn test_coalesce_keeps_last_change_in_first_seen_order() {
        let changes = vec![
            Change::Upsert(note("a", "1")),
            Change::Upsert(note("b", "1")),
            Change::Upsert(note("a", "2")),
            Change::Delete("b".to_string()),
            Change::Upsert(note("c", "1")),
        ];

        let latest = coalesce(changes);

        assert_eq!(latest.len(), 3);
        assert!(matches!(&latest[0], Change::Upsert(r) if r.id == "a" && r.title == "2"));
        assert!(matches!(&latest[1], Change::Delete(id) if id == "b"));
        assert!(matches!(&latest[2], Change::Upsert(r) if r.id == "c"));
    }

    #[test]
    fn test_drain_empties_queue() {
        let queue = ChangeQueue::new();
        queue.upsert(note("a", "1"));
        queue.delete("b");
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_requeue_puts_changes_before_newer_ones() {
        let queue = ChangeQueue::new();
        queue.upsert(note("a", "old"));
        let drained = queue.drain();

        queue.upsert(note("a", "new"));
        queue.requeue(drained);

        let latest = coalesce(queue.drain());
        assert_eq!(latest.len(), 1);
        assert!(matches!(&latest[0], Change::Upsert(r) if r.title == "new"));
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        let queue: ChangeQueue<Record> = ChangeQueue::new();
        let waiter = queue.clone();
        let handle = tokio::spawn(async move { waiter.changed().await });

        queue.delete("a");
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
