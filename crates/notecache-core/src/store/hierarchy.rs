//! Queries over the parent/child structure
//!
//! Both store variants answer the same hierarchical questions; they differ
//! only in how they find a record or a bucket. [`Hierarchy`] is that seam:
//! the indexed store answers from its maps, the per-user store by scanning.
//!
//! Every walk keeps a visited set and fails with [`StoreError::Cycle`] when a
//! parent chain loops, instead of recursing forever.

use std::collections::HashSet;

use crate::models::{FolderNode, Record, SearchHit, ALL_NOTES, ROOT_KEY, UNFILED_NOTES};
use crate::store::error::{StoreError, StoreResult};

/// Record lookup used by the shared queries
pub(crate) trait Hierarchy {
    fn record(&self, id: &str) -> Option<&Record>;

    /// Direct children in the bucket `key`, in sequence order, deleted included
    fn children(&self, key: &str) -> Vec<&Record>;

    /// Every record in sequence order
    fn all(&self) -> Vec<&Record>;
}

pub(crate) fn query_by_parent<'a, H: Hierarchy + ?Sized>(
    store: &'a H,
    key: &str,
    include_deleted: bool,
) -> Vec<&'a Record> {
    match key {
        ALL_NOTES => store
            .all()
            .into_iter()
            .filter(|r| r.is_note() && r.is_active())
            .collect(),
        UNFILED_NOTES => store
            .children(ROOT_KEY)
            .into_iter()
            .filter(|r| r.is_note() && r.is_active())
            .collect(),
        _ => store
            .children(key)
            .into_iter()
            .filter(|r| include_deleted || r.is_active())
            .collect(),
    }
}

pub(crate) fn list_folders<H: Hierarchy + ?Sized>(store: &H) -> Vec<&Record> {
    store
        .all()
        .into_iter()
        .filter(|r| r.is_folder() && r.is_active())
        .collect()
}

/// Soft-deleted records whose `updated` is not older than `cutoff`
pub(crate) fn list_deleted<'a, H: Hierarchy + ?Sized>(
    store: &'a H,
    cutoff: &str,
) -> Vec<&'a Record> {
    store
        .all()
        .into_iter()
        .filter(|r| r.is_soft_deleted() && r.updated.as_str() >= cutoff)
        .collect()
}

/// Notes directly under `key` plus the cached counts of folders directly under it
pub(crate) fn count_by_parent<H: Hierarchy + ?Sized>(store: &H, key: &str) -> i64 {
    store
        .children(key)
        .into_iter()
        .filter(|r| r.is_active())
        .map(|r| if r.is_folder() { r.note_count } else { 1 })
        .sum()
}

/// Ids of the folder ancestors of `record`, nearest first
///
/// The walk stops at the root, at a missing parent or at a parent that is
/// not a folder.
pub(crate) fn folder_ancestors<H: Hierarchy + ?Sized>(
    store: &H,
    record: &Record,
) -> StoreResult<Vec<String>> {
    let mut ancestors = Vec::new();
    let mut visited = HashSet::new();
    let mut next = parent_of(record);

    while let Some(id) = next {
        let Some(ancestor) = store.record(id) else {
            break;
        };
        if !ancestor.is_folder() {
            break;
        }
        if !visited.insert(id) {
            return Err(StoreError::Cycle { id: id.to_string() });
        }
        ancestors.push(id.to_string());
        next = parent_of(ancestor);
    }

    Ok(ancestors)
}

/// Whether `id` is `root` or lies somewhere below it
///
/// Follows parent links from `id` upwards. A chain that already loops
/// without reaching `root` counts as outside.
pub(crate) fn is_in_subtree<H: Hierarchy + ?Sized>(store: &H, root: &str, id: &str) -> bool {
    let mut visited = HashSet::new();
    let mut next = Some(id);

    while let Some(current) = next {
        if current == root {
            return true;
        }
        if !visited.insert(current) {
            return false;
        }
        next = store.record(current).and_then(parent_of);
    }

    false
}

pub(crate) fn build_folder_tree<H: Hierarchy + ?Sized>(
    store: &H,
    key: &str,
) -> StoreResult<Vec<FolderNode>> {
    let folders: Vec<&Record> = list_folders(store);
    let mut visited = HashSet::new();

    store
        .children(key)
        .into_iter()
        .filter(|r| r.is_folder() && r.is_active())
        .map(|folder| attach_children(folder, &folders, &mut visited))
        .collect()
}

fn attach_children<'a>(
    folder: &'a Record,
    folders: &[&'a Record],
    visited: &mut HashSet<&'a str>,
) -> StoreResult<FolderNode> {
    if !visited.insert(folder.id.as_str()) {
        return Err(StoreError::Cycle {
            id: folder.id.clone(),
        });
    }

    let children = folders
        .iter()
        .filter(|child| child.parent_id.as_deref() == Some(folder.id.as_str()))
        .map(|child| attach_children(*child, folders, visited))
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(FolderNode {
        record: folder.clone(),
        children,
    })
}

/// Active notes under `key` containing `keyword`, then those of each active
/// subfolder, depth first
///
/// Hits found directly under `key` carry `label`; hits in a subfolder carry
/// that folder's title.
pub(crate) fn search_by_keyword<H: Hierarchy + ?Sized>(
    store: &H,
    key: &str,
    label: &str,
    keyword: &str,
) -> StoreResult<Vec<SearchHit>> {
    let mut hits = Vec::new();
    let mut visited = HashSet::new();
    search_into(store, key, label, keyword, &mut visited, &mut hits)?;
    Ok(hits)
}

fn search_into<'a, H: Hierarchy + ?Sized>(
    store: &'a H,
    key: &str,
    label: &str,
    keyword: &str,
    visited: &mut HashSet<&'a str>,
    hits: &mut Vec<SearchHit>,
) -> StoreResult<()> {
    let children = store.children(key);

    hits.extend(
        children
            .iter()
            .copied()
            .filter(|r| r.is_note() && r.is_active() && r.content.contains(keyword))
            .map(|r| SearchHit {
                record: r.clone(),
                folder_name: label.to_string(),
            }),
    );

    for folder in children.iter().copied().filter(|r| r.is_folder() && r.is_active()) {
        if !visited.insert(folder.id.as_str()) {
            return Err(StoreError::Cycle {
                id: folder.id.clone(),
            });
        }
        search_into(store, &folder.id, &folder.title, keyword, visited, hits)?;
    }

    Ok(())
}

fn parent_of(record: &Record) -> Option<&str> {
    record.parent_id.as_deref().filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plain list, scanned linearly
    struct Records(Vec<Record>);

    impl Hierarchy for Records {
        fn record(&self, id: &str) -> Option<&Record> {
            self.0.iter().find(|r| r.id == id)
        }

        fn children(&self, key: &str) -> Vec<&Record> {
            self.0.iter().filter(|r| r.parent_key() == key).collect()
        }

        fn all(&self) -> Vec<&Record> {
            self.0.iter().collect()
        }
    }

    fn folder(id: &str, parent: Option<&str>) -> Record {
        let record = Record::folder(format!("Folder {}", id)).with_id(id);
        match parent {
            Some(parent) => record.in_folder(parent),
            None => record,
        }
    }

    fn note(id: &str, parent: Option<&str>, content: &str) -> Record {
        let record = Record::note(format!("Note {}", id), content).with_id(id);
        match parent {
            Some(parent) => record.in_folder(parent),
            None => record,
        }
    }

    #[test]
    fn test_query_modes() {
        let mut trashed = note("n3", None, "");
        trashed.is_deleted = Some(1);
        let store = Records(vec![
            folder("f1", None),
            note("n1", None, ""),
            note("n2", Some("f1"), ""),
            trashed,
        ]);

        let ids = |records: Vec<&Record>| -> Vec<String> {
            records.into_iter().map(|r| r.id.clone()).collect()
        };
        assert_eq!(ids(query_by_parent(&store, ALL_NOTES, false)), ["n1", "n2"]);
        assert_eq!(ids(query_by_parent(&store, UNFILED_NOTES, false)), ["n1"]);
        assert_eq!(ids(query_by_parent(&store, ROOT_KEY, false)), ["f1", "n1"]);
        assert_eq!(
            ids(query_by_parent(&store, ROOT_KEY, true)),
            ["f1", "n1", "n3"]
        );
        assert!(query_by_parent(&store, "nowhere", true).is_empty());
    }

    #[test]
    fn test_count_uses_cached_folder_counts() {
        let mut inner = folder("f2", Some("f1"));
        inner.note_count = 5;
        let store = Records(vec![
            folder("f1", None),
            inner,
            note("n1", Some("f1"), ""),
        ]);
        assert_eq!(count_by_parent(&store, "f1"), 6);
    }

    #[test]
    fn test_ancestors_stop_at_missing_parent() {
        let store = Records(vec![folder("f1", Some("gone")), folder("f2", Some("f1"))]);
        let leaf = note("n1", Some("f2"), "");
        assert_eq!(folder_ancestors(&store, &leaf).unwrap(), ["f2", "f1"]);
    }

    #[test]
    fn test_ancestors_stop_at_non_folder() {
        let store = Records(vec![note("n0", None, "")]);
        let leaf = note("n1", Some("n0"), "");
        assert!(folder_ancestors(&store, &leaf).unwrap().is_empty());
    }

    #[test]
    fn test_ancestor_cycle_is_an_error() {
        let store = Records(vec![folder("a", Some("b")), folder("b", Some("a"))]);
        let leaf = note("n1", Some("a"), "");
        let err = folder_ancestors(&store, &leaf).unwrap_err();
        assert!(matches!(err, StoreError::Cycle { id } if id == "a"));
    }

    #[test]
    fn test_subtree_membership() {
        let store = Records(vec![
            folder("f1", None),
            folder("f2", Some("f1")),
            folder("f3", Some("f2")),
            folder("other", None),
        ]);

        assert!(is_in_subtree(&store, "f1", "f1"));
        assert!(is_in_subtree(&store, "f1", "f3"));
        assert!(!is_in_subtree(&store, "f3", "f1"));
        assert!(!is_in_subtree(&store, "f1", "other"));
        assert!(!is_in_subtree(&store, "f1", "unknown"));
    }

    #[test]
    fn test_subtree_check_survives_existing_cycle() {
        let store = Records(vec![folder("a", Some("b")), folder("b", Some("a"))]);
        assert!(is_in_subtree(&store, "b", "a"));
        assert!(!is_in_subtree(&store, "c", "a"));
    }

    #[test]
    fn test_folder_tree_nests_subfolders() {
        let mut deleted = folder("f4", Some("f1"));
        deleted.is_deleted = Some(1);
        let store = Records(vec![
            folder("f1", None),
            folder("f2", Some("f1")),
            folder("f3", Some("f2")),
            deleted,
            note("n1", Some("f1"), ""),
        ]);

        let tree = build_folder_tree(&store, ROOT_KEY).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].record.id, "f1");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].children[0].record.id, "f3");
        assert_eq!(tree[0].size(), 3);
    }

    #[test]
    fn test_folder_tree_cycle_is_an_error() {
        let store = Records(vec![folder("a", Some("b")), folder("b", Some("a"))]);
        assert!(matches!(
            build_folder_tree(&store, "a"),
            Err(StoreError::Cycle { .. })
        ));
    }

    #[test]
    fn test_search_labels_hits_by_folder() {
        let store = Records(vec![
            note("n1", None, "rust at the root"),
            folder("f1", None),
            note("n2", Some("f1"), "more rust"),
            folder("f2", Some("f1")),
            note("n3", Some("f2"), "rust deep down"),
            note("n4", Some("f2"), "Rust, capitalised"),
        ]);

        let hits = search_by_keyword(&store, ROOT_KEY, "All", "rust").unwrap();
        let found: Vec<(&str, &str)> = hits
            .iter()
            .map(|h| (h.record.id.as_str(), h.folder_name.as_str()))
            .collect();
        assert_eq!(
            found,
            [("n1", "All"), ("n2", "Folder f1"), ("n3", "Folder f2")]
        );
    }

    #[test]
    fn test_search_cycle_is_an_error() {
        let store = Records(vec![folder("a", Some("b")), folder("b", Some("a"))]);
        assert!(matches!(
            search_by_keyword(&store, "a", "A", "x"),
            Err(StoreError::Cycle { .. })
        ));
    }

    #[test]
    fn test_list_deleted_respects_cutoff() {
        let mut recent = note("n1", None, "");
        recent.is_deleted = Some(1);
        recent.updated = "2026-03-10 00:00:00.000Z".to_string();
        let mut stale = note("n2", None, "");
        stale.is_deleted = Some(1);
        stale.updated = "2026-01-01 00:00:00.000Z".to_string();
        let store = Records(vec![recent, stale, note("n3", None, "")]);

        let deleted = list_deleted(&store, "2026-02-15 00:00:00.000Z");
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, "n1");
    }
}
