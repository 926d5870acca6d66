//! Store selection
//!
//! Commands run against either the main store or one user's store
//! (`--user`). `Scope` forwards each operation to whichever was selected.

use anyhow::{bail, Result};

use notecache_core::{
    FolderNode, NoteStore, Record, RecordPatch, SearchHit, StoreResult, SyncStatus, UserNoteStore,
};

/// The store a command operates on
pub enum Scope<'a> {
    Main(&'a mut NoteStore),
    User(&'a mut UserNoteStore),
}

impl Scope<'_> {
    /// Name shown in status output
    pub fn label(&self) -> String {
        match self {
            Scope::Main(_) => "main".to_string(),
            Scope::User(store) => format!("user '{}'", store.username()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Scope::Main(store) => store.len(),
            Scope::User(store) => store.len(),
        }
    }

    pub fn records(&self) -> Vec<&Record> {
        match self {
            Scope::Main(store) => store.records().collect(),
            Scope::User(store) => store.records().collect(),
        }
    }

    pub fn add(&mut self, record: Record) -> Record {
        match self {
            Scope::Main(store) => store.add(record),
            Scope::User(store) => store.add(record),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        match self {
            Scope::Main(store) => store.get(id),
            Scope::User(store) => store.get(id),
        }
    }

    pub fn update(&mut self, id: &str, patch: RecordPatch) -> Option<Record> {
        match self {
            Scope::Main(store) => store.update(id, patch),
            Scope::User(store) => store.update(id, patch),
        }
    }

    pub fn delete(&mut self, id: &str) -> Option<Record> {
        match self {
            Scope::Main(store) => store.delete(id),
            Scope::User(store) => store.delete(id),
        }
    }

    pub fn soft_delete(&mut self, id: &str) -> Option<Record> {
        match self {
            Scope::Main(store) => store.soft_delete(id),
            Scope::User(store) => store.soft_delete(id),
        }
    }

    pub fn restore(&mut self, id: &str) -> Option<Record> {
        match self {
            Scope::Main(store) => store.restore(id),
            Scope::User(store) => store.restore(id),
        }
    }

    pub fn query_by_parent(&self, key: &str, include_deleted: bool) -> Vec<&Record> {
        match self {
            Scope::Main(store) => store.query_by_parent(key, include_deleted),
            Scope::User(store) => store.query_by_parent(key, include_deleted),
        }
    }

    pub fn list_folders(&self) -> Vec<&Record> {
        match self {
            Scope::Main(store) => store.list_folders(),
            Scope::User(store) => store.list_folders(),
        }
    }

    pub fn list_deleted(&self) -> Vec<&Record> {
        match self {
            Scope::Main(store) => store.list_deleted(),
            Scope::User(store) => store.list_deleted(),
        }
    }

    pub fn count_by_parent(&self, key: &str) -> i64 {
        match self {
            Scope::Main(store) => store.count_by_parent(key),
            Scope::User(store) => store.count_by_parent(key),
        }
    }

    pub fn propagate_count_up_to_root(&mut self, record: &Record) -> StoreResult<()> {
        match self {
            Scope::Main(store) => store.propagate_count_up_to_root(record),
            Scope::User(store) => store.propagate_count_up_to_root(record),
        }
    }

    pub fn is_in_subtree(&self, root: &str, id: &str) -> bool {
        match self {
            Scope::Main(store) => store.is_in_subtree(root, id),
            Scope::User(store) => store.is_in_subtree(root, id),
        }
    }

    pub fn build_folder_tree(&self, key: &str) -> StoreResult<Vec<FolderNode>> {
        match self {
            Scope::Main(store) => store.build_folder_tree(key),
            Scope::User(store) => store.build_folder_tree(key),
        }
    }

    pub fn search_by_keyword(
        &self,
        key: &str,
        label: &str,
        keyword: &str,
    ) -> StoreResult<Vec<SearchHit>> {
        match self {
            Scope::Main(store) => store.search_by_keyword(key, label, keyword),
            Scope::User(store) => store.search_by_keyword(key, label, keyword),
        }
    }

    pub async fn search_in_persisted_store(&self, keyword: &str) -> Vec<Record> {
        match self {
            Scope::Main(store) => store.search_in_persisted_store(keyword).await,
            Scope::User(store) => store.search_in_persisted_store(keyword).await,
        }
    }

    pub fn sync_status(&self) -> SyncStatus {
        match self {
            Scope::Main(store) => store.sync_status(),
            Scope::User(store) => store.sync_status(),
        }
    }

    pub fn pending_changes(&self) -> usize {
        match self {
            Scope::Main(store) => store.pending_changes(),
            Scope::User(store) => store.pending_changes(),
        }
    }

    /// Resolve a full id or a unique id prefix
    pub fn resolve_id(&self, id: &str) -> Result<String> {
        if self.get(id).is_some() {
            return Ok(id.to_string());
        }

        let records = self.records();
        let matches: Vec<&&Record> = records.iter().filter(|r| r.id.starts_with(id)).collect();

        match matches.len() {
            0 => bail!("No record found matching: {}", id),
            1 => Ok(matches[0].id.clone()),
            _ => {
                eprintln!("Multiple records match '{}':", id);
                for record in &matches {
                    eprintln!("  {} - {}", record.id, record.title);
                }
                bail!("Ambiguous ID. Please provide more characters.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notecache_core::{MemoryTable, PersistentTable, SyncConfig};
    use std::sync::Arc;

    fn store() -> NoteStore {
        let table: Arc<dyn PersistentTable<Record>> = Arc::new(MemoryTable::<Record>::new());
        NoteStore::new(table, SyncConfig::default())
    }

    #[test]
    fn test_resolve_id_by_prefix() {
        let mut notes = store();
        let mut scope = Scope::Main(&mut notes);
        scope.add(Record::note("one", "").with_id("abc123"));
        scope.add(Record::note("two", "").with_id("abd456"));

        assert_eq!(scope.resolve_id("abc123").unwrap(), "abc123");
        assert_eq!(scope.resolve_id("abd").unwrap(), "abd456");
        assert!(scope.resolve_id("ab").is_err());
        assert!(scope.resolve_id("zz").is_err());
    }

    #[test]
    fn test_user_scope_forwards() {
        let table: Arc<dyn PersistentTable<Record>> = Arc::new(MemoryTable::<Record>::new());
        let mut user = UserNoteStore::new("dana", table, SyncConfig::default());
        let mut scope = Scope::User(&mut user);

        let folder = scope.add(Record::folder("Inbox"));
        scope.add(Record::note("n", "").in_folder(&folder.id));

        assert_eq!(scope.label(), "user 'dana'");
        assert_eq!(scope.count_by_parent(&folder.id), 1);
        assert_eq!(scope.len(), 2);
    }
}
