//! Session context
//!
//! A `Session` owns everything one process needs: the configuration, the
//! main [`NoteStore`] and the registry of per-user stores. Consumers receive
//! the session (or a store borrowed from it) instead of reaching for globals.
//!
//! ## Lifecycle
//!
//! ```ignore
//! let mut session = Session::open(Config::load()?)?;
//! session.init().await;
//!
//! session.notes_mut().add(Record::note("Hello", ""));
//! let alice = session.user("alice").await?;
//!
//! session.dispose().await; // flush everything before exit
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::Record;
use crate::storage::{MemoryTable, PersistentTable, SqliteTable};
use crate::store::{
    MemoryTableProvider, NoteStore, SqliteTableProvider, StoreResult, TableProvider,
    UserNoteStore, UserStores,
};

/// Process-wide store context
pub struct Session {
    config: Config,
    notes: NoteStore,
    users: UserStores,
}

impl Session {
    /// Open a session backed by SQLite files under `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let path = config.notes_db_path();
        let table = SqliteTable::open(&path)
            .with_context(|| format!("Failed to open notes database: {:?}", path))?;
        let provider = SqliteTableProvider::new(config.clone());
        Ok(Self::with_tables(config, Arc::new(table), Arc::new(provider)))
    }

    /// Open a session that keeps nothing on disk
    pub fn in_memory(config: Config) -> Self {
        Self::with_tables(
            config,
            Arc::new(MemoryTable::<Record>::new()),
            Arc::new(MemoryTableProvider::new()),
        )
    }

    /// Build a session over caller-supplied storage
    pub fn with_tables(
        config: Config,
        notes_table: Arc<dyn PersistentTable<Record>>,
        provider: Arc<dyn TableProvider>,
    ) -> Self {
        let sync_config = config.sync_config();
        let notes = NoteStore::new(notes_table, sync_config)
            .with_retention_days(config.trash_retention_days);
        let users =
            UserStores::new(provider, sync_config).with_retention_days(config.trash_retention_days);
        Self {
            config,
            notes,
            users,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load the main store; returns whether it is loaded
    pub async fn init(&mut self) -> bool {
        let loaded = self.notes.load().await;
        if loaded {
            info!("Session ready with {} record(s)", self.notes.len());
        }
        loaded
    }

    pub fn notes(&self) -> &NoteStore {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut NoteStore {
        &mut self.notes
    }

    /// The store for `username`, created and loaded on first use
    pub async fn user(&mut self, username: &str) -> StoreResult<&mut UserNoteStore> {
        self.users.initialize(username).await
    }

    pub fn users(&self) -> &UserStores {
        &self.users
    }

    /// Stop background writers and flush every pending change
    ///
    /// Returns false if any store could not be written.
    pub async fn dispose(mut self) -> bool {
        self.notes.stop_watching();
        let mut ok = self.notes.manual_sync().await;
        ok &= self.users.flush_all().await;
        if !ok {
            warn!("Session closed with unwritten changes");
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordPatch;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        Config {
            data_dir: dir.path().to_path_buf(),
            debounce_ms: 10_000,
            trash_retention_days: 30,
        }
    }

    #[tokio::test]
    async fn test_dispose_flushes_pending_changes() {
        let temp_dir = TempDir::new().unwrap();

        let mut session = Session::open(config_in(&temp_dir)).unwrap();
        assert!(session.init().await);
        let note = session.notes_mut().add(Record::note("Kept", "body"));
        session
            .user("alice")
            .await
            .unwrap()
            .add(Record::note("Alice's", ""));
        assert!(session.dispose().await);

        let mut reopened = Session::open(config_in(&temp_dir)).unwrap();
        assert!(reopened.init().await);
        assert_eq!(reopened.notes().get(&note.id), Some(&note));
        assert_eq!(reopened.user("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let mut session = Session::in_memory(Config::default());
        assert!(session.init().await);
        session.notes_mut().add(Record::note("a", ""));
        assert!(session.init().await);
        assert_eq!(session.notes().len(), 1);
    }

    #[tokio::test]
    async fn test_retention_comes_from_config() {
        let config = Config {
            trash_retention_days: 1,
            ..Config::default()
        };
        let mut session = Session::in_memory(config);
        session.init().await;

        let note = session.notes_mut().add(Record::note("old", ""));
        session.notes_mut().update(
            &note.id,
            RecordPatch::new()
                .deleted(true)
                .updated(crate::timestamp::days_ago(2)),
        );
        assert!(session.notes().list_deleted().is_empty());
    }

    #[tokio::test]
    async fn test_user_stores_are_registered() {
        let mut session = Session::in_memory(Config::default());
        session.user("alice").await.unwrap();
        session.user("bob").await.unwrap();
        assert_eq!(session.users().usernames(), ["alice", "bob"]);
    }
}
