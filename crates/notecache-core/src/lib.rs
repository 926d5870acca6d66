//! notecache core library
//!
//! Local store and sync engine for a notes application: an in-memory
//! collection of notes and folders, indexed by id and by parent, mirrored to
//! SQLite with debounced, diff-based writes.
//!
//! # Architecture
//!
//! - **Memory is authoritative**: every read is served from the store
//! - **SQLite is a mirror**: written by the sync engine, read on load and
//!   for persisted-store search
//!
//! # Quick Start
//!
//! ```text
//! let mut session = Session::open(Config::load()?)?;
//! session.init().await;
//!
//! let store = session.notes_mut();
//! let folder = store.add(Record::folder("Work"));
//! let note = store.add(Record::note("Plan", "ship it").in_folder(&folder.id));
//! store.propagate_count_up_to_root(&note)?;
//!
//! session.dispose().await;
//! ```
//!
//! # Modules
//!
//! - `session`: Context object owning all stores (main entry point)
//! - `store`: Indexed note store and per-user stores
//! - `sync`: Change queue and debounced write-back engine
//! - `storage`: Persistent table trait, SQLite and in-memory tables
//! - `models`: Records, patches, folder trees, search hits
//! - `timestamp`: Sortable timestamp strings
//! - `config`: Application configuration

pub mod config;
pub mod models;
pub mod session;
pub mod storage;
pub mod store;
pub mod sync;
pub mod timestamp;

pub use config::Config;
pub use models::{
    FolderNode, ItemType, Record, RecordPatch, SearchHit, ALL_NOTES, ROOT_KEY, UNFILED_NOTES,
};
pub use session::Session;
pub use storage::{MemoryTable, PersistentTable, SqliteTable, StorageError};
pub use store::{ListenerId, NoteStore, StoreError, StoreResult, UserNoteStore, UserStores};
pub use sync::{Change, SyncConfig, SyncEngine, SyncStatus};
