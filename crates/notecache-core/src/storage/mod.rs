//! Storage layer
//!
//! Persistent tables that mirror the in-memory store.
//!
//! ## Architecture
//!
//! - **`PersistentTable`**: the contract the sync engine writes through
//! - **SQLite**: one database file per collection, used by sessions on disk
//! - **Memory**: ephemeral collections and tests
//!
//! The in-memory store stays authoritative; tables are only read on load and
//! for persisted-store search.

pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod table;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryTable;
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::SqliteTable;
pub use table::{PersistentTable, Predicate, Syncable};
