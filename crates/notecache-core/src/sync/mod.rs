//! Sync layer
//!
//! Keeps a persistent table in step with the in-memory store without the
//! store ever waiting on storage.
//!
//! ## Flow
//!
//! 1. On load, [`SyncEngine::hydrate`] reads the table once, ordered
//! 2. Every store mutation pushes a [`Change`] onto the [`ChangeQueue`]
//! 3. The watcher waits for the queue to go quiet, then writes the delta
//! 4. Progress and failures are published as [`SyncStatus`]

mod engine;
mod queue;
mod status;

pub use engine::{SyncConfig, SyncEngine, DEFAULT_DEBOUNCE};
pub use queue::{Change, ChangeQueue};
pub use status::SyncStatus;
