//! Store error handling

use thiserror::Error;

use crate::storage::StorageError;

/// Errors returned by store operations
///
/// Load and flush failures are not reported here; they are logged and
/// surfaced through [`SyncStatus`](crate::sync::SyncStatus).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The parent chain loops back on itself
    #[error("Folder hierarchy contains a cycle at '{id}'")]
    Cycle { id: String },

    /// Opening a table for a store failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type StoreResult<T> = Result<T, StoreError>;
