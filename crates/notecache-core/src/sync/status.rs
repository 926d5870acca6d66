//! Observable engine status

use serde::Serialize;

/// State of the most recent load or flush
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// A read or write is in flight
    pub is_loading: bool,
    /// Message of the last failure, cleared when the next operation starts
    pub error: Option<String>,
    /// Timestamp of the last successful load, flush or clear
    pub last_sync_time: Option<String>,
}

impl SyncStatus {
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}
