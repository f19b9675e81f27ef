//! Sync error types.

use thiserror::Error;

/// Rejections raised by the sync reducer.
///
/// These signal a misbehaving storage service, not a failed build. Build
/// failures travel through `SyncStatus::Error` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncStateError {
    #[error("Unexpected sync result: {0:?}")]
    UnexpectedResult(String),
}

/// Errors reported by a running tracker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Sync contract violated: {0}")]
    Contract(#[from] SyncStateError),

    #[error("Sync tracker was shut down")]
    Closed,
}
