//! Sync status state machine.
//!
//! The state is a pure fold over `SyncAction`s:
//!
//! ```text
//! CHECKING ──► BUILDING ──► BUILD_READY | UP_TO_DATE | ERROR
//!     │                          ▲
//!     └──────────────────────────┘  (fast path, BUILDING never shown)
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::error::SyncStateError;
use crate::api::{StorageApiError, SyncResult};

/// Status of the docs sync lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Asking the storage service whether cached docs are current
    Checking,
    /// Docs are being rebuilt
    Building,
    /// A rebuild finished and newer content is available
    BuildReady,
    /// Cached docs were already current
    UpToDate,
    /// The check or the build failed
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Checking => "CHECKING",
            SyncStatus::Building => "BUILDING",
            SyncStatus::BuildReady => "BUILD_READY",
            SyncStatus::UpToDate => "UP_TO_DATE",
            SyncStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Observable sync state.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub status: SyncStatus,
    /// Build log lines in the order they were reported
    pub log: Vec<String>,
    /// Set only while `status` is `Error`
    pub error: Option<Arc<StorageApiError>>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            status: SyncStatus::Checking,
            log: Vec::new(),
            error: None,
        }
    }
}

/// Transitions of the sync state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    /// A new check begins
    Checking,
    /// A build is running. `None` only forces the status.
    Building { line: Option<String> },
    /// The sync resolved with a raw result tag
    Success { result: String },
    /// The sync failed
    Error { error: Arc<StorageApiError> },
}

impl SyncAction {
    pub fn success(result: SyncResult) -> Self {
        SyncAction::Success {
            result: result.as_str().to_string(),
        }
    }
}

/// Applies `action` to `state`.
///
/// An unrecognized success tag is a contract violation of the storage
/// service: the state is left untouched and an error is returned instead of
/// moving to `SyncStatus::Error`.
pub fn reduce(state: &SyncState, action: SyncAction) -> Result<SyncState, SyncStateError> {
    let next = match action {
        SyncAction::Checking => SyncState {
            status: SyncStatus::Checking,
            log: Vec::new(),
            error: None,
        },
        SyncAction::Building { line } => {
            let mut log = state.log.clone();
            if let Some(line) = line.filter(|l| !l.is_empty()) {
                log.push(line);
            }
            SyncState {
                status: SyncStatus::Building,
                log,
                error: None,
            }
        }
        SyncAction::Success { result } => {
            let result: SyncResult = result
                .parse()
                .map_err(SyncStateError::UnexpectedResult)?;
            let status = match result {
                SyncResult::Cached => SyncStatus::UpToDate,
                SyncResult::Updated => SyncStatus::BuildReady,
            };
            SyncState {
                status,
                log: state.log.clone(),
                error: None,
            }
        }
        SyncAction::Error { error } => SyncState {
            status: SyncStatus::Error,
            log: state.log.clone(),
            error: Some(error),
        },
    };
    Ok(next)
}
