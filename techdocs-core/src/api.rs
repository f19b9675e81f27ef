//! Storage API seam.
//!
//! The reader consumes the docs storage service through two operations:
//! reading built content for a path, and syncing (check cache, rebuild if
//! stale) an entity's docs while streaming build log lines.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::entity::EntityName;

/// Errors reported by the storage service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageApiError {
    #[error("Documentation not found: {0}")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Documentation build failed: {0}")]
    BuildFailed(String),

    #[error("{0}")]
    Other(String),
}

/// Outcome tag of a successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResult {
    /// Cached content was already current
    Cached,
    /// Content was rebuilt and should be re-fetched
    Updated,
}

impl SyncResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncResult::Cached => "cached",
            SyncResult::Updated => "updated",
        }
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cached" => Ok(SyncResult::Cached),
            "updated" => Ok(SyncResult::Updated),
            other => Err(other.to_string()),
        }
    }
}

/// Handle a sync operation uses to report build log lines.
///
/// Lines are queued in call order. Once the receiving run has been
/// superseded or torn down, further lines are dropped.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<String>,
}

impl LogSink {
    /// Creates a sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Reports one build log line.
    pub fn line(&self, line: impl Into<String>) {
        let _ = self.tx.send(line.into());
    }

    /// Returns true once nobody is listening anymore.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The docs storage service.
#[async_trait]
pub trait TechDocsStorageApi: Send + Sync {
    /// Reads built documentation content for `path` (empty means root).
    async fn get_entity_docs(
        &self,
        entity: &EntityName,
        path: &str,
    ) -> Result<String, StorageApiError>;

    /// Checks the docs cache for `entity`, rebuilding when stale.
    ///
    /// Returns the raw result tag (`"cached"` or `"updated"`). Anything else
    /// is a contract violation of the service.
    async fn sync_entity_docs(
        &self,
        entity: &EntityName,
        log: LogSink,
    ) -> Result<String, StorageApiError>;
}
