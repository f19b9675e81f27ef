//! Replay storage backend.
//!
//! Answers docs reads and syncs from a YAML script instead of a live storage
//! service, with the timings the script asks for. Useful to see how a reader
//! reacts to a slow build, a cache hit or a failing build.
//!
//! ```yaml
//! docs:
//!   - path: ""
//!     delay_ms: 150
//!     content: "<h1>Checkout</h1>"
//!   - path: "runbook"
//!     error: "bucket unreachable"
//! sync:
//!   delay_ms: 2000
//!   lines:
//!     - at_ms: 1200
//!       line: "Building site"
//!   result: updated
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{sleep, sleep_until, Instant};

use techdocs_core::{EntityName, LogSink, StorageApiError, SyncResult, TechDocsStorageApi};

/// One docs page the script can serve.
#[derive(Debug, Clone, Deserialize)]
pub struct DocsEntry {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub delay_ms: u64,
    pub content: Option<String>,
    pub error: Option<String>,
}

/// A build log line and when it is reported.
#[derive(Debug, Clone, Deserialize)]
pub struct LineEntry {
    pub at_ms: u64,
    pub line: String,
}

/// How the sync behaves.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncEntry {
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub lines: Vec<LineEntry>,
    /// Raw result tag, passed through unchecked
    pub result: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub docs: Vec<DocsEntry>,
    pub sync: SyncEntry,
}

impl ReplayScript {
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ReplayError::ReadError(path.to_path_buf(), e))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ReplayError> {
        let script: Self = serde_yaml::from_str(contents).map_err(ReplayError::ParseError)?;
        script.validate()?;
        Ok(script)
    }

    /// Checks the script is playable.
    ///
    /// The sync result tag is deliberately not checked here so a script can
    /// reproduce a storage service answering with an unknown tag.
    pub fn validate(&self) -> Result<(), ReplayError> {
        let mut seen = HashSet::new();
        for entry in &self.docs {
            if !seen.insert(entry.path.as_str()) {
                return Err(ReplayError::Invalid(format!(
                    "docs path '{}' is listed twice",
                    entry.path
                )));
            }
            if entry.content.is_some() == entry.error.is_some() {
                return Err(ReplayError::Invalid(format!(
                    "docs path '{}' needs exactly one of content or error",
                    entry.path
                )));
            }
        }

        if self.sync.result.is_some() == self.sync.error.is_some() {
            return Err(ReplayError::Invalid(
                "sync needs exactly one of result or error".to_string(),
            ));
        }

        let mut last = 0;
        for line in &self.sync.lines {
            if line.at_ms < last {
                return Err(ReplayError::Invalid(format!(
                    "sync line '{}' at {}ms is out of order",
                    line.line, line.at_ms
                )));
            }
            if line.at_ms > self.sync.delay_ms {
                return Err(ReplayError::Invalid(format!(
                    "sync line '{}' at {}ms comes after the sync ends at {}ms",
                    line.line, line.at_ms, self.sync.delay_ms
                )));
            }
            last = line.at_ms;
        }

        Ok(())
    }

    /// The sync result, if the script's tag is one the reader understands.
    pub fn sync_result(&self) -> Option<SyncResult> {
        self.sync.result.as_deref().and_then(|r| r.parse().ok())
    }
}

/// Storage backend playing back a `ReplayScript`.
#[derive(Debug, Clone)]
pub struct ReplayStorage {
    script: ReplayScript,
}

impl ReplayStorage {
    pub fn new(script: ReplayScript) -> Self {
        Self { script }
    }
}

#[async_trait]
impl TechDocsStorageApi for ReplayStorage {
    async fn get_entity_docs(
        &self,
        entity: &EntityName,
        path: &str,
    ) -> Result<String, StorageApiError> {
        let entry = self
            .script
            .docs
            .iter()
            .find(|entry| entry.path == path)
            .ok_or_else(|| {
                StorageApiError::NotFound(format!("{}/{}", entity.storage_path(), path))
            })?;

        tracing::debug!(entity = %entity, path, delay_ms = entry.delay_ms, "replaying docs read");
        sleep(Duration::from_millis(entry.delay_ms)).await;

        match (&entry.content, &entry.error) {
            (Some(content), _) => Ok(content.clone()),
            (None, Some(error)) => Err(StorageApiError::Unavailable(error.clone())),
            (None, None) => Err(StorageApiError::NotFound(path.to_string())),
        }
    }

    async fn sync_entity_docs(
        &self,
        entity: &EntityName,
        log: LogSink,
    ) -> Result<String, StorageApiError> {
        tracing::debug!(entity = %entity, "replaying docs sync");
        let start = Instant::now();

        for line in &self.script.sync.lines {
            if log.is_closed() {
                tracing::debug!(entity = %entity, "log receiver gone, dropping remaining lines");
                break;
            }
            sleep_until(start + Duration::from_millis(line.at_ms)).await;
            log.line(line.line.clone());
        }
        sleep_until(start + Duration::from_millis(self.script.sync.delay_ms)).await;

        match (&self.script.sync.result, &self.script.sync.error) {
            (Some(result), _) => Ok(result.clone()),
            (None, Some(error)) => Err(StorageApiError::BuildFailed(error.clone())),
            (None, None) => Err(StorageApiError::Other("sync has no outcome".to_string())),
        }
    }
}

#[derive(Debug)]
pub enum ReplayError {
    ReadError(PathBuf, std::io::Error),
    ParseError(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::ReadError(path, e) => {
                write!(f, "Failed to read replay script '{}': {}", path.display(), e)
            }
            ReplayError::ParseError(e) => write!(f, "Failed to parse replay script: {}", e),
            ReplayError::Invalid(e) => write!(f, "Invalid replay script: {}", e),
        }
    }
}

impl std::error::Error for ReplayError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const SCRIPT: &str = r#"
docs:
  - path: ""
    delay_ms: 100
    content: "<h1>Checkout</h1>"
  - path: runbook
    error: bucket unreachable
sync:
  delay_ms: 2000
  lines:
    - at_ms: 1200
      line: step1
    - at_ms: 1500
      line: step2
  result: updated
"#;

    fn entity() -> EntityName {
        EntityName::new("default", "component", "checkout").unwrap()
    }

    #[test]
    fn test_parse_script() {
        let script = ReplayScript::from_yaml(SCRIPT).unwrap();
        assert_eq!(script.docs.len(), 2);
        assert_eq!(script.docs[0].path, "");
        assert_eq!(script.sync.lines.len(), 2);
        assert_eq!(script.sync_result(), Some(SyncResult::Updated));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("replay.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", SCRIPT).unwrap();

        let script = ReplayScript::load(&path).unwrap();
        assert_eq!(script.sync.delay_ms, 2000);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = tempdir().unwrap();
        let result = ReplayScript::load(&temp_dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(ReplayError::ReadError(_, _))));
    }

    #[test]
    fn test_unknown_result_tag_is_allowed() {
        let script = ReplayScript::from_yaml("sync:\n  result: rebuilt\n").unwrap();
        assert_eq!(script.sync.result.as_deref(), Some("rebuilt"));
        assert_eq!(script.sync_result(), None);
    }

    #[test]
    fn test_invalid_scripts() {
        let cases = [
            "sync: {}\n",
            "sync:\n  result: cached\n  error: boom\n",
            "docs:\n  - path: a\nsync:\n  result: cached\n",
            "docs:\n  - content: x\n  - content: y\nsync:\n  result: cached\n",
            "sync:\n  delay_ms: 100\n  lines:\n    - at_ms: 200\n      line: late\n  result: cached\n",
            "sync:\n  delay_ms: 500\n  lines:\n    - at_ms: 200\n      line: b\n    - at_ms: 100\n      line: a\n  result: cached\n",
        ];
        for case in cases {
            let result = ReplayScript::from_yaml(case);
            assert!(
                matches!(result, Err(ReplayError::Invalid(_))),
                "expected invalid for {:?}, got {:?}",
                case,
                result
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_docs() {
        let storage = ReplayStorage::new(ReplayScript::from_yaml(SCRIPT).unwrap());

        let content = storage.get_entity_docs(&entity(), "").await.unwrap();
        assert_eq!(content, "<h1>Checkout</h1>");

        let error = storage.get_entity_docs(&entity(), "runbook").await.unwrap_err();
        assert_eq!(
            error,
            StorageApiError::Unavailable("bucket unreachable".to_string())
        );

        let error = storage.get_entity_docs(&entity(), "nope").await.unwrap_err();
        assert_eq!(
            error,
            StorageApiError::NotFound("default/component/checkout/nope".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_sync_timeline() {
        let storage = ReplayStorage::new(ReplayScript::from_yaml(SCRIPT).unwrap());
        let (sink, mut lines) = LogSink::channel();

        let start = Instant::now();
        let result = storage.sync_entity_docs(&entity(), sink).await.unwrap();

        assert_eq!(result, "updated");
        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert_eq!(lines.recv().await.as_deref(), Some("step1"));
        assert_eq!(lines.recv().await.as_deref(), Some("step2"));
        assert_eq!(lines.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_sync_failure() {
        let script = ReplayScript::from_yaml("sync:\n  delay_ms: 500\n  error: mkdocs failed\n")
            .unwrap();
        let storage = ReplayStorage::new(script);
        let (sink, _lines) = LogSink::channel();

        let error = storage.sync_entity_docs(&entity(), sink).await.unwrap_err();
        assert_eq!(error, StorageApiError::BuildFailed("mkdocs failed".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_outcome_survives_closed_log() {
        let storage = ReplayStorage::new(ReplayScript::from_yaml(SCRIPT).unwrap());
        let (sink, lines) = LogSink::channel();
        drop(lines);

        let start = Instant::now();
        let result = storage.sync_entity_docs(&entity(), sink).await.unwrap();

        assert_eq!(result, "updated");
        assert!(start.elapsed() >= Duration::from_millis(2000));
    }
}
