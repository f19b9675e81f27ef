//! Scripted storage API used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, sleep_until, Instant};

use crate::api::{LogSink, StorageApiError, TechDocsStorageApi};
use crate::entity::EntityName;

#[derive(Clone)]
struct DocsAnswer {
    delay: Duration,
    result: Result<String, StorageApiError>,
}

/// Timeline of one sync run, relative to the moment it was invoked.
#[derive(Clone)]
pub(crate) struct SyncScript {
    pub lines: Vec<(u64, String)>,
    pub delay_ms: u64,
    pub outcome: Result<String, StorageApiError>,
}

impl SyncScript {
    pub fn resolves(delay_ms: u64, tag: &str) -> Self {
        Self {
            lines: Vec::new(),
            delay_ms,
            outcome: Ok(tag.to_string()),
        }
    }

    pub fn fails(delay_ms: u64, error: StorageApiError) -> Self {
        Self {
            lines: Vec::new(),
            delay_ms,
            outcome: Err(error),
        }
    }

    pub fn line(mut self, at_ms: u64, line: &str) -> Self {
        self.lines.push((at_ms, line.to_string()));
        self
    }
}

pub(crate) struct FakeApi {
    docs: Mutex<HashMap<String, DocsAnswer>>,
    sync: Mutex<HashMap<String, SyncScript>>,
    pub doc_calls: AtomicUsize,
    pub sync_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            sync: Mutex::new(HashMap::new()),
            doc_calls: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_docs(self, path: &str, delay_ms: u64, result: Result<&str, StorageApiError>) -> Self {
        self.set_docs(path, delay_ms, result);
        self
    }

    pub fn set_docs(&self, path: &str, delay_ms: u64, result: Result<&str, StorageApiError>) {
        self.docs.lock().unwrap().insert(
            path.to_string(),
            DocsAnswer {
                delay: Duration::from_millis(delay_ms),
                result: result.map(str::to_string),
            },
        );
    }

    /// Script the sync for an entity name (the `name` part only).
    pub fn with_sync(self, name: &str, script: SyncScript) -> Self {
        self.sync.lock().unwrap().insert(name.to_string(), script);
        self
    }

    pub fn doc_calls(&self) -> usize {
        self.doc_calls.load(Ordering::SeqCst)
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TechDocsStorageApi for FakeApi {
    async fn get_entity_docs(
        &self,
        _entity: &EntityName,
        path: &str,
    ) -> Result<String, StorageApiError> {
        self.doc_calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.docs.lock().unwrap().get(path).cloned();
        match answer {
            Some(answer) => {
                sleep(answer.delay).await;
                answer.result
            }
            None => Err(StorageApiError::NotFound(path.to_string())),
        }
    }

    async fn sync_entity_docs(
        &self,
        entity: &EntityName,
        log: LogSink,
    ) -> Result<String, StorageApiError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.sync.lock().unwrap().get(entity.name()).cloned();
        let script = match script {
            Some(script) => script,
            None => return Err(StorageApiError::NotFound(entity.to_string())),
        };

        let start = Instant::now();
        for (at_ms, line) in script.lines {
            sleep_until(start + Duration::from_millis(at_ms)).await;
            log.line(line);
        }
        sleep_until(start + Duration::from_millis(script.delay_ms)).await;
        script.outcome
    }
}

pub(crate) fn entity(name: &str) -> EntityName {
    EntityName::new("default", "component", name).unwrap()
}
