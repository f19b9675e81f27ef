//! Entity docs fetching.
//!
//! `DocsFetcher` reads built documentation content for one entity and keeps
//! a live `EntityDocs` status for subscribers. A fetch is started on
//! construction, whenever the path changes, and on explicit `retry()`.
//!
//! Every fetch is tagged with a generation. Completions from a fetch that
//! has since been superseded are discarded, and the superseded request is
//! cancelled. Closing or dropping the fetcher cancels any request still in
//! flight and turns later fetches into no-ops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::{StorageApiError, TechDocsStorageApi};
use crate::entity::EntityName;

/// Snapshot of an entity's docs fetch.
///
/// `loading` can be true while `value` still holds content from a previous
/// fetch. A failed fetch sets `error` but leaves `value` untouched.
#[derive(Debug, Clone, Default)]
pub struct EntityDocs {
    pub loading: bool,
    pub error: Option<Arc<StorageApiError>>,
    pub value: Option<Arc<String>>,
}

impl EntityDocs {
    /// Returns the fetched content, if any.
    pub fn content(&self) -> Option<&str> {
        self.value.as_deref().map(String::as_str)
    }
}

struct InFlight {
    path: String,
    cancel: CancellationToken,
}

struct Shared {
    api: Arc<dyn TechDocsStorageApi>,
    entity: EntityName,
    state: watch::Sender<EntityDocs>,
    generation: AtomicU64,
    in_flight: Mutex<InFlight>,
    shutdown: CancellationToken,
}

/// Fetches raw docs for one entity.
///
/// Must be created from within a Tokio runtime.
pub struct DocsFetcher {
    shared: Arc<Shared>,
}

impl DocsFetcher {
    /// Creates the fetcher and starts reading `path` immediately.
    pub fn new(
        api: Arc<dyn TechDocsStorageApi>,
        entity: EntityName,
        path: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(EntityDocs::default());
        let shutdown = CancellationToken::new();
        let path = path.into();

        let fetcher = Self {
            shared: Arc::new(Shared {
                api,
                entity,
                state,
                generation: AtomicU64::new(0),
                in_flight: Mutex::new(InFlight {
                    path: path.clone(),
                    cancel: shutdown.child_token(),
                }),
                shutdown,
            }),
        };
        fetcher.start(path);
        fetcher
    }

    pub fn entity(&self) -> &EntityName {
        &self.shared.entity
    }

    /// The path currently being shown.
    pub fn path(&self) -> String {
        self.lock_in_flight().path.clone()
    }

    /// Switches to a new path. Does nothing if the path is unchanged.
    pub fn set_path(&self, path: impl Into<String>) {
        let path = path.into();
        if self.lock_in_flight().path == path {
            return;
        }
        self.start(path);
    }

    /// Re-issues the fetch for the current path.
    pub fn retry(&self) {
        let path = self.path();
        self.start(path);
    }

    pub fn subscribe(&self) -> watch::Receiver<EntityDocs> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> EntityDocs {
        self.shared.state.borrow().clone()
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, InFlight> {
        self.shared
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops the fetcher for good.
    ///
    /// The request in flight is cancelled and its completion discarded.
    /// Later `set_path` and `retry` calls do nothing.
    pub fn close(&self) {
        let _in_flight = self.lock_in_flight();
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.shared.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    fn start(&self, path: String) {
        // Generation and token are swapped under one lock so the newest
        // generation always owns the live token.
        let (generation, cancel) = {
            let mut in_flight = self.lock_in_flight();
            if self.shared.shutdown.is_cancelled() {
                tracing::debug!(entity = %self.shared.entity, path = %path, "fetcher closed, not fetching");
                return;
            }
            let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
            let cancel = self.shared.shutdown.child_token();
            in_flight.cancel.cancel();
            in_flight.path = path.clone();
            in_flight.cancel = cancel.clone();
            (generation, cancel)
        };

        self.shared.state.send_modify(|docs| docs.loading = true);

        tracing::debug!(
            entity = %self.shared.entity,
            path = %path,
            generation,
            "fetching entity docs"
        );

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(generation, "docs fetch cancelled");
                    return;
                }
                result = shared.api.get_entity_docs(&shared.entity, &path) => result,
            };

            shared.state.send_if_modified(|docs| {
                if shared.generation.load(Ordering::Acquire) != generation
                    || shared.shutdown.is_cancelled()
                {
                    tracing::debug!(generation, "discarding stale docs fetch");
                    return false;
                }
                docs.loading = false;
                match result {
                    Ok(content) => {
                        docs.value = Some(Arc::new(content));
                        docs.error = None;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, path = %path, "docs fetch failed");
                        docs.error = Some(Arc::new(e));
                    }
                }
                true
            });
        });
    }
}

impl Drop for DocsFetcher {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::testing::{entity, FakeApi};

    async fn settled(rx: &mut watch::Receiver<EntityDocs>) -> EntityDocs {
        rx.wait_for(|docs| !docs.loading).await.unwrap().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_success() {
        let api = Arc::new(FakeApi::new().with_docs("", 100, Ok("<h1>root</h1>")));
        let fetcher = DocsFetcher::new(api.clone(), entity("checkout"), "");

        assert!(fetcher.snapshot().loading);

        let docs = settled(&mut fetcher.subscribe()).await;
        assert_eq!(docs.content(), Some("<h1>root</h1>"));
        assert!(docs.error.is_none());
        assert_eq!(api.doc_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error() {
        let api = Arc::new(FakeApi::new());
        let fetcher = DocsFetcher::new(api, entity("checkout"), "missing");

        let docs = settled(&mut fetcher.subscribe()).await;
        assert!(docs.value.is_none());
        assert_eq!(
            docs.error.as_deref(),
            Some(&StorageApiError::NotFound("missing".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_keeps_stale_value_while_loading_and_on_error() {
        let api = Arc::new(FakeApi::new().with_docs("", 10, Ok("v1")));
        let fetcher = DocsFetcher::new(api.clone(), entity("checkout"), "");
        let mut rx = fetcher.subscribe();
        settled(&mut rx).await;

        api.set_docs("", 10, Err(StorageApiError::Unavailable("down".to_string())));
        fetcher.retry();

        let during = fetcher.snapshot();
        assert!(during.loading);
        assert_eq!(during.content(), Some("v1"));

        let docs = settled(&mut rx).await;
        assert_eq!(docs.content(), Some("v1"));
        assert!(docs.error.is_some());
        assert_eq!(api.doc_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_clears_previous_error() {
        let api = Arc::new(
            FakeApi::new().with_docs("", 10, Err(StorageApiError::Other("boom".to_string()))),
        );
        let fetcher = DocsFetcher::new(api.clone(), entity("checkout"), "");
        let mut rx = fetcher.subscribe();
        assert!(settled(&mut rx).await.error.is_some());

        api.set_docs("", 10, Ok("fixed"));
        fetcher.retry();

        let docs = settled(&mut rx).await;
        assert!(docs.error.is_none());
        assert_eq!(docs.content(), Some("fixed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_path_change_discards_stale_completion() {
        let api = Arc::new(
            FakeApi::new()
                .with_docs("slow", 500, Ok("slow page"))
                .with_docs("fast", 50, Ok("fast page")),
        );
        let fetcher = DocsFetcher::new(api.clone(), entity("checkout"), "slow");
        fetcher.set_path("fast");

        sleep(Duration::from_millis(1000)).await;

        let docs = fetcher.snapshot();
        assert!(!docs.loading);
        assert_eq!(docs.content(), Some("fast page"));
        assert_eq!(fetcher.path(), "fast");
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_path_does_not_refetch() {
        let api = Arc::new(FakeApi::new().with_docs("guide", 10, Ok("guide")));
        let fetcher = DocsFetcher::new(api.clone(), entity("checkout"), "guide");
        fetcher.set_path("guide");

        settled(&mut fetcher.subscribe()).await;
        assert_eq!(api.doc_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_in_flight_fetch() {
        let api = Arc::new(FakeApi::new().with_docs("", 500, Ok("late")));
        let fetcher = DocsFetcher::new(api, entity("checkout"), "");
        let mut rx = fetcher.subscribe();
        drop(fetcher);

        sleep(Duration::from_millis(1000)).await;

        // Sender is gone and the late completion never landed.
        assert!(rx.changed().await.is_err());
        assert!(rx.borrow().value.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_discards_in_flight_and_ignores_later_fetches() {
        let api = Arc::new(FakeApi::new().with_docs("", 500, Ok("late page")));
        let fetcher = DocsFetcher::new(api.clone(), entity("checkout"), "");
        fetcher.close();
        assert!(fetcher.is_closed());

        sleep(Duration::from_millis(1000)).await;
        assert!(fetcher.snapshot().value.is_none());

        fetcher.retry();
        fetcher.set_path("guide");
        sleep(Duration::from_millis(1000)).await;

        assert_eq!(api.doc_calls(), 1);
        assert!(fetcher.snapshot().value.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_retries_settle() {
        let api = Arc::new(FakeApi::new().with_docs("", 0, Ok("home")));
        let fetcher = Arc::new(DocsFetcher::new(api, entity("checkout"), ""));

        for _ in 0..50 {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let fetcher = Arc::clone(&fetcher);
                    tokio::spawn(async move { fetcher.retry() })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap();
            }

            let mut rx = fetcher.subscribe();
            let docs = tokio::time::timeout(Duration::from_secs(5), settled(&mut rx))
                .await
                .expect("fetch never settled");
            assert_eq!(docs.content(), Some("home"));
        }
    }
}
