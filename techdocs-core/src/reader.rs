//! Reader provider.
//!
//! A `ReaderProvider` owns the single `DocsFetcher` for one entity and hands
//! out `ReaderContext` values to whatever displays the docs. Every context
//! shares the same fetcher, so subscribers see the same live status.
//!
//! Navigating within an entity goes through `set_path`. Showing a different
//! entity means building a new provider; dropping the old one tears its
//! fetcher down and discards anything still in flight, even while contexts
//! handed out by it are still alive.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::api::TechDocsStorageApi;
use crate::docs::{DocsFetcher, EntityDocs};
use crate::entity::EntityName;
use crate::sync::{SyncTracker, BUILDING_DELAY};

type ReadyCallback = Arc<dyn Fn() + Send + Sync>;

/// Owns the docs fetcher for one entity.
pub struct ReaderProvider {
    api: Arc<dyn TechDocsStorageApi>,
    docs: Arc<DocsFetcher>,
    on_ready: ReadyCallback,
}

impl ReaderProvider {
    /// Creates the provider and starts fetching `path`.
    pub fn new(
        api: Arc<dyn TechDocsStorageApi>,
        entity: EntityName,
        path: impl Into<String>,
    ) -> Self {
        let docs = Arc::new(DocsFetcher::new(Arc::clone(&api), entity, path));
        Self {
            api,
            docs,
            on_ready: Arc::new(|| {}),
        }
    }

    /// Sets the callback run when the display layer reports itself ready.
    pub fn on_ready(mut self, on_ready: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_ready = Arc::new(on_ready);
        self
    }

    pub fn entity(&self) -> &EntityName {
        self.docs.entity()
    }

    /// Navigates to another page of the same entity.
    pub fn set_path(&self, path: impl Into<String>) {
        self.docs.set_path(path);
    }

    pub fn context(&self) -> ReaderContext {
        ReaderContext {
            api: Arc::clone(&self.api),
            docs: Arc::clone(&self.docs),
            on_ready: Arc::clone(&self.on_ready),
        }
    }
}

impl Drop for ReaderProvider {
    fn drop(&mut self) {
        tracing::debug!(entity = %self.docs.entity(), "closing reader provider");
        self.docs.close();
    }
}

/// What a docs display needs from its provider.
///
/// A context outliving its provider keeps the last docs status it saw,
/// and `retry` on it does nothing.
#[derive(Clone)]
pub struct ReaderContext {
    api: Arc<dyn TechDocsStorageApi>,
    docs: Arc<DocsFetcher>,
    on_ready: ReadyCallback,
}

impl ReaderContext {
    pub fn entity(&self) -> &EntityName {
        self.docs.entity()
    }

    pub fn path(&self) -> String {
        self.docs.path()
    }

    /// Current docs status.
    pub fn entity_docs(&self) -> EntityDocs {
        self.docs.snapshot()
    }

    pub fn subscribe_docs(&self) -> watch::Receiver<EntityDocs> {
        self.docs.subscribe()
    }

    /// Re-fetches the current page.
    pub fn retry(&self) {
        self.docs.retry();
    }

    /// Reports that the display finished initializing.
    pub fn set_ready(&self) {
        (self.on_ready)();
    }

    /// Starts a sync tracker for this entity, reconciled against these docs.
    pub fn sync_tracker(&self) -> SyncTracker {
        self.sync_tracker_with_delay(BUILDING_DELAY)
    }

    pub fn sync_tracker_with_delay(&self, building_delay: std::time::Duration) -> SyncTracker {
        SyncTracker::start_with_delay(
            Arc::clone(&self.api),
            self.entity().clone(),
            self.subscribe_docs(),
            building_delay,
        )
    }
}

impl fmt::Debug for ReaderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderContext")
            .field("entity", self.entity())
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}
