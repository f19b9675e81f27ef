//! Sync driver.
//!
//! One spawned task per run. All transitions of a run are dispatched from
//! that task, in order, through the generation-checked store below. A run is
//! superseded by bumping the generation, which makes every later dispatch
//! of the old run a no-op before its task is aborted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::error::{SyncStateError, TrackerError};
use super::state::{reduce, SyncAction, SyncState, SyncStatus};
use crate::api::{LogSink, SyncResult, TechDocsStorageApi};
use crate::docs::EntityDocs;
use crate::entity::EntityName;

/// How long a sync may run before `BUILDING` is shown without a log line.
pub const BUILDING_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
struct RunOutcome {
    generation: u64,
    settled: Option<Result<SyncState, TrackerError>>,
}

struct Shared {
    api: Arc<dyn TechDocsStorageApi>,
    state: watch::Sender<SyncState>,
    outcome: watch::Sender<RunOutcome>,
    generation: AtomicU64,
    building_delay: Duration,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Applies `action` unless the run it belongs to was superseded.
    fn dispatch(&self, generation: u64, action: SyncAction) -> Result<(), SyncStateError> {
        let mut rejected = None;
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            match reduce(state, action) {
                Ok(next) => {
                    let changed = *state != next;
                    *state = next;
                    changed
                }
                Err(e) => {
                    rejected = Some(e);
                    false
                }
            }
        });
        match rejected {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Downgrades `BUILD_READY` while the docs content is still loading.
    fn reconcile(
        &self,
        generation: u64,
        docs: &watch::Receiver<EntityDocs>,
    ) -> Result<(), SyncStateError> {
        let loading = docs.borrow().loading;
        if loading && self.state.borrow().status == SyncStatus::BuildReady {
            tracing::debug!(generation, "docs still loading, treating build as cached");
            self.dispatch(generation, SyncAction::success(SyncResult::Cached))?;
        }
        Ok(())
    }

    fn settle(&self, generation: u64, settled: Result<SyncState, TrackerError>) {
        self.outcome.send_if_modified(|outcome| {
            if outcome.generation != generation {
                return false;
            }
            outcome.settled = Some(settled);
            true
        });
    }
}

/// Tracks the docs sync of one entity.
///
/// Must be started from within a Tokio runtime. Dropping the tracker aborts
/// the running sync and discards anything it still reports.
pub struct SyncTracker {
    shared: Arc<Shared>,
    entity: EntityName,
    docs: watch::Receiver<EntityDocs>,
    task: Option<JoinHandle<()>>,
}

impl SyncTracker {
    /// Starts syncing `entity`, reconciling against the docs status `docs`.
    pub fn start(
        api: Arc<dyn TechDocsStorageApi>,
        entity: EntityName,
        docs: watch::Receiver<EntityDocs>,
    ) -> Self {
        Self::start_with_delay(api, entity, docs, BUILDING_DELAY)
    }

    /// Like [`SyncTracker::start`] with a custom `BUILDING` delay.
    pub fn start_with_delay(
        api: Arc<dyn TechDocsStorageApi>,
        entity: EntityName,
        docs: watch::Receiver<EntityDocs>,
        building_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        let (outcome, _) = watch::channel(RunOutcome {
            generation: 0,
            settled: None,
        });

        let mut tracker = Self {
            shared: Arc::new(Shared {
                api,
                state,
                outcome,
                generation: AtomicU64::new(0),
                building_delay,
            }),
            entity,
            docs,
            task: None,
        };
        tracker.run();
        tracker
    }

    pub fn entity(&self) -> &EntityName {
        &self.entity
    }

    /// Re-runs the sync for a different entity. Same entity is a no-op.
    pub fn set_entity(&mut self, entity: EntityName) {
        if self.entity == entity {
            return;
        }
        self.entity = entity;
        self.run();
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> SyncState {
        self.shared.state.borrow().clone()
    }

    /// Waits for the current run to reach a terminal state.
    ///
    /// Returns the contract violation instead if the storage service
    /// answered with an unknown result tag.
    pub async fn wait_settled(&self) -> Result<SyncState, TrackerError> {
        let generation = self.shared.generation.load(Ordering::Acquire);
        let mut rx = self.shared.outcome.subscribe();
        let outcome = rx
            .wait_for(|o| o.generation == generation && o.settled.is_some())
            .await
            .map_err(|_| TrackerError::Closed)?;
        outcome.settled.clone().unwrap_or(Err(TrackerError::Closed))
    }

    fn run(&mut self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }

        self.shared.outcome.send_replace(RunOutcome {
            generation,
            settled: None,
        });
        // Checking never fails to reduce.
        let _ = self.shared.dispatch(generation, SyncAction::Checking);

        tracing::debug!(entity = %self.entity, generation, "starting docs sync");

        let shared = Arc::clone(&self.shared);
        let entity = self.entity.clone();
        let docs = self.docs.clone();
        self.task = Some(tokio::spawn(drive(shared, generation, entity, docs)));
    }
}

impl Drop for SyncTracker {
    fn drop(&mut self) {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn drive(
    shared: Arc<Shared>,
    generation: u64,
    entity: EntityName,
    mut docs: watch::Receiver<EntityDocs>,
) {
    let settled = run_sync(&shared, generation, &entity, &docs)
        .await
        .map_err(TrackerError::from);

    match &settled {
        Ok(state) => {
            tracing::debug!(entity = %entity, generation, status = %state.status, "docs sync settled")
        }
        Err(e) => tracing::error!(entity = %entity, generation, error = %e, "docs sync aborted"),
    }
    let failed = settled.is_err();
    shared.settle(generation, settled);
    if failed {
        return;
    }

    while shared.is_current(generation) && docs.changed().await.is_ok() {
        if let Err(e) = shared.reconcile(generation, &docs) {
            tracing::error!(entity = %entity, generation, error = %e, "docs sync aborted");
            return;
        }
    }
}

async fn run_sync(
    shared: &Shared,
    generation: u64,
    entity: &EntityName,
    docs: &watch::Receiver<EntityDocs>,
) -> Result<SyncState, SyncStateError> {
    let (sink, mut lines) = LogSink::channel();
    let sync = shared.api.sync_entity_docs(entity, sink);
    tokio::pin!(sync);

    let debounce = sleep(shared.building_delay);
    tokio::pin!(debounce);
    let mut debounce_armed = true;

    let outcome = loop {
        tokio::select! {
            biased;
            Some(line) = lines.recv() => {
                shared.dispatch(generation, SyncAction::Building { line: Some(line) })?;
            }
            () = &mut debounce, if debounce_armed => {
                debounce_armed = false;
                tracing::debug!(generation, "sync still running, showing build");
                shared.dispatch(generation, SyncAction::Building { line: None })?;
            }
            outcome = &mut sync => break outcome,
        }
    };

    while let Ok(line) = lines.try_recv() {
        shared.dispatch(generation, SyncAction::Building { line: Some(line) })?;
    }

    match outcome {
        Ok(result) => shared.dispatch(generation, SyncAction::Success { result })?,
        Err(e) => {
            tracing::debug!(entity = %entity, error = %e, "docs sync failed");
            shared.dispatch(generation, SyncAction::Error { error: Arc::new(e) })?
        }
    }
    shared.reconcile(generation, docs)?;

    Ok(shared.state.borrow().clone())
}
