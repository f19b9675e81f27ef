//! Follow a docs page while its sync runs.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::time::{sleep, Instant};

use techdocs_core::{
    EntityName, EntityNameError, IndicatorState, ReaderContext, ReaderProvider, Severity,
    SyncTracker, TechDocsStorageApi, TrackerError,
};

use crate::config::Config;
use crate::replay::{ReplayError, ReplayScript, ReplayStorage};

/// Follow docs fetch and sync status for an entity
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Entity ref, e.g. component:default/checkout
    entity: String,

    /// Replay script answering docs reads and syncs
    #[arg(long)]
    replay: PathBuf,

    /// Docs page to open (empty for the root page)
    #[arg(long, default_value = "")]
    path: String,

    /// Re-fetch the page once a newer build is ready
    #[arg(long)]
    refresh: bool,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct FollowOptions {
    pub refresh: bool,
    pub timeout: Duration,
}

impl WatchCommand {
    pub async fn run(&self, config: &Config) -> Result<(), WatchCommandError> {
        let entity = EntityName::parse_ref(&self.entity, &config.entity_defaults())?;
        let script = ReplayScript::load(&self.replay)?;
        let api: Arc<dyn TechDocsStorageApi> = Arc::new(ReplayStorage::new(script));

        let provider = ReaderProvider::new(api, entity.clone(), self.path.clone())
            .on_ready(|| tracing::info!("reader ready"));
        let context = provider.context();
        let tracker = context.sync_tracker_with_delay(config.building_delay());

        println!("Following {} (page '{}')", entity, self.path);
        println!();

        let options = FollowOptions {
            refresh: self.refresh,
            timeout: Duration::from_secs(self.timeout_secs),
        };
        let mut out = std::io::stdout();
        let state = follow(&context, &tracker, &options, &mut out).await?;

        if state.severity() == Severity::Error {
            return Err(WatchCommandError::Failed(state));
        }
        Ok(())
    }
}

/// Prints every status change of `context` and `tracker` until both settle.
///
/// Returns the indicator state the reader ends up showing.
pub async fn follow<W: Write>(
    context: &ReaderContext,
    tracker: &SyncTracker,
    options: &FollowOptions,
    out: &mut W,
) -> Result<IndicatorState, WatchCommandError> {
    let start = Instant::now();
    let mut docs_rx = context.subscribe_docs();
    let mut sync_rx = tracker.subscribe();

    let settled = tracker.wait_settled();
    tokio::pin!(settled);
    let deadline = sleep(options.timeout);
    tokio::pin!(deadline);

    let mut sync_done = false;
    let mut ready_sent = false;
    let mut refreshed = false;
    let mut printed_lines = 0;
    let mut last_status = None;
    let mut last_indicator = None;
    let mut last_docs_error: Option<String> = None;

    loop {
        let docs = docs_rx.borrow_and_update().clone();
        let sync = sync_rx.borrow_and_update().clone();
        let elapsed = start.elapsed().as_millis();

        // A new run starts with an empty log.
        if sync.log.len() < printed_lines {
            printed_lines = 0;
        }
        for line in &sync.log[printed_lines..] {
            writeln!(out, "[{:>6}ms]   | {}", elapsed, line)?;
        }
        printed_lines = sync.log.len();

        if last_status != Some(sync.status) {
            writeln!(out, "[{:>6}ms] sync: {}", elapsed, sync.status)?;
            if let Some(e) = &sync.error {
                writeln!(out, "{:>11} error: {}", "", e)?;
            }
            last_status = Some(sync.status);
        }

        if docs.loading {
            last_docs_error = None;
        } else if let Some(e) = &docs.error {
            let message = e.to_string();
            if last_docs_error.as_deref() != Some(message.as_str()) {
                writeln!(out, "[{:>6}ms] docs: {}", elapsed, message)?;
                last_docs_error = Some(message);
            }
        }

        let indicator = IndicatorState::compute(&docs, &sync);
        if last_indicator != Some(indicator) {
            writeln!(out, "[{:>6}ms] reader: {}", elapsed, indicator)?;
            if let Some(message) = indicator.message() {
                writeln!(out, "{:>11} [{}] {}", "", indicator.severity(), message)?;
            }
            last_indicator = Some(indicator);
        }

        if !docs.loading && !ready_sent {
            context.set_ready();
            ready_sent = true;
        }

        if options.refresh && !refreshed && indicator == IndicatorState::ContentStaleReady {
            writeln!(out, "[{:>6}ms] refreshing page", elapsed)?;
            refreshed = true;
            context.retry();
            continue;
        }

        if sync_done && !docs.loading && indicator.is_settled() {
            return Ok(indicator);
        }

        tokio::select! {
            result = &mut settled, if !sync_done => {
                result?;
                sync_done = true;
            }
            Ok(()) = docs_rx.changed() => {}
            Ok(()) = sync_rx.changed() => {}
            () = &mut deadline => return Err(WatchCommandError::Timeout(options.timeout)),
        }
    }
}

/// Errors from the watch command
#[derive(Debug)]
pub enum WatchCommandError {
    Entity(EntityNameError),
    Replay(ReplayError),
    Sync(TrackerError),
    Io(std::io::Error),
    Timeout(Duration),
    Failed(IndicatorState),
}

impl std::fmt::Display for WatchCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchCommandError::Entity(e) => write!(f, "{}", e),
            WatchCommandError::Replay(e) => write!(f, "{}", e),
            WatchCommandError::Sync(e) => write!(f, "{}", e),
            WatchCommandError::Io(e) => write!(f, "Failed to write output: {}", e),
            WatchCommandError::Timeout(after) => {
                write!(f, "Docs did not settle within {}s", after.as_secs())
            }
            WatchCommandError::Failed(state) => write!(f, "Reader ended in {}", state),
        }
    }
}

impl std::error::Error for WatchCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchCommandError::Entity(e) => Some(e),
            WatchCommandError::Replay(e) => Some(e),
            WatchCommandError::Sync(e) => Some(e),
            WatchCommandError::Io(e) => Some(e),
            WatchCommandError::Timeout(_) | WatchCommandError::Failed(_) => None,
        }
    }
}

impl From<EntityNameError> for WatchCommandError {
    fn from(e: EntityNameError) -> Self {
        WatchCommandError::Entity(e)
    }
}

impl From<ReplayError> for WatchCommandError {
    fn from(e: ReplayError) -> Self {
        WatchCommandError::Replay(e)
    }
}

impl From<TrackerError> for WatchCommandError {
    fn from(e: TrackerError) -> Self {
        WatchCommandError::Sync(e)
    }
}

impl From<std::io::Error> for WatchCommandError {
    fn from(e: std::io::Error) -> Self {
        WatchCommandError::Io(e)
    }
}
