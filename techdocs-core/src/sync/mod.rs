//! Sync status tracking.
//!
//! Drives the storage service's "check cache, rebuild if stale" operation for
//! one entity and exposes its progress as a `SyncState`:
//!
//! 1. Every run starts in `CHECKING`
//! 2. `BUILDING` is only shown after `BUILDING_DELAY`, or as soon as the first
//!    build log line arrives
//! 3. The run ends in `UP_TO_DATE`, `BUILD_READY` or `ERROR`
//!
//! While the docs content is still loading, `BUILD_READY` is downgraded to
//! `UP_TO_DATE`: the pending fetch will already pick up the new build.

mod error;
mod state;
mod tracker;

pub use error::{SyncStateError, TrackerError};
pub use state::{reduce, SyncAction, SyncState, SyncStatus};
pub use tracker::{SyncTracker, BUILDING_DELAY};
