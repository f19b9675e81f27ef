//! TechDocs Core Library
//!
//! Fetches pre-built documentation for catalog entities and tracks the
//! "check cache, rebuild if stale" sync lifecycle for display layers.

pub mod api;
pub mod docs;
pub mod entity;
pub mod indicator;
pub mod reader;
pub mod sync;
#[cfg(test)]
mod testing;

pub use api::{LogSink, StorageApiError, SyncResult, TechDocsStorageApi};
pub use docs::{DocsFetcher, EntityDocs};
pub use entity::{EntityName, EntityNameError, EntityRefDefaults};
pub use indicator::{IndicatorState, Severity};
pub use reader::{ReaderContext, ReaderProvider};
pub use sync::{
    reduce, SyncAction, SyncState, SyncStateError, SyncStatus, SyncTracker, TrackerError,
    BUILDING_DELAY,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
