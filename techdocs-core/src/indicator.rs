//! Reader state indicator.
//!
//! Folds the docs fetch status and the sync status into the single state a
//! docs page shows its readers.

use std::fmt;

use serde::Serialize;

use crate::docs::EntityDocs;
use crate::sync::{SyncState, SyncStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// What the reader should tell its users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorState {
    /// Content or cache state not known yet
    Checking,
    /// No content yet and the first build is running
    InitialBuild,
    /// No content and the first build failed
    InitialBuildError,
    /// Nothing to show and nothing being built
    ContentNotFound,
    /// Showing content while a newer version is built
    ContentStaleRefreshing,
    /// Showing content, a newer version is ready
    ContentStaleReady,
    /// Showing content, refreshing it failed
    ContentStaleError,
    /// Showing current content
    ContentFresh,
}

impl IndicatorState {
    pub fn compute(docs: &EntityDocs, sync: &SyncState) -> Self {
        if docs.loading {
            return IndicatorState::Checking;
        }

        match (docs.value.is_some(), sync.status) {
            (false, SyncStatus::Checking) => IndicatorState::Checking,
            (false, SyncStatus::Building) => IndicatorState::InitialBuild,
            (false, SyncStatus::Error) => IndicatorState::InitialBuildError,
            (false, SyncStatus::BuildReady | SyncStatus::UpToDate) => {
                IndicatorState::ContentNotFound
            }
            (true, SyncStatus::Building) => IndicatorState::ContentStaleRefreshing,
            (true, SyncStatus::BuildReady) => IndicatorState::ContentStaleReady,
            (true, SyncStatus::Error) => IndicatorState::ContentStaleError,
            (true, SyncStatus::Checking | SyncStatus::UpToDate) => IndicatorState::ContentFresh,
        }
    }

    /// Banner text, if the state deserves one.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            IndicatorState::Checking | IndicatorState::ContentFresh => None,
            IndicatorState::InitialBuild => Some(
                "Documentation is being prepared. This may take a few minutes the first time.",
            ),
            IndicatorState::InitialBuildError => {
                Some("Building this documentation for the first time failed.")
            }
            IndicatorState::ContentNotFound => {
                Some("No documentation was found for this page.")
            }
            IndicatorState::ContentStaleRefreshing => Some(
                "A newer version of this documentation is being prepared and will be available shortly.",
            ),
            IndicatorState::ContentStaleReady => {
                Some("A newer version of this documentation is now available, please refresh to view.")
            }
            IndicatorState::ContentStaleError => Some(
                "Building a newer version of this documentation failed. Showing the last built version.",
            ),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            IndicatorState::InitialBuildError | IndicatorState::ContentNotFound => Severity::Error,
            IndicatorState::ContentStaleError => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// True when the page has something settled to show.
    pub fn is_settled(&self) -> bool {
        !matches!(
            self,
            IndicatorState::Checking
                | IndicatorState::InitialBuild
                | IndicatorState::ContentStaleRefreshing
        )
    }
}

impl fmt::Display for IndicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndicatorState::Checking => "CHECKING",
            IndicatorState::InitialBuild => "INITIAL_BUILD",
            IndicatorState::InitialBuildError => "INITIAL_BUILD_ERROR",
            IndicatorState::ContentNotFound => "CONTENT_NOT_FOUND",
            IndicatorState::ContentStaleRefreshing => "CONTENT_STALE_REFRESHING",
            IndicatorState::ContentStaleReady => "CONTENT_STALE_READY",
            IndicatorState::ContentStaleError => "CONTENT_STALE_ERROR",
            IndicatorState::ContentFresh => "CONTENT_FRESH",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn docs(loading: bool, content: Option<&str>) -> EntityDocs {
        EntityDocs {
            loading,
            error: None,
            value: content.map(|c| Arc::new(c.to_string())),
        }
    }

    fn sync(status: SyncStatus) -> SyncState {
        SyncState {
            status,
            ..SyncState::default()
        }
    }

    #[test]
    fn test_loading_docs_is_checking() {
        for status in [SyncStatus::Building, SyncStatus::BuildReady, SyncStatus::Error] {
            assert_eq!(
                IndicatorState::compute(&docs(true, Some("stale")), &sync(status)),
                IndicatorState::Checking
            );
        }
    }

    #[test]
    fn test_without_content() {
        let empty = docs(false, None);
        assert_eq!(
            IndicatorState::compute(&empty, &sync(SyncStatus::Checking)),
            IndicatorState::Checking
        );
        assert_eq!(
            IndicatorState::compute(&empty, &sync(SyncStatus::Building)),
            IndicatorState::InitialBuild
        );
        assert_eq!(
            IndicatorState::compute(&empty, &sync(SyncStatus::Error)),
            IndicatorState::InitialBuildError
        );
        assert_eq!(
            IndicatorState::compute(&empty, &sync(SyncStatus::UpToDate)),
            IndicatorState::ContentNotFound
        );
    }

    #[test]
    fn test_with_content() {
        let page = docs(false, Some("<h1>hi</h1>"));
        assert_eq!(
            IndicatorState::compute(&page, &sync(SyncStatus::Building)),
            IndicatorState::ContentStaleRefreshing
        );
        assert_eq!(
            IndicatorState::compute(&page, &sync(SyncStatus::BuildReady)),
            IndicatorState::ContentStaleReady
        );
        assert_eq!(
            IndicatorState::compute(&page, &sync(SyncStatus::Error)),
            IndicatorState::ContentStaleError
        );
        assert_eq!(
            IndicatorState::compute(&page, &sync(SyncStatus::UpToDate)),
            IndicatorState::ContentFresh
        );
    }

    #[test]
    fn test_messages_and_severity() {
        assert!(IndicatorState::ContentFresh.message().is_none());
        assert!(IndicatorState::ContentStaleReady
            .message()
            .unwrap()
            .contains("refresh"));
        let first_build = IndicatorState::InitialBuildError.message().unwrap();
        assert!(first_build.contains("first time"));
        assert!(!first_build.contains("newer version"));
        assert_eq!(IndicatorState::ContentNotFound.severity(), Severity::Error);
        assert_eq!(IndicatorState::ContentStaleError.severity(), Severity::Warning);
        assert_eq!(IndicatorState::InitialBuild.severity(), Severity::Info);
    }

    #[test]
    fn test_settled() {
        assert!(!IndicatorState::InitialBuild.is_settled());
        assert!(!IndicatorState::ContentStaleRefreshing.is_settled());
        assert!(IndicatorState::ContentStaleReady.is_settled());
        assert!(IndicatorState::ContentNotFound.is_settled());
    }
}
