//! Shared error types for the services crate.

use thiserror::Error;

use review_core::model::SlotError;
use review_core::scheduler::SchedulerError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ReviewService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReviewServiceError {
    /// Another submission for the same card landed first; re-fetch and re-rate.
    #[error("review state changed since it was loaded")]
    StaleState,
    /// This presentation was already rated.
    #[error("rating already submitted for this presentation")]
    DuplicateSubmission,
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ReviewServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Stale => Self::StaleState,
            StorageError::DuplicateAttempt => Self::DuplicateSubmission,
            other => Self::Storage(other),
        }
    }
}

/// Errors emitted by `SlotService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SlotServiceError {
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AnalyticsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnalyticsServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping engine services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
