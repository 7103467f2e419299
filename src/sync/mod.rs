//! Upstream-to-mirror synchronization: two tracks (LMS, SIS) run side by side,
//! each tolerant of per-school and per-endpoint failures.

pub mod cursor;
pub mod mapping;
pub mod orchestrator;
pub mod report;
pub mod scheduler;
pub mod tracks;
pub mod upsert;

use thiserror::Error;

use crate::database::DatabaseError;

pub use orchestrator::{School, SyncOrchestrator, Trigger};
pub use report::{EndpointReport, ItemFailure, RunStatus, RunSummary, SchoolReport, Source, TrackReport};
pub use scheduler::{validate_cron, SyncScheduler};
pub use tracks::{LmsTrack, SchoolContext, SisTrack, SyncTrack};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Database(e.into())
    }
}
