//! List sync error types.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::store::{BlobError, StoreError};

/// Stage of the history-product cascade that was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadeStage {
    Snapshots,
    Images,
    Trips,
}

impl fmt::Display for CascadeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeStage::Snapshots => write!(f, "snapshot removal"),
            CascadeStage::Images => write!(f, "image removal"),
            CascadeStage::Trips => write!(f, "empty trip removal"),
        }
    }
}

/// Errors surfaced by the list manager and history view.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Rejected locally; nothing changed and no remote call was made.
    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    /// A remote call failed. Any optimistic change has been rolled back.
    #[error("Remote call failed: {0}")]
    Remote(#[from] StoreError),

    #[error("Blob storage failed: {0}")]
    Blob(#[from] BlobError),

    /// The trip was archived but the active list was not fully cleared.
    /// `ListSyncManager::resume_archives` finishes the job.
    #[error("Trip {history_id} was archived but not cleared: {source}")]
    ArchiveIncomplete {
        history_id: String,
        source: StoreError,
    },

    /// Removing a history product stopped part-way. Re-running the returned
    /// plan resumes it.
    #[error("Removing history product '{name}' stopped during {stage}: {source}")]
    CascadeIncomplete {
        name: String,
        stage: CascadeStage,
        source: Box<dyn std::error::Error + Send + Sync>,
        plan: Box<crate::history::CascadePlan>,
    },
}

impl SyncError {
    /// True for errors caused by the caller's input rather than the remote.
    pub fn is_invalid(&self) -> bool {
        matches!(self, SyncError::Invalid(_) | SyncError::NotFound(_))
    }
}
