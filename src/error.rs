use thiserror::Error;

use crate::state_machine::{JobId, JobStatus};

pub type Result<T, E = BoardError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Invalid transition for job {job_id}: status is {current}, expected {expected}")]
    InvalidTransition {
        job_id: JobId,
        current: JobStatus,
        expected: JobStatus,
    },

    #[error("Ledger update failed for user {user_id}: {reason}")]
    LedgerUpdateFailed { user_id: String, reason: String },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl BoardError {
    /// Stable machine-readable name, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            BoardError::Validation(_) => "validation_error",
            BoardError::NotFound(_) => "not_found",
            BoardError::InvalidTransition { .. } => "invalid_transition",
            BoardError::LedgerUpdateFailed { .. } => "ledger_update_failed",
            BoardError::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for BoardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => BoardError::NotFound(id),
            other => BoardError::Store(other),
        }
    }
}

/// Failures raised by a job repository backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no job with id {0}")]
    NotFound(JobId),

    #[error("a job with id {0} already exists")]
    Duplicate(JobId),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("job {0} was modified concurrently")]
    Conflict(JobId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Failures raised by a user ledger backend.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
