use thiserror::Error;
use uuid::Uuid;

use crate::JobStatus;

/// Errors surfaced by the dataset, model and job services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Input rejected before anything was persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The record does not exist or is not owned by the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The job is not in the status the operation requires.
    #[error("cannot {operation} job {job_id}: status is {actual}, expected {expected}")]
    State {
        job_id: Uuid,
        operation: &'static str,
        expected: JobStatus,
        actual: JobStatus,
    },

    /// The job scheduler has shut down and accepts no more work.
    #[error("job scheduler is not running")]
    SchedulerStopped,

    /// Failure inside a training run.
    #[error("{0}")]
    Training(String),

    /// The store could not complete the operation.
    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl ServiceError {
    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a training error.
    pub fn training(message: impl Into<String>) -> Self {
        Self::Training(message.into())
    }
}
