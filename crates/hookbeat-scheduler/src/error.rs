use thiserror::Error;

use hookbeat_storage::StorageError;

/// Errors that can occur within the scheduling engine.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression is malformed, out of range, or can never fire.
    #[error("Invalid cron expression: {0}")]
    InvalidExpression(String),

    /// No job with the given ID exists in storage.
    #[error("Job not found: {id}")]
    JobNotFound { id: i64 },

    /// A storage read or write failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
