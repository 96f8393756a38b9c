use thiserror::Error;

use crate::dao::base::DaoError;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Malformed input to the control API; rejected before any record exists.
    #[error("Validation: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Transient provider failure; the queue retries these.
    #[error("Provider error: {0}")]
    Provider(String),
    /// The endpoint is permanently unreachable; deactivate, never retry.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
    /// API misuse, e.g. rolling back below version 1.
    #[error("Usage: {0}")]
    Usage(String),
    #[error(transparent)]
    Dao(#[from] DaoError),
}

pub type NotifyResult<T> = Result<T, NotifyError>;
