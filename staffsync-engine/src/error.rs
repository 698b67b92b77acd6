use staffsync_core::errors::{ConfigError, SyncError};
use thiserror::Error;

use crate::payroll::FetchError;

/// Errors that abort a whole run rather than a single entity.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] SyncError),
    #[error("payroll source error: {0}")]
    Source(#[from] FetchError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown job type: {0}")]
    UnknownJob(String),
    #[error("queue worker is shutting down")]
    ShuttingDown,
}
