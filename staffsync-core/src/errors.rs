use std::io;

use thiserror::Error;

/// Result type used across the staffsync core crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Canonical error representation shared by all crates.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("{0}")]
    GeneralError(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::DeserializationError(err.to_string())
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for SyncError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::GeneralError(err.to_string())
    }
}

/// Dedicated configuration error used by the configuration module.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {key}: {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("internal configuration error: {0}")]
    Internal(String),
}

impl From<ConfigError> for SyncError {
    fn from(value: ConfigError) -> Self {
        SyncError::ConfigError(value.to_string())
    }
}
