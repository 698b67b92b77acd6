//! Core shared library for the staffsync workspace.
//!
//! This crate exposes the primitives every other crate depends on: the
//! canonical error type, configuration loading, the Postgres pool wrapper,
//! and logging setup.

pub mod config;
pub mod db;
pub mod errors;
pub mod logging;

pub use config::{CoreConfig, PayrollApiConfig, SyncSettings};
pub use errors::{ConfigError, Result as CoreResult, SyncError};
