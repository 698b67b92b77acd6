//! staffsync: employment-data synchronisation and change detection.
//!
//! The workspace is split into:
//!
//! * `staffsync-core`: configuration, errors, logging and database plumbing
//! * `staffsync-protocol`: snapshot, change, timeline and queue types shared by every crate
//! * `staffsync-engine`: collector, change detector, retry handler, timeline
//!   processor and the HTTP service that orchestrates them
//! * `staffsync-cli`: the `staffsync` command-line client

pub use staffsync_core;
pub use staffsync_engine;
pub use staffsync_protocol;

pub mod prelude {
    pub use staffsync_core::config::{CoreConfig, PayrollApiConfig, SyncSettings};
    pub use staffsync_core::errors::{ConfigError, SyncError};
    pub use staffsync_engine::{
        ChangeDetector, EngineError, MemoryStore, PayrollClient, PayrollSource, PgStore,
        RetryHandler, SyncCollector, SyncOrchestrator, SyncService, SyncServiceBuilder, SyncStore,
        TimelineProcessor,
    };
    pub use staffsync_protocol::prelude::*;
}
