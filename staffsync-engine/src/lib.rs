//! staffsync engine - payroll collection, change detection, timeline and
//! retry pipeline behind an HTTP service.

pub mod api;
pub mod change_detector;
pub mod collector;
pub mod error;
pub mod orchestrator;
pub mod payroll;
pub mod queue;
pub mod retry;
pub mod store;
pub mod timeline;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ServiceHandle, SyncService, SyncServiceBuilder};
pub use change_detector::{derive_changes, ChangeDetector};
pub use collector::SyncCollector;
pub use error::EngineError;
pub use orchestrator::SyncOrchestrator;
pub use payroll::{FetchError, FetchErrorKind, PayrollClient, PayrollSource};
pub use queue::{QueueTrigger, QueueWorker, QueueWorkerHandle};
pub use retry::RetryHandler;
pub use store::{MemoryStore, PgStore, RetryFailure, RetrySuccess, SyncStore};
pub use timeline::{derive_events, TimelineProcessor};
