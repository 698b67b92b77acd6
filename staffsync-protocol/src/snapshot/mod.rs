mod hash;
mod record;
mod retry_log;

pub use hash::content_hash;
pub use record::{NewSnapshot, RawSnapshot, SnapshotEndpoint};
pub use retry_log::RetryLogEntry;
