//! Durable state of the pipeline: raw snapshots, change records, timeline
//! events, the processing queue and the retry log.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use staffsync_core::errors::Result;
use staffsync_protocol::change::{ChangeRecord, NewChangeRecord};
use staffsync_protocol::queue::{NewQueueEntry, ProcessingQueueEntry};
use staffsync_protocol::snapshot::{NewSnapshot, RawSnapshot, RetryLogEntry, SnapshotEndpoint};
use staffsync_protocol::timeline::{NewTimelineEvent, TimelineEvent, TimelineEventType, TimelineQuery};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Fields written when a retry brings a partial snapshot back to health.
#[derive(Debug, Clone)]
pub struct RetrySuccess {
    pub payload: Value,
    pub content_hash: String,
    pub http_status_code: Option<u16>,
    pub at: DateTime<Utc>,
}

/// Fields written when a retry pass on a snapshot gives up.
#[derive(Debug, Clone)]
pub struct RetryFailure {
    pub error_message: String,
    pub http_status_code: Option<u16>,
    pub issues: Vec<String>,
    pub at: DateTime<Utc>,
}

/// Relational operations the pipeline needs. Implementations must keep at
/// most one `is_latest` row per (entity, endpoint).
#[async_trait]
pub trait SyncStore: Send + Sync + 'static {
    async fn latest_snapshot(
        &self,
        entity_id: &str,
        endpoint: SnapshotEndpoint,
    ) -> Result<Option<RawSnapshot>>;

    /// Cheap path for unchanged content: only `last_verified_at` moves.
    async fn touch_verified(&self, snapshot_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Closes the current latest row (`effective_to = now`, `is_latest = false`)
    /// and inserts `snapshot` as the new latest, atomically.
    async fn supersede_and_insert(&self, snapshot: NewSnapshot, now: DateTime<Utc>) -> Result<RawSnapshot>;

    /// Latest rows for an endpoint, optionally limited to some entities.
    async fn latest_snapshots(
        &self,
        endpoint: SnapshotEndpoint,
        entity_ids: Option<&[String]>,
    ) -> Result<Vec<RawSnapshot>>;

    /// Every stored version for a pair, oldest first.
    async fn snapshot_history(
        &self,
        entity_id: &str,
        endpoint: SnapshotEndpoint,
    ) -> Result<Vec<RawSnapshot>>;

    /// Latest partial rows eligible for a retry, fewest retries first, then oldest attempt.
    async fn retry_candidates(
        &self,
        max_retry_count: u32,
        cooled_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RawSnapshot>>;

    async fn record_retry_success(&self, snapshot_id: Uuid, success: RetrySuccess) -> Result<()>;

    /// Increments `retry_count` and returns the new value.
    async fn record_retry_failure(&self, snapshot_id: Uuid, failure: RetryFailure) -> Result<u32>;

    async fn append_retry_log(&self, entry: RetryLogEntry) -> Result<()>;

    /// Inserts unless a record with the same key already exists; `None` means skipped.
    async fn insert_change_record(&self, record: NewChangeRecord) -> Result<Option<ChangeRecord>>;

    async fn list_change_records(&self, entity_id: &str) -> Result<Vec<ChangeRecord>>;

    /// With `event_date = None` the check ignores the date.
    async fn timeline_event_exists(
        &self,
        entity_id: &str,
        event_type: TimelineEventType,
        event_date: Option<NaiveDate>,
    ) -> Result<bool>;

    async fn insert_timeline_event(&self, event: NewTimelineEvent) -> Result<TimelineEvent>;

    async fn list_timeline_events(
        &self,
        entity_id: &str,
        query: &TimelineQuery,
    ) -> Result<Vec<TimelineEvent>>;

    async fn enqueue(&self, entry: NewQueueEntry) -> Result<ProcessingQueueEntry>;

    /// Moves the most urgent pending entry to `processing` and returns it.
    async fn claim_next_queue_entry(&self) -> Result<Option<ProcessingQueueEntry>>;

    async fn complete_queue_entry(
        &self,
        entry_id: Uuid,
        outcome: std::result::Result<Value, String>,
    ) -> Result<()>;

    async fn pending_queue_entries(&self) -> Result<usize>;
}
