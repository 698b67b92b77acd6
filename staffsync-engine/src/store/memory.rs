use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use staffsync_core::errors::{Result, SyncError};
use staffsync_protocol::change::{ChangeRecord, NewChangeRecord};
use staffsync_protocol::queue::{NewQueueEntry, ProcessingQueueEntry, QueueStatus};
use staffsync_protocol::snapshot::{NewSnapshot, RawSnapshot, RetryLogEntry, SnapshotEndpoint};
use staffsync_protocol::timeline::{NewTimelineEvent, TimelineEvent, TimelineEventType, TimelineQuery};
use uuid::Uuid;

use super::{RetryFailure, RetrySuccess, SyncStore};

#[derive(Default)]
struct Tables {
    snapshots: Vec<RawSnapshot>,
    changes: Vec<ChangeRecord>,
    events: Vec<TimelineEvent>,
    queue: Vec<ProcessingQueueEntry>,
    retry_log: Vec<RetryLogEntry>,
}

/// In-process store used by tests and local runs without Postgres.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_snapshots(&self) -> Vec<RawSnapshot> {
        self.inner.read().snapshots.clone()
    }

    pub fn retry_log(&self) -> Vec<RetryLogEntry> {
        self.inner.read().retry_log.clone()
    }

    pub fn queue_entries(&self) -> Vec<ProcessingQueueEntry> {
        self.inner.read().queue.clone()
    }

    pub fn change_count(&self) -> usize {
        self.inner.read().changes.len()
    }

    pub fn event_count(&self) -> usize {
        self.inner.read().events.len()
    }

    /// Seeds a row as-is, bypassing supersession. Test fixtures only.
    pub fn insert_raw(&self, snapshot: RawSnapshot) {
        self.inner.write().snapshots.push(snapshot);
    }

    fn with_snapshot<T>(
        &self,
        snapshot_id: Uuid,
        update: impl FnOnce(&mut RawSnapshot) -> T,
    ) -> Result<T> {
        let mut tables = self.inner.write();
        let row = tables
            .snapshots
            .iter_mut()
            .find(|row| row.id == snapshot_id)
            .ok_or_else(|| SyncError::SnapshotNotFound(snapshot_id.to_string()))?;
        Ok(update(row))
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn latest_snapshot(
        &self,
        entity_id: &str,
        endpoint: SnapshotEndpoint,
    ) -> Result<Option<RawSnapshot>> {
        let tables = self.inner.read();
        Ok(tables
            .snapshots
            .iter()
            .find(|row| row.is_latest && row.entity_id == entity_id && row.endpoint == endpoint)
            .cloned())
    }

    async fn touch_verified(&self, snapshot_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_snapshot(snapshot_id, |row| row.last_verified_at = at)
    }

    async fn supersede_and_insert(&self, snapshot: NewSnapshot, now: DateTime<Utc>) -> Result<RawSnapshot> {
        let mut tables = self.inner.write();
        for row in tables.snapshots.iter_mut().filter(|row| {
            row.is_latest && row.entity_id == snapshot.entity_id && row.endpoint == snapshot.endpoint
        }) {
            row.is_latest = false;
            row.effective_to = Some(now);
        }

        let row = snapshot.into_snapshot(Uuid::new_v4(), now);
        tables.snapshots.push(row.clone());
        Ok(row)
    }

    async fn latest_snapshots(
        &self,
        endpoint: SnapshotEndpoint,
        entity_ids: Option<&[String]>,
    ) -> Result<Vec<RawSnapshot>> {
        let tables = self.inner.read();
        Ok(tables
            .snapshots
            .iter()
            .filter(|row| row.is_latest && row.endpoint == endpoint)
            .filter(|row| entity_ids.map_or(true, |ids| ids.contains(&row.entity_id)))
            .cloned()
            .collect())
    }

    async fn snapshot_history(
        &self,
        entity_id: &str,
        endpoint: SnapshotEndpoint,
    ) -> Result<Vec<RawSnapshot>> {
        let tables = self.inner.read();
        let mut rows: Vec<RawSnapshot> = tables
            .snapshots
            .iter()
            .filter(|row| row.entity_id == entity_id && row.endpoint == endpoint)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.collected_at);
        Ok(rows)
    }

    async fn retry_candidates(
        &self,
        max_retry_count: u32,
        cooled_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RawSnapshot>> {
        let tables = self.inner.read();
        let mut rows: Vec<RawSnapshot> = tables
            .snapshots
            .iter()
            .filter(|row| row.is_latest && row.is_partial && row.retry_count < max_retry_count)
            .filter(|row| row.last_retry_at.map_or(true, |at| at < cooled_before))
            .cloned()
            .collect();
        // `None` sorts before `Some`, which puts never-retried rows first.
        rows.sort_by_key(|row| (row.retry_count, row.last_retry_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn record_retry_success(&self, snapshot_id: Uuid, success: RetrySuccess) -> Result<()> {
        self.with_snapshot(snapshot_id, |row| {
            row.payload = success.payload;
            row.content_hash = success.content_hash;
            row.is_partial = false;
            row.retry_succeeded_at = Some(success.at);
            row.last_retry_at = Some(success.at);
            row.last_verified_at = success.at;
            row.http_status_code = success.http_status_code;
            row.error_message = None;
            row.collection_issues.clear();
            row.confidence_score = 1.0;
        })
    }

    async fn record_retry_failure(&self, snapshot_id: Uuid, failure: RetryFailure) -> Result<u32> {
        self.with_snapshot(snapshot_id, |row| {
            row.retry_count += 1;
            row.last_retry_at = Some(failure.at);
            row.http_status_code = failure.http_status_code;
            row.error_message = Some(failure.error_message);
            row.collection_issues.extend(failure.issues);
            row.retry_count
        })
    }

    async fn append_retry_log(&self, entry: RetryLogEntry) -> Result<()> {
        self.inner.write().retry_log.push(entry);
        Ok(())
    }

    async fn insert_change_record(&self, record: NewChangeRecord) -> Result<Option<ChangeRecord>> {
        let mut tables = self.inner.write();
        let exists = tables.changes.iter().any(|existing| {
            (
                existing.entity_id.as_str(),
                existing.change_type,
                existing.field_name.as_str(),
                existing.effective_date,
            ) == record.key()
        });
        if exists {
            return Ok(None);
        }

        let stored = ChangeRecord::from_new(record, Uuid::new_v4(), Utc::now());
        tables.changes.push(stored.clone());
        Ok(Some(stored))
    }

    async fn list_change_records(&self, entity_id: &str) -> Result<Vec<ChangeRecord>> {
        let tables = self.inner.read();
        let mut rows: Vec<ChangeRecord> = tables
            .changes
            .iter()
            .filter(|row| row.entity_id == entity_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.effective_date, row.change_type));
        Ok(rows)
    }

    async fn timeline_event_exists(
        &self,
        entity_id: &str,
        event_type: TimelineEventType,
        event_date: Option<NaiveDate>,
    ) -> Result<bool> {
        let tables = self.inner.read();
        Ok(tables.events.iter().any(|event| {
            event.entity_id == entity_id
                && event.event_type == event_type
                && event_date.map_or(true, |date| event.event_date == date)
        }))
    }

    async fn insert_timeline_event(&self, event: NewTimelineEvent) -> Result<TimelineEvent> {
        let stored = TimelineEvent::from_new(event, Uuid::new_v4(), Utc::now());
        self.inner.write().events.push(stored.clone());
        Ok(stored)
    }

    async fn list_timeline_events(
        &self,
        entity_id: &str,
        query: &TimelineQuery,
    ) -> Result<Vec<TimelineEvent>> {
        let tables = self.inner.read();
        let mut rows: Vec<TimelineEvent> = tables
            .events
            .iter()
            .filter(|event| event.entity_id == entity_id)
            .filter(|event| {
                query
                    .event_type
                    .as_deref()
                    .map_or(true, |wanted| event.event_type.as_str() == wanted)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|event| (event.event_date, event.created_at));

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map(|limit| limit.max(0) as usize).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn enqueue(&self, entry: NewQueueEntry) -> Result<ProcessingQueueEntry> {
        let stored = ProcessingQueueEntry::from_new(entry, Uuid::new_v4(), Utc::now());
        self.inner.write().queue.push(stored.clone());
        Ok(stored)
    }

    async fn claim_next_queue_entry(&self) -> Result<Option<ProcessingQueueEntry>> {
        let mut tables = self.inner.write();
        let next = tables
            .queue
            .iter_mut()
            .filter(|entry| entry.status == QueueStatus::Pending)
            .min_by_key(|entry| (entry.priority, entry.created_at));

        Ok(next.map(|entry| {
            entry.status = QueueStatus::Processing;
            entry.clone()
        }))
    }

    async fn complete_queue_entry(
        &self,
        entry_id: Uuid,
        outcome: std::result::Result<Value, String>,
    ) -> Result<()> {
        let mut tables = self.inner.write();
        let entry = tables
            .queue
            .iter_mut()
            .find(|entry| entry.id == entry_id)
            .ok_or_else(|| SyncError::InvalidInput(format!("unknown queue entry {entry_id}")))?;

        entry.processed_at = Some(Utc::now());
        match outcome {
            Ok(result) => {
                entry.status = QueueStatus::Completed;
                entry.result = Some(result);
            }
            Err(error) => {
                entry.status = QueueStatus::Failed;
                entry.error = Some(error);
            }
        }
        Ok(())
    }

    async fn pending_queue_entries(&self) -> Result<usize> {
        let tables = self.inner.read();
        Ok(tables
            .queue
            .iter()
            .filter(|entry| entry.status == QueueStatus::Pending)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn supersession_keeps_one_latest_and_closes_window() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(5);

        let first = store
            .supersede_and_insert(
                NewSnapshot::complete("e-1", SnapshotEndpoint::Employee, json!({"v": 1})),
                t0,
            )
            .await
            .unwrap();
        let second = store
            .supersede_and_insert(
                NewSnapshot::complete("e-1", SnapshotEndpoint::Employee, json!({"v": 2})),
                t1,
            )
            .await
            .unwrap();

        let history = store.snapshot_history("e-1", SnapshotEndpoint::Employee).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|row| row.is_latest).count(), 1);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[0].effective_to, Some(second.collected_at));
    }

    #[tokio::test]
    async fn retry_candidates_respect_budget_cooldown_and_fairness() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mk = |entity: &str, retries: u32, last: Option<DateTime<Utc>>| {
            let mut row = NewSnapshot::partial(entity, SnapshotEndpoint::Employments, Some(500), "boom")
                .into_snapshot(Uuid::new_v4(), now - Duration::hours(3));
            row.retry_count = retries;
            row.last_retry_at = last;
            row
        };

        store.insert_raw(mk("stuck", 2, Some(now - Duration::hours(2))));
        store.insert_raw(mk("fresh", 0, None));
        store.insert_raw(mk("cooling", 0, Some(now - Duration::minutes(5))));
        store.insert_raw(mk("exhausted", 5, None));
        store.insert_raw(mk("older", 1, Some(now - Duration::hours(2))));
        let mut superseded = mk("superseded", 0, None);
        superseded.is_latest = false;
        superseded.effective_to = Some(now - Duration::hours(2));
        store.insert_raw(superseded);

        let rows = store
            .retry_candidates(5, now - Duration::hours(1), 10)
            .await
            .unwrap();
        let order: Vec<&str> = rows.iter().map(|row| row.entity_id.as_str()).collect();
        assert_eq!(order, vec!["fresh", "older", "stuck"]);
    }

    #[tokio::test]
    async fn queue_claims_by_priority() {
        let store = MemoryStore::new();
        let ids = vec!["1".to_string()];
        store
            .enqueue(NewQueueEntry::timeline_batch(&ids, 50, "low"))
            .await
            .unwrap();
        let urgent = store
            .enqueue(NewQueueEntry::timeline_batch(&ids, 10, "high"))
            .await
            .unwrap();

        let claimed = store.claim_next_queue_entry().await.unwrap().unwrap();
        assert_eq!(claimed.id, urgent.id);
        assert_eq!(store.pending_queue_entries().await.unwrap(), 1);
    }
}
