use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{FromRow, QueryBuilder};
use staffsync_core::config::CoreConfig;
use staffsync_core::db::{DatabaseMigrator, DatabasePool};
use staffsync_core::errors::{Result, SyncError};
use staffsync_protocol::change::{BusinessImpact, ChangeRecord, ChangeType, NewChangeRecord};
use staffsync_protocol::queue::{NewQueueEntry, ProcessingQueueEntry, QueueStatus};
use staffsync_protocol::snapshot::{NewSnapshot, RawSnapshot, RetryLogEntry, SnapshotEndpoint};
use staffsync_protocol::timeline::{NewTimelineEvent, TimelineEvent, TimelineEventType, TimelineQuery};
use uuid::Uuid;

use super::{RetryFailure, RetrySuccess, SyncStore};

const SNAPSHOT_COLUMNS: &str = "id, entity_id, endpoint, payload, content_hash, collected_at, \
     last_verified_at, effective_from, effective_to, is_latest, is_partial, retry_count, \
     last_retry_at, retry_succeeded_at, http_status_code, error_message, collection_issues, \
     confidence_score";

const CHANGE_COLUMNS: &str = "id, entity_id, change_type, field_name, effective_date, old_value, \
     new_value, change_amount, change_percent, confidence_score, business_impact, metadata, \
     detected_at";

const EVENT_COLUMNS: &str = "id, entity_id, event_type, event_date, event_title, \
     event_description, event_data, change_id, created_at";

const QUEUE_COLUMNS: &str =
    "id, job_type, payload, priority, created_by, status, created_at, processed_at, result, error";

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: DatabasePool,
}

impl PgStore {
    /// Connects using the supplied configuration and ensures migrations ran.
    pub async fn from_config(config: &CoreConfig) -> Result<Self> {
        let pool = DatabasePool::connect(config).await?;
        Self::from_pool(pool).await
    }

    /// Builds the store from an existing pool and migrates the schema.
    pub async fn from_pool(pool: DatabasePool) -> Result<Self> {
        let store = Self { pool };
        store.pool.migrate(&store).await?;
        Ok(store)
    }
}

#[async_trait]
impl DatabaseMigrator for PgStore {
    fn name(&self) -> &'static str {
        "staffsync"
    }

    async fn run_migrations(&self, pool: &DatabasePool) -> Result<()> {
        sqlx::migrate!("./migrations").run(pool.inner()).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncStore for PgStore {
    async fn latest_snapshot(
        &self,
        entity_id: &str,
        endpoint: SnapshotEndpoint,
    ) -> Result<Option<RawSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM raw_snapshots \
             WHERE entity_id = $1 AND endpoint = $2 AND is_latest"
        ))
        .bind(entity_id)
        .bind(endpoint.as_str())
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn touch_verified(&self, snapshot_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE raw_snapshots SET last_verified_at = $2 WHERE id = $1")
            .bind(snapshot_id)
            .bind(at)
            .execute(self.pool.inner())
            .await?;
        Ok(())
    }

    async fn supersede_and_insert(&self, snapshot: NewSnapshot, now: DateTime<Utc>) -> Result<RawSnapshot> {
        let mut tx = self.pool.inner().begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{}|{}", snapshot.entity_id, snapshot.endpoint))
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE raw_snapshots SET is_latest = FALSE, effective_to = $3 \
             WHERE entity_id = $1 AND endpoint = $2 AND is_latest",
        )
        .bind(&snapshot.entity_id)
        .bind(snapshot.endpoint.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let new_row = snapshot.into_snapshot(Uuid::new_v4(), now);
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "INSERT INTO raw_snapshots ({SNAPSHOT_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING {SNAPSHOT_COLUMNS}"
        ))
        .bind(new_row.id)
        .bind(&new_row.entity_id)
        .bind(new_row.endpoint.as_str())
        .bind(&new_row.payload)
        .bind(&new_row.content_hash)
        .bind(new_row.collected_at)
        .bind(new_row.last_verified_at)
        .bind(new_row.effective_from)
        .bind(new_row.effective_to)
        .bind(new_row.is_latest)
        .bind(new_row.is_partial)
        .bind(new_row.retry_count as i32)
        .bind(new_row.last_retry_at)
        .bind(new_row.retry_succeeded_at)
        .bind(new_row.http_status_code.map(i32::from))
        .bind(&new_row.error_message)
        .bind(&new_row.collection_issues)
        .bind(new_row.confidence_score)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn latest_snapshots(
        &self,
        endpoint: SnapshotEndpoint,
        entity_ids: Option<&[String]>,
    ) -> Result<Vec<RawSnapshot>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM raw_snapshots WHERE is_latest AND endpoint = "
        ));
        builder.push_bind(endpoint.as_str());

        if let Some(ids) = entity_ids {
            builder.push(" AND entity_id = ANY(");
            builder.push_bind(ids.to_vec());
            builder.push(")");
        }
        builder.push(" ORDER BY entity_id");

        let rows = builder
            .build_query_as::<SnapshotRow>()
            .fetch_all(self.pool.inner())
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn snapshot_history(
        &self,
        entity_id: &str,
        endpoint: SnapshotEndpoint,
    ) -> Result<Vec<RawSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM raw_snapshots \
             WHERE entity_id = $1 AND endpoint = $2 ORDER BY collected_at"
        ))
        .bind(entity_id)
        .bind(endpoint.as_str())
        .fetch_all(self.pool.inner())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn retry_candidates(
        &self,
        max_retry_count: u32,
        cooled_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RawSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM raw_snapshots \
             WHERE is_latest AND is_partial AND retry_count < $1 \
               AND (last_retry_at IS NULL OR last_retry_at < $2) \
             ORDER BY retry_count ASC, last_retry_at ASC NULLS FIRST \
             LIMIT $3"
        ))
        .bind(max_retry_count as i32)
        .bind(cooled_before)
        .bind(i64::from(limit))
        .fetch_all(self.pool.inner())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_retry_success(&self, snapshot_id: Uuid, success: RetrySuccess) -> Result<()> {
        sqlx::query(
            "UPDATE raw_snapshots SET payload = $2, content_hash = $3, is_partial = FALSE, \
             retry_succeeded_at = $4, last_retry_at = $4, last_verified_at = $4, \
             http_status_code = $5, error_message = NULL, collection_issues = '{}', \
             confidence_score = 1.0 \
             WHERE id = $1",
        )
        .bind(snapshot_id)
        .bind(&success.payload)
        .bind(&success.content_hash)
        .bind(success.at)
        .bind(success.http_status_code.map(i32::from))
        .execute(self.pool.inner())
        .await?;
        Ok(())
    }

    async fn record_retry_failure(&self, snapshot_id: Uuid, failure: RetryFailure) -> Result<u32> {
        let retry_count: Option<i32> = sqlx::query_scalar(
            "UPDATE raw_snapshots SET retry_count = retry_count + 1, last_retry_at = $2, \
             http_status_code = $3, error_message = $4, \
             collection_issues = collection_issues || $5 \
             WHERE id = $1 RETURNING retry_count",
        )
        .bind(snapshot_id)
        .bind(failure.at)
        .bind(failure.http_status_code.map(i32::from))
        .bind(&failure.error_message)
        .bind(&failure.issues)
        .fetch_optional(self.pool.inner())
        .await?;

        retry_count
            .map(|count| count.max(0) as u32)
            .ok_or_else(|| SyncError::SnapshotNotFound(snapshot_id.to_string()))
    }

    async fn append_retry_log(&self, entry: RetryLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO retry_log (id, snapshot_id, entity_id, endpoint, attempt_number, success, \
             latency_ms, http_status_code, error_message, attempted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(entry.id)
        .bind(entry.snapshot_id)
        .bind(&entry.entity_id)
        .bind(entry.endpoint.as_str())
        .bind(entry.attempt_number as i32)
        .bind(entry.success)
        .bind(entry.latency_ms as i64)
        .bind(entry.http_status_code.map(i32::from))
        .bind(&entry.error_message)
        .bind(entry.attempted_at)
        .execute(self.pool.inner())
        .await?;
        Ok(())
    }

    async fn insert_change_record(&self, record: NewChangeRecord) -> Result<Option<ChangeRecord>> {
        let row = sqlx::query_as::<_, ChangeRow>(&format!(
            "INSERT INTO change_records ({CHANGE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW()) \
             ON CONFLICT (entity_id, change_type, field_name, effective_date) DO NOTHING \
             RETURNING {CHANGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&record.entity_id)
        .bind(record.change_type.as_str())
        .bind(&record.field_name)
        .bind(record.effective_date)
        .bind(&record.old_value)
        .bind(&record.new_value)
        .bind(record.change_amount)
        .bind(record.change_percent)
        .bind(record.confidence_score)
        .bind(record.business_impact.as_str())
        .bind(&record.metadata)
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_change_records(&self, entity_id: &str) -> Result<Vec<ChangeRecord>> {
        let rows = sqlx::query_as::<_, ChangeRow>(&format!(
            "SELECT {CHANGE_COLUMNS} FROM change_records WHERE entity_id = $1 \
             ORDER BY effective_date, change_type"
        ))
        .bind(entity_id)
        .fetch_all(self.pool.inner())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn timeline_event_exists(
        &self,
        entity_id: &str,
        event_type: TimelineEventType,
        event_date: Option<NaiveDate>,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM timeline_events \
             WHERE entity_id = $1 AND event_type = $2 AND ($3::date IS NULL OR event_date = $3))",
        )
        .bind(entity_id)
        .bind(event_type.as_str())
        .bind(event_date)
        .fetch_one(self.pool.inner())
        .await?;
        Ok(exists)
    }

    async fn insert_timeline_event(&self, event: NewTimelineEvent) -> Result<TimelineEvent> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "INSERT INTO timeline_events ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) RETURNING {EVENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&event.entity_id)
        .bind(event.event_type.as_str())
        .bind(event.event_date)
        .bind(&event.event_title)
        .bind(&event.event_description)
        .bind(&event.event_data)
        .bind(event.change_id)
        .fetch_one(self.pool.inner())
        .await?;
        row.try_into()
    }

    async fn list_timeline_events(
        &self,
        entity_id: &str,
        query: &TimelineQuery,
    ) -> Result<Vec<TimelineEvent>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {EVENT_COLUMNS} FROM timeline_events WHERE entity_id = "
        ));
        builder.push_bind(entity_id);

        if let Some(event_type) = &query.event_type {
            builder.push(" AND event_type = ");
            builder.push_bind(event_type);
        }

        builder.push(" ORDER BY event_date, created_at");

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }

        if let Some(offset) = query.offset {
            builder.push(" OFFSET ");
            builder.push_bind(offset);
        }

        let rows = builder
            .build_query_as::<EventRow>()
            .fetch_all(self.pool.inner())
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn enqueue(&self, entry: NewQueueEntry) -> Result<ProcessingQueueEntry> {
        let row = sqlx::query_as::<_, QueueRow>(&format!(
            "INSERT INTO processing_queue (id, job_type, payload, priority, created_by, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'pending', NOW()) RETURNING {QUEUE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(entry.job_type.as_str())
        .bind(&entry.payload)
        .bind(entry.priority)
        .bind(&entry.created_by)
        .fetch_one(self.pool.inner())
        .await?;
        row.try_into()
    }

    async fn claim_next_queue_entry(&self) -> Result<Option<ProcessingQueueEntry>> {
        let row = sqlx::query_as::<_, QueueRow>(&format!(
            "UPDATE processing_queue SET status = 'processing' WHERE id = ( \
                 SELECT id FROM processing_queue WHERE status = 'pending' \
                 ORDER BY priority, created_at \
                 FOR UPDATE SKIP LOCKED LIMIT 1 \
             ) RETURNING {QUEUE_COLUMNS}"
        ))
        .fetch_optional(self.pool.inner())
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn complete_queue_entry(
        &self,
        entry_id: Uuid,
        outcome: std::result::Result<Value, String>,
    ) -> Result<()> {
        let (status, result, error) = match outcome {
            Ok(result) => (QueueStatus::Completed, Some(result), None),
            Err(error) => (QueueStatus::Failed, None, Some(error)),
        };

        sqlx::query(
            "UPDATE processing_queue SET status = $2, result = $3, error = $4, processed_at = NOW() \
             WHERE id = $1",
        )
        .bind(entry_id)
        .bind(status.as_str())
        .bind(result)
        .bind(error)
        .execute(self.pool.inner())
        .await?;
        Ok(())
    }

    async fn pending_queue_entries(&self) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM processing_queue WHERE status = 'pending'")
                .fetch_one(self.pool.inner())
                .await?;
        Ok(count.max(0) as usize)
    }
}

fn decode_err(column: &str, value: &str) -> SyncError {
    SyncError::DeserializationError(format!("unexpected {column} value '{value}'"))
}

#[derive(FromRow)]
struct SnapshotRow {
    id: Uuid,
    entity_id: String,
    endpoint: String,
    payload: Value,
    content_hash: String,
    collected_at: DateTime<Utc>,
    last_verified_at: DateTime<Utc>,
    effective_from: DateTime<Utc>,
    effective_to: Option<DateTime<Utc>>,
    is_latest: bool,
    is_partial: bool,
    retry_count: i32,
    last_retry_at: Option<DateTime<Utc>>,
    retry_succeeded_at: Option<DateTime<Utc>>,
    http_status_code: Option<i32>,
    error_message: Option<String>,
    collection_issues: Vec<String>,
    confidence_score: f64,
}

impl TryFrom<SnapshotRow> for RawSnapshot {
    type Error = SyncError;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        let endpoint = row
            .endpoint
            .parse::<SnapshotEndpoint>()
            .map_err(|_| decode_err("endpoint", &row.endpoint))?;

        Ok(RawSnapshot {
            id: row.id,
            entity_id: row.entity_id,
            endpoint,
            payload: row.payload,
            content_hash: row.content_hash,
            collected_at: row.collected_at,
            last_verified_at: row.last_verified_at,
            effective_from: row.effective_from,
            effective_to: row.effective_to,
            is_latest: row.is_latest,
            is_partial: row.is_partial,
            retry_count: row.retry_count.max(0) as u32,
            last_retry_at: row.last_retry_at,
            retry_succeeded_at: row.retry_succeeded_at,
            http_status_code: row.http_status_code.and_then(|code| u16::try_from(code).ok()),
            error_message: row.error_message,
            collection_issues: row.collection_issues,
            confidence_score: row.confidence_score,
        })
    }
}

#[derive(FromRow)]
struct ChangeRow {
    id: Uuid,
    entity_id: String,
    change_type: String,
    field_name: String,
    effective_date: NaiveDate,
    old_value: Option<Value>,
    new_value: Option<Value>,
    change_amount: Option<f64>,
    change_percent: Option<f64>,
    confidence_score: f64,
    business_impact: String,
    metadata: Value,
    detected_at: DateTime<Utc>,
}

impl TryFrom<ChangeRow> for ChangeRecord {
    type Error = SyncError;

    fn try_from(row: ChangeRow) -> Result<Self> {
        let change_type = ChangeType::parse(&row.change_type)
            .ok_or_else(|| decode_err("change_type", &row.change_type))?;
        let business_impact = BusinessImpact::parse(&row.business_impact)
            .ok_or_else(|| decode_err("business_impact", &row.business_impact))?;

        Ok(ChangeRecord {
            id: row.id,
            entity_id: row.entity_id,
            change_type,
            field_name: row.field_name,
            effective_date: row.effective_date,
            old_value: row.old_value,
            new_value: row.new_value,
            change_amount: row.change_amount,
            change_percent: row.change_percent,
            confidence_score: row.confidence_score,
            business_impact,
            metadata: row.metadata,
            detected_at: row.detected_at,
        })
    }
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    entity_id: String,
    event_type: String,
    event_date: NaiveDate,
    event_title: String,
    event_description: String,
    event_data: Value,
    change_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for TimelineEvent {
    type Error = SyncError;

    fn try_from(row: EventRow) -> Result<Self> {
        let event_type = TimelineEventType::parse(&row.event_type)
            .ok_or_else(|| decode_err("event_type", &row.event_type))?;

        Ok(TimelineEvent {
            id: row.id,
            entity_id: row.entity_id,
            event_type,
            event_date: row.event_date,
            event_title: row.event_title,
            event_description: row.event_description,
            event_data: row.event_data,
            change_id: row.change_id,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct QueueRow {
    id: Uuid,
    job_type: String,
    payload: Value,
    priority: i32,
    created_by: String,
    status: String,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    result: Option<Value>,
    error: Option<String>,
}

impl TryFrom<QueueRow> for ProcessingQueueEntry {
    type Error = SyncError;

    fn try_from(row: QueueRow) -> Result<Self> {
        let status = QueueStatus::parse(&row.status).ok_or_else(|| decode_err("status", &row.status))?;

        Ok(ProcessingQueueEntry {
            id: row.id,
            job_type: row.job_type,
            payload: row.payload,
            priority: row.priority,
            created_by: row.created_by,
            status,
            created_at: row.created_at,
            processed_at: row.processed_at,
            result: row.result,
            error: row.error,
        })
    }
}
