use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use staffsync_core::config::SyncSettings;
use staffsync_protocol::api::RetryRequest;
use staffsync_protocol::report::{RetryDetail, RetryResult};
use staffsync_protocol::snapshot::{content_hash, RawSnapshot, RetryLogEntry};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::payroll::{FetchError, PayrollSource};
use crate::queue::QueueTrigger;
use crate::store::{RetryFailure, RetrySuccess, SyncStore};

struct AttemptOutcome {
    attempts: u32,
    latency_ms: u64,
    result: Result<Value, FetchError>,
}

/// Re-fetches partial snapshots with a bounded backoff loop.
pub struct RetryHandler {
    store: Arc<dyn SyncStore>,
    source: Arc<dyn PayrollSource>,
    settings: SyncSettings,
    trigger: Option<QueueTrigger>,
}

impl RetryHandler {
    pub fn new(store: Arc<dyn SyncStore>, source: Arc<dyn PayrollSource>, settings: SyncSettings) -> Self {
        Self {
            store,
            source,
            settings,
            trigger: None,
        }
    }

    /// Wakes the queue worker after a pass when entries are still pending.
    pub fn with_queue_trigger(mut self, trigger: QueueTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub async fn run(&self, request: &RetryRequest) -> Result<RetryResult, EngineError> {
        let limit = request.limit.unwrap_or(self.settings.retry_batch_limit);
        let max_retry_count = request.max_retry_count.unwrap_or(self.settings.max_retry_count);
        let cooldown = chrono::Duration::from_std(self.settings.retry_cooldown)
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        let candidates = self
            .store
            .retry_candidates(max_retry_count, Utc::now() - cooldown, limit)
            .await?;
        debug!(count = candidates.len(), limit, max_retry_count, "selected retry candidates");

        let mut result = RetryResult::default();
        for snapshot in candidates {
            let detail = self.retry_snapshot(&snapshot, max_retry_count).await;
            result.processed += 1;
            if detail.success {
                result.succeeded_retries += 1;
            } else {
                result.failed_retries += 1;
            }
            if detail.max_retries_reached {
                result.max_retries_reached += 1;
            }
            result.details.push(detail);
        }

        result.queue_signalled = self.signal_pending_queue().await;

        info!(
            processed = result.processed,
            succeeded = result.succeeded_retries,
            failed = result.failed_retries,
            max_reached = result.max_retries_reached,
            "retry pass finished"
        );
        Ok(result)
    }

    async fn retry_snapshot(&self, snapshot: &RawSnapshot, max_retry_count: u32) -> RetryDetail {
        let outcome = self.fetch_with_backoff(snapshot).await;
        let now = Utc::now();

        let mut detail = RetryDetail {
            snapshot_id: snapshot.id,
            entity_id: snapshot.entity_id.clone(),
            endpoint: snapshot.endpoint,
            success: false,
            attempts: outcome.attempts,
            retry_count: snapshot.retry_count,
            terminal: false,
            max_retries_reached: false,
            http_status_code: None,
            error: None,
        };

        let log_entry = |success: bool, status: Option<u16>, error: Option<String>| RetryLogEntry {
            id: Uuid::new_v4(),
            snapshot_id: snapshot.id,
            entity_id: snapshot.entity_id.clone(),
            endpoint: snapshot.endpoint,
            attempt_number: outcome.attempts,
            success,
            latency_ms: outcome.latency_ms,
            http_status_code: status,
            error_message: error,
            attempted_at: now,
        };

        let entry = match outcome.result {
            Ok(payload) => {
                let success = RetrySuccess {
                    content_hash: content_hash(&payload),
                    payload,
                    http_status_code: Some(200),
                    at: now,
                };
                match self.store.record_retry_success(snapshot.id, success).await {
                    Ok(()) => {
                        detail.success = true;
                        detail.http_status_code = Some(200);
                        info!(entity_id = %snapshot.entity_id, endpoint = %snapshot.endpoint, attempts = outcome.attempts, "partial snapshot healed");
                        log_entry(true, Some(200), None)
                    }
                    Err(err) => {
                        warn!(snapshot_id = %snapshot.id, error = %err, "failed to store healed snapshot");
                        detail.error = Some(err.to_string());
                        log_entry(false, Some(200), Some(err.to_string()))
                    }
                }
            }
            Err(err) => {
                detail.terminal = err.is_terminal();
                detail.http_status_code = err.status_code();
                detail.error = Some(err.to_string());

                let failure = RetryFailure {
                    error_message: err.to_string(),
                    http_status_code: err.status_code(),
                    issues: vec![format!(
                        "retry failed after {} attempt(s): {}",
                        outcome.attempts, err
                    )],
                    at: now,
                };
                match self.store.record_retry_failure(snapshot.id, failure).await {
                    Ok(retry_count) => {
                        detail.retry_count = retry_count;
                        detail.max_retries_reached = retry_count >= max_retry_count;
                    }
                    Err(store_err) => {
                        warn!(snapshot_id = %snapshot.id, error = %store_err, "failed to record retry failure");
                    }
                }
                warn!(
                    entity_id = %snapshot.entity_id,
                    endpoint = %snapshot.endpoint,
                    attempts = outcome.attempts,
                    terminal = detail.terminal,
                    error = %err,
                    "retry failed"
                );
                log_entry(false, err.status_code(), Some(err.to_string()))
            }
        };

        if let Err(err) = self.store.append_retry_log(entry).await {
            warn!(snapshot_id = %snapshot.id, error = %err, "failed to append retry log");
        }

        detail
    }

    async fn fetch_with_backoff(&self, snapshot: &RawSnapshot) -> AttemptOutcome {
        let started = Instant::now();
        let max_attempts = self.settings.retry_attempts.max(1);
        let mut attempt = 0;

        let result = loop {
            attempt += 1;
            match self.source.fetch(&snapshot.entity_id, snapshot.endpoint).await {
                Ok(payload) => break Ok(payload),
                Err(err) if err.is_terminal() || attempt >= max_attempts => break Err(err),
                Err(err) => {
                    let delay = self.settings.backoff_for_attempt(attempt);
                    debug!(entity_id = %snapshot.entity_id, attempt, ?delay, error = %err, "retryable failure, backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        };

        AttemptOutcome {
            attempts: attempt,
            latency_ms: started.elapsed().as_millis() as u64,
            result,
        }
    }

    async fn signal_pending_queue(&self) -> bool {
        let Some(trigger) = &self.trigger else {
            return false;
        };
        match self.store.pending_queue_entries().await {
            Ok(0) => false,
            Ok(pending) => {
                info!(pending, "pending queue entries found, waking queue worker");
                trigger.signal();
                true
            }
            Err(err) => {
                warn!(error = %err, "could not count pending queue entries");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::SyncCollector;
    use crate::store::MemoryStore;
    use crate::test_support::{partial_snapshot, FakeSource};
    use serde_json::json;
    use staffsync_protocol::queue::NewQueueEntry;
    use staffsync_protocol::snapshot::SnapshotEndpoint;
    use std::time::Duration;

    fn handler(store: &MemoryStore, source: &Arc<FakeSource>) -> RetryHandler {
        RetryHandler::new(Arc::new(store.clone()), source.clone(), SyncSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_exhaust_attempts_with_growing_delay() {
        let store = MemoryStore::new();
        store.insert_raw(partial_snapshot("e-1", SnapshotEndpoint::Employments, 0, None));
        let source = Arc::new(FakeSource::new());
        source.respond("e-1", SnapshotEndpoint::Employments, Err(FetchError::status(500, "boom")));

        let started = tokio::time::Instant::now();
        let result = handler(&store, &source).run(&RetryRequest::default()).await.unwrap();

        assert_eq!(source.calls("e-1", SnapshotEndpoint::Employments), 3);
        // 1s after the first attempt, 2s after the second.
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert_eq!(result.failed_retries, 1);
        assert_eq!(result.details[0].attempts, 3);
        assert_eq!(result.details[0].retry_count, 1);
        assert!(!result.details[0].terminal);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_stops_after_one_attempt() {
        let store = MemoryStore::new();
        store.insert_raw(partial_snapshot("e-1", SnapshotEndpoint::Employee, 0, None));
        let source = Arc::new(FakeSource::new());
        source.respond("e-1", SnapshotEndpoint::Employee, Err(FetchError::status(404, "gone")));

        let result = handler(&store, &source).run(&RetryRequest::default()).await.unwrap();

        assert_eq!(source.calls("e-1", SnapshotEndpoint::Employee), 1);
        let detail = &result.details[0];
        assert!(detail.terminal);
        assert_eq!(detail.attempts, 1);
        assert_eq!(detail.http_status_code, Some(404));
        assert_eq!(store.retry_log().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn last_allowed_failure_removes_row_from_candidates() {
        let store = MemoryStore::new();
        store.insert_raw(partial_snapshot("e-1", SnapshotEndpoint::Employments, 4, None));
        let source = Arc::new(FakeSource::new());
        source.respond("e-1", SnapshotEndpoint::Employments, Err(FetchError::Timeout("slow".into())));
        let handler = handler(&store, &source);

        let first = handler.run(&RetryRequest::default()).await.unwrap();
        assert_eq!(first.max_retries_reached, 1);
        assert_eq!(first.details[0].retry_count, 5);

        let second = handler
            .run(&RetryRequest {
                limit: Some(10),
                max_retry_count: Some(5),
            })
            .await
            .unwrap();
        assert_eq!(second.processed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_promotes_row_and_logs() {
        let store = MemoryStore::new();
        store.insert_raw(partial_snapshot("e-1", SnapshotEndpoint::Employee, 1, None));
        let source = Arc::new(FakeSource::new());
        source.respond("e-1", SnapshotEndpoint::Employee, Ok(json!({"id": "e-1"})));

        let result = handler(&store, &source).run(&RetryRequest::default()).await.unwrap();
        assert_eq!(result.succeeded_retries, 1);

        let row = &store.all_snapshots()[0];
        assert!(!row.is_partial);
        assert!(row.retry_succeeded_at.is_some());
        assert!(row.error_message.is_none());
        assert_eq!(row.confidence_score, 1.0);
        assert_eq!(row.payload, json!({"id": "e-1"}));

        let log = store.retry_log();
        assert_eq!(log.len(), 1);
        assert!(log[0].success);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_partial_row_is_not_retried() {
        let store = MemoryStore::new();
        let source = Arc::new(FakeSource::new());
        source.respond("e-1", SnapshotEndpoint::Employments, Err(FetchError::status(503, "unavailable")));
        let collector = SyncCollector::new(Arc::new(store.clone()), source.clone(), SyncSettings::default());
        let ids = ["e-1".to_string()];

        collector.collect(&ids).await;
        source.respond("e-1", SnapshotEndpoint::Employments, Ok(json!({"salary": []})));
        collector.collect(&ids).await;
        assert_eq!(source.calls("e-1", SnapshotEndpoint::Employments), 2);

        let result = handler(&store, &source).run(&RetryRequest::default()).await.unwrap();

        assert_eq!(result.processed, 0);
        assert_eq!(source.calls("e-1", SnapshotEndpoint::Employments), 2);
        let rows: Vec<_> = store
            .all_snapshots()
            .into_iter()
            .filter(|row| row.endpoint == SnapshotEndpoint::Employments)
            .map(|row| (row.is_latest, row.is_partial))
            .collect();
        assert_eq!(rows, vec![(false, true), (true, false)]);
        assert!(store.retry_log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_queue_entries_are_resignalled() {
        let store = MemoryStore::new();
        store
            .enqueue(NewQueueEntry::timeline_batch(&["e-1".to_string()], 50, "sync"))
            .await
            .unwrap();
        let source = Arc::new(FakeSource::new());
        let trigger = QueueTrigger::new();

        let result = handler(&store, &source)
            .with_queue_trigger(trigger.clone())
            .run(&RetryRequest::default())
            .await
            .unwrap();

        assert!(result.queue_signalled);
        tokio::time::timeout(Duration::from_millis(10), trigger.notified())
            .await
            .expect("worker should have been signalled");
    }
}
