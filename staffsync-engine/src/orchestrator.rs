use std::sync::Arc;

use staffsync_protocol::api::{HybridProcessing, SyncMode, SyncRequest, SyncResponse, SyncSummary};
use staffsync_protocol::queue::NewQueueEntry;
use tracing::info;

use crate::collector::SyncCollector;
use crate::error::EngineError;
use crate::queue::QueueTrigger;
use crate::store::SyncStore;
use crate::timeline::TimelineProcessor;

/// Priority given to timeline batches deferred by a background sync.
pub const BACKGROUND_PRIORITY: i32 = 50;

/// Single sync entry point: collect, then build timelines now or later
/// depending on whether a user is waiting.
pub struct SyncOrchestrator {
    store: Arc<dyn SyncStore>,
    collector: Arc<SyncCollector>,
    timeline: Arc<TimelineProcessor>,
    trigger: QueueTrigger,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn SyncStore>,
        collector: Arc<SyncCollector>,
        timeline: Arc<TimelineProcessor>,
        trigger: QueueTrigger,
    ) -> Self {
        Self {
            store,
            collector,
            timeline,
            trigger,
        }
    }

    pub async fn run(&self, request: &SyncRequest) -> Result<SyncResponse, EngineError> {
        info!(source = %request.source, mode = %request.mode, triggered_by = ?request.triggered_by, "sync started");

        let collector = match &request.employee_ids {
            Some(ids) => self.collector.collect(ids).await,
            None => self.collector.collect_all().await?,
        };
        let entity_ids = collector.processed_entity_ids.clone();

        let mut timeline = None;
        let mut queue_entry_id = None;
        let hybrid_processing = match request.mode {
            SyncMode::Interactive => {
                let source = format!("sync:{}", request.source);
                timeline = Some(self.timeline.process(&entity_ids, &source).await);
                HybridProcessing {
                    immediate: entity_ids.len(),
                    queued: 0,
                    mode: request.mode,
                }
            }
            SyncMode::Background if entity_ids.is_empty() => HybridProcessing {
                immediate: 0,
                queued: 0,
                mode: request.mode,
            },
            SyncMode::Background => {
                let created_by = request
                    .triggered_by
                    .clone()
                    .unwrap_or_else(|| request.source.clone());
                let entry = self
                    .store
                    .enqueue(NewQueueEntry::timeline_batch(&entity_ids, BACKGROUND_PRIORITY, created_by))
                    .await?;
                self.trigger.signal();
                info!(entry_id = %entry.id, count = entity_ids.len(), "timeline batch queued");
                queue_entry_id = Some(entry.id);
                HybridProcessing {
                    immediate: 0,
                    queued: entity_ids.len(),
                    mode: request.mode,
                }
            }
        };

        let unchanged = collector.unchanged_entities;
        let summary = SyncSummary {
            processed: collector.processed_entity_ids.len() - unchanged,
            unchanged,
            errored: collector.errors.error_count,
            collector,
            timeline,
            queue_entry_id,
        };

        info!(
            processed = summary.processed,
            unchanged = summary.unchanged,
            errored = summary.errored,
            immediate = hybrid_processing.immediate,
            queued = hybrid_processing.queued,
            "sync finished"
        );

        Ok(SyncResponse {
            success: true,
            result: summary,
            hybrid_processing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payroll::FetchError;
    use crate::store::MemoryStore;
    use crate::test_support::FakeSource;
    use serde_json::json;
    use staffsync_core::config::SyncSettings;
    use staffsync_protocol::snapshot::SnapshotEndpoint;
    use std::time::Duration;

    fn orchestrator(store: &MemoryStore, source: Arc<FakeSource>, trigger: QueueTrigger) -> SyncOrchestrator {
        let shared: Arc<dyn SyncStore> = Arc::new(store.clone());
        let settings = SyncSettings::default();
        SyncOrchestrator::new(
            shared.clone(),
            Arc::new(SyncCollector::new(shared.clone(), source, settings.clone())),
            Arc::new(TimelineProcessor::new(shared, settings)),
            trigger,
        )
    }

    fn scripted_source() -> Arc<FakeSource> {
        let source = FakeSource::with_employees(&["e-1", "e-2"]);
        for id in ["e-1", "e-2"] {
            source.respond(id, SnapshotEndpoint::Employee, Ok(json!({"id": id, "start_date": "2021-01-01"})));
            source.respond(
                id,
                SnapshotEndpoint::Employments,
                Ok(json!({"salary": [{"start_date": "2021-01-01", "month_wage": 2000}]})),
            );
        }
        Arc::new(source)
    }

    fn request(mode: SyncMode) -> SyncRequest {
        SyncRequest {
            source: "dashboard".to_string(),
            mode,
            triggered_by: Some("user-9".to_string()),
            employee_ids: None,
        }
    }

    #[tokio::test]
    async fn interactive_sync_builds_timelines_immediately() {
        let store = MemoryStore::new();
        let response = orchestrator(&store, scripted_source(), QueueTrigger::new())
            .run(&request(SyncMode::Interactive))
            .await
            .unwrap();

        assert_eq!(response.hybrid_processing.immediate, 2);
        assert_eq!(response.hybrid_processing.queued, 0);
        assert_eq!(response.result.processed, 2);
        let timeline = response.result.timeline.unwrap();
        assert_eq!(timeline.employees_with_events, 2);
        assert!(store.queue_entries().is_empty());
    }

    #[tokio::test]
    async fn background_sync_queues_and_signals() {
        let store = MemoryStore::new();
        let trigger = QueueTrigger::new();
        let response = orchestrator(&store, scripted_source(), trigger.clone())
            .run(&request(SyncMode::Background))
            .await
            .unwrap();

        assert_eq!(response.hybrid_processing.immediate, 0);
        assert_eq!(response.hybrid_processing.queued, 2);
        assert!(response.result.timeline.is_none());
        assert_eq!(store.event_count(), 0);

        let entries = store.queue_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entity_ids(), vec!["e-1".to_string(), "e-2".to_string()]);
        assert_eq!(entries[0].created_by, "user-9");
        assert_eq!(response.result.queue_entry_id, Some(entries[0].id));

        tokio::time::timeout(Duration::from_millis(10), trigger.notified())
            .await
            .expect("queue worker should have been signalled");
    }

    #[tokio::test]
    async fn failed_entities_do_not_block_the_rest() {
        let store = MemoryStore::new();
        let source = scripted_source();
        source.respond("e-2", SnapshotEndpoint::Employee, Err(FetchError::status(403, "revoked")));
        source.respond("e-2", SnapshotEndpoint::Employments, Err(FetchError::status(403, "revoked")));

        let response = orchestrator(&store, source, QueueTrigger::new())
            .run(&request(SyncMode::Interactive))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.result.errored, 1);
        assert_eq!(response.hybrid_processing.immediate, 1);
        assert_eq!(response.result.collector.processed_entity_ids, vec!["e-1".to_string()]);
    }

    #[tokio::test]
    async fn partially_collected_entity_still_gets_a_timeline() {
        let store = MemoryStore::new();
        let source = scripted_source();
        source.respond("e-2", SnapshotEndpoint::Employee, Err(FetchError::status(503, "unavailable")));

        let response = orchestrator(&store, source, QueueTrigger::new())
            .run(&request(SyncMode::Interactive))
            .await
            .unwrap();

        assert_eq!(response.result.errored, 1);
        assert_eq!(response.hybrid_processing.immediate, 2);
        assert_eq!(
            response.result.collector.processed_entity_ids,
            vec!["e-1".to_string(), "e-2".to_string()]
        );
        assert_eq!(response.result.timeline.unwrap().employees_with_events, 2);
    }

    #[tokio::test]
    async fn second_sync_reports_unchanged_entities() {
        let store = MemoryStore::new();
        let orchestrator = orchestrator(&store, scripted_source(), QueueTrigger::new());
        orchestrator.run(&request(SyncMode::Interactive)).await.unwrap();

        let again = orchestrator.run(&request(SyncMode::Interactive)).await.unwrap();
        assert_eq!(again.result.processed, 0);
        assert_eq!(again.result.unchanged, 2);
        assert_eq!(again.result.timeline.unwrap().events_created, 0);
    }
}
