use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use mockall::mock;
use serde_json::{json, Value};
use staffsync::prelude::*;
use staffsync_engine::{derive_changes, FetchError, QueueTrigger};
use test_case::test_case;
use uuid::Uuid;

mock! {
    pub Payroll {}

    #[async_trait]
    impl PayrollSource for Payroll {
        async fn list_employee_ids(&self) -> Result<Vec<String>, FetchError>;
        async fn fetch(&self, entity_id: &str, endpoint: SnapshotEndpoint) -> Result<Value, FetchError>;
    }
}

fn employee(id: &str) -> Value {
    json!({"id": id, "first_name": "Sam", "last_name": id, "start_date": "2022-03-01"})
}

fn employments(month_wage: f64) -> Value {
    json!({
        "salary": [{"start_date": "2022-03-01", "month_wage": month_wage}],
        "hours": [{"start_date": "2022-03-01", "hours_per_week": 32}],
        "contracts": [{"start_date": "2022-03-01", "contract_duration": "fixed"}]
    })
}

fn healthy_payload(entity_id: &str, endpoint: SnapshotEndpoint) -> Value {
    match endpoint {
        SnapshotEndpoint::Employee => employee(entity_id),
        SnapshotEndpoint::Employments => employments(2500.0),
    }
}

fn shared(store: &MemoryStore) -> Arc<dyn SyncStore> {
    Arc::new(store.clone())
}

fn fast_settings() -> SyncSettings {
    SyncSettings {
        retry_base_delay: Duration::from_millis(100),
        retry_cooldown: Duration::ZERO,
        ..SyncSettings::default()
    }
}

#[tokio::test]
async fn one_failing_entity_in_a_batch_yields_exactly_one_error() {
    let mut payroll = MockPayroll::new();
    payroll
        .expect_list_employee_ids()
        .times(1)
        .returning(|| Ok((1..=5).map(|n| format!("e-{n}")).collect()));
    payroll.expect_fetch().returning(|entity_id, endpoint| {
        if entity_id == "e-3" {
            Err(FetchError::status(500, "upstream exploded"))
        } else {
            Ok(healthy_payload(entity_id, endpoint))
        }
    });

    let store = MemoryStore::new();
    let collector = SyncCollector::new(shared(&store), Arc::new(payroll), SyncSettings::default());
    let result = collector.collect_all().await.unwrap();

    assert_eq!(result.total_entities, 5);
    assert_eq!(result.processed_entity_ids.len(), 4);
    assert!(!result.processed_entity_ids.contains(&"e-3".to_string()));
    assert_eq!(result.errors.error_count, 1);
    assert_eq!(result.errors.errors[0].entity_id, "e-3");
    assert_eq!(result.errors.errors[0].http_status_code, Some(500));
    assert_eq!(result.partial_records, 2);
    assert_eq!(result.employees.new, 4);
}

#[tokio::test]
async fn listing_failure_aborts_the_run() {
    let mut payroll = MockPayroll::new();
    payroll
        .expect_list_employee_ids()
        .returning(|| Err(FetchError::status(401, "bad key")));
    payroll.expect_fetch().never();

    let store = MemoryStore::new();
    let collector = SyncCollector::new(shared(&store), Arc::new(payroll), SyncSettings::default());
    let err = collector.collect_all().await.unwrap_err();
    assert!(matches!(err, EngineError::Source(FetchError::Status { status: 401, .. })));
    assert!(store.all_snapshots().is_empty());
}

#[tokio::test(start_paused = true)]
async fn terminal_failures_are_fetched_once_and_transient_ones_retried() {
    let store = MemoryStore::new();
    store.insert_raw(
        NewSnapshot::partial("gone", SnapshotEndpoint::Employee, Some(503), "unavailable")
            .into_snapshot(Uuid::new_v4(), Utc::now()),
    );
    store.insert_raw(
        NewSnapshot::partial("flaky", SnapshotEndpoint::Employee, Some(503), "unavailable")
            .into_snapshot(Uuid::new_v4(), Utc::now()),
    );

    let mut payroll = MockPayroll::new();
    payroll
        .expect_fetch()
        .withf(|entity_id, _| entity_id.to_string() == "gone")
        .times(1)
        .returning(|_, _| Err(FetchError::status(404, "gone")));
    payroll
        .expect_fetch()
        .withf(|entity_id, _| entity_id.to_string() == "flaky")
        .times(3)
        .returning(|_, _| Err(FetchError::status(500, "still down")));

    let handler = RetryHandler::new(shared(&store), Arc::new(payroll), fast_settings());
    let result = handler.run(&RetryRequest::default()).await.unwrap();

    assert_eq!(result.processed, 2);
    assert_eq!(result.failed_retries, 2);
    let gone = result.details.iter().find(|d| d.entity_id == "gone").unwrap();
    assert!(gone.terminal);
    assert_eq!(gone.attempts, 1);
    let flaky = result.details.iter().find(|d| d.entity_id == "flaky").unwrap();
    assert!(!flaky.terminal);
    assert_eq!(flaky.attempts, 3);

    for row in store.all_snapshots() {
        assert_eq!(row.retry_count, 1, "{} should have one recorded retry", row.entity_id);
    }
    assert_eq!(store.retry_log().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn retries_stop_once_the_budget_is_spent() {
    let store = MemoryStore::new();
    store.insert_raw(
        NewSnapshot::partial("flaky", SnapshotEndpoint::Employments, Some(503), "unavailable")
            .into_snapshot(Uuid::new_v4(), Utc::now()),
    );

    let mut payroll = MockPayroll::new();
    payroll
        .expect_fetch()
        .returning(|_, _| Err(FetchError::status(502, "bad gateway")));

    let request = RetryRequest {
        limit: None,
        max_retry_count: Some(2),
    };
    let handler = RetryHandler::new(shared(&store), Arc::new(payroll), fast_settings());

    let first = handler.run(&request).await.unwrap();
    assert_eq!(first.processed, 1);
    assert!(!first.details[0].max_retries_reached);

    let second = handler.run(&request).await.unwrap();
    assert_eq!(second.max_retries_reached, 1);

    let third = handler.run(&request).await.unwrap();
    assert_eq!(third.processed, 0);
    assert_eq!(store.all_snapshots()[0].retry_count, 2);
}

#[tokio::test(start_paused = true)]
async fn healed_snapshot_feeds_change_detection() {
    let store = MemoryStore::new();
    store.insert_raw(
        NewSnapshot::partial("e-1", SnapshotEndpoint::Employments, Some(503), "unavailable")
            .into_snapshot(Uuid::new_v4(), Utc::now()),
    );

    let mut payroll = MockPayroll::new();
    payroll.expect_fetch().times(1).returning(|_, _| {
        Ok(json!({
            "salary": [
                {"start_date": "2022-03-01", "month_wage": 2500},
                {"start_date": "2023-01-01", "month_wage": 2750}
            ]
        }))
    });

    let handler = RetryHandler::new(shared(&store), Arc::new(payroll), fast_settings());
    let retry = handler.run(&RetryRequest::default()).await.unwrap();
    assert_eq!(retry.succeeded_retries, 1);

    let detector = ChangeDetector::new(shared(&store), SyncSettings::default());
    let result = detector.detect(&ChangeDetectionRequest::default()).await.unwrap();
    assert_eq!(result.salary_changes, 1);

    let changes = store.list_change_records("e-1").await.unwrap();
    assert_eq!(changes[0].business_impact, BusinessImpact::SalaryIncrease);
    assert_eq!(changes[0].effective_date, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
}

#[tokio::test]
async fn background_sync_defers_timelines_to_the_queue() {
    let mut payroll = MockPayroll::new();
    payroll
        .expect_list_employee_ids()
        .returning(|| Ok(vec!["e-1".to_string(), "e-2".to_string()]));
    payroll
        .expect_fetch()
        .returning(|entity_id, endpoint| Ok(healthy_payload(entity_id, endpoint)));

    let store = MemoryStore::new();
    let settings = SyncSettings::default();
    let collector = Arc::new(SyncCollector::new(shared(&store), Arc::new(payroll), settings.clone()));
    let timeline = Arc::new(TimelineProcessor::new(shared(&store), settings));
    let orchestrator = SyncOrchestrator::new(shared(&store), collector, timeline.clone(), QueueTrigger::new());

    let response = orchestrator
        .run(&SyncRequest {
            source: "nightly".to_string(),
            mode: SyncMode::Background,
            triggered_by: None,
            employee_ids: None,
        })
        .await
        .unwrap();

    assert_eq!(response.hybrid_processing.queued, 2);
    assert_eq!(response.hybrid_processing.immediate, 0);
    assert_eq!(store.event_count(), 0);

    let entries = store.queue_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].created_by, "nightly");
    assert_eq!(entries[0].status, QueueStatus::Pending);

    let processed = timeline.process(&entries[0].entity_ids(), "queue:nightly").await;
    assert_eq!(processed.employees_with_events, 2);
}

fn salary_snapshot(old: f64, new: f64) -> (RawSnapshot, EmploymentHistory) {
    let payload = json!({
        "salary": [
            {"start_date": "2023-01-01", "month_wage": old},
            {"start_date": "2024-01-01", "month_wage": new}
        ]
    });
    let (history, _) = EmploymentHistory::from_payload(&payload);
    let snapshot = NewSnapshot::complete("e-1", SnapshotEndpoint::Employments, payload)
        .into_snapshot(Uuid::new_v4(), Utc::now());
    (snapshot, history)
}

#[test_case(2000.0, 2100.0, BusinessImpact::SalaryIncrease, 5.0 ; "raise")]
#[test_case(2100.0, 2000.0, BusinessImpact::SalaryDecrease, -4.7619 ; "cut")]
#[test_case(2000.0, 2000.0, BusinessImpact::SalaryDecrease, 0.0 ; "unchanged amount")]
#[test_case(0.0, 1500.0, BusinessImpact::SalaryIncrease, 0.0 ; "zero baseline")]
fn salary_deltas(old: f64, new: f64, impact: BusinessImpact, percent: f64) {
    let (snapshot, history) = salary_snapshot(old, new);
    let changes = derive_changes(&snapshot, history);

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].business_impact, impact);
    assert_eq!(changes[0].change_amount, Some(new - old));
    let actual = changes[0].change_percent.unwrap();
    assert!((actual - percent).abs() < 1e-3, "expected {percent}, got {actual}");
}

#[test_case("fixed", "permanent", Some(BusinessImpact::PermanentContract) ; "to permanent")]
#[test_case("fixed", "PERMANENT", Some(BusinessImpact::PermanentContract) ; "case insensitive")]
#[test_case("permanent", "fixed", Some(BusinessImpact::ContractRenewal) ; "back to fixed")]
#[test_case("fixed", "fixed", None ; "same label")]
fn contract_changes(old: &str, new: &str, expected: Option<BusinessImpact>) {
    let payload = json!({
        "contracts": [
            {"start_date": "2023-01-01", "contract_duration": old},
            {"start_date": "2024-01-01", "contract_duration": new}
        ]
    });
    let (history, _) = EmploymentHistory::from_payload(&payload);
    let snapshot = NewSnapshot::complete("e-1", SnapshotEndpoint::Employments, payload)
        .into_snapshot(Uuid::new_v4(), Utc::now());

    let impacts: Vec<_> = derive_changes(&snapshot, history)
        .into_iter()
        .map(|change| change.business_impact)
        .collect();
    assert_eq!(impacts, expected.into_iter().collect::<Vec<_>>());
}

#[test_case(404, true ; "not found")]
#[test_case(403, true ; "forbidden")]
#[test_case(429, false ; "rate limited")]
#[test_case(500, false ; "server error")]
#[test_case(503, false ; "unavailable")]
fn upstream_status_classification(status: u16, terminal: bool) {
    assert_eq!(FetchError::status(status, "x").is_terminal(), terminal);
}
