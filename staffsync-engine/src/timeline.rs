//! Presentation timeline built straight from raw snapshots.
//!
//! This walks the same period arrays as the change detector but with its own
//! rules: unchanged salaries produce no event, every contract period after the
//! first counts as a renewal, and hours events need an actual difference.

use std::sync::Arc;

use serde_json::json;
use staffsync_core::config::SyncSettings;
use staffsync_protocol::history::{payload_start_date, read_string, sort_by_start, EmploymentHistory};
use staffsync_protocol::report::{EntityError, TimelineResult};
use staffsync_protocol::snapshot::{RawSnapshot, SnapshotEndpoint};
use staffsync_protocol::timeline::{NewTimelineEvent, TimelineEventType};
use tracing::{debug, info, warn};

use crate::store::SyncStore;

const NAME_KEYS: &[&str] = &["full_name", "display_name", "name"];
const FIRST_NAME_KEYS: &[&str] = &["first_name", "firstName"];
const LAST_NAME_KEYS: &[&str] = &["last_name", "lastName", "surname"];

pub struct TimelineProcessor {
    store: Arc<dyn SyncStore>,
    settings: SyncSettings,
}

impl TimelineProcessor {
    pub fn new(store: Arc<dyn SyncStore>, settings: SyncSettings) -> Self {
        Self { store, settings }
    }

    /// Derives and stores the timeline of each entity. Existing events are
    /// never duplicated, so repeated runs over the same state are no-ops.
    pub async fn process(&self, entity_ids: &[String], source: &str) -> TimelineResult {
        let mut result = TimelineResult::new(self.settings.error_list_cap);

        for entity_id in entity_ids {
            result.employees_processed += 1;
            match self.process_entity(entity_id, source).await {
                Ok(created) => {
                    result.events_created += created;
                    if created > 0 {
                        result.employees_with_events += 1;
                    }
                }
                Err(message) => {
                    warn!(entity_id = %entity_id, source, %message, "timeline processing failed");
                    result.errors.push(EntityError::new(entity_id.clone(), message));
                }
            }
        }

        info!(
            source,
            employees = result.employees_processed,
            events = result.events_created,
            errors = result.errors.error_count,
            "timeline run finished"
        );
        result
    }

    async fn process_entity(&self, entity_id: &str, source: &str) -> Result<usize, String> {
        let employee = self.latest(entity_id, SnapshotEndpoint::Employee).await?;
        let employments = self.latest(entity_id, SnapshotEndpoint::Employments).await?;

        if employee.is_none() && employments.is_none() {
            return Err("no complete snapshots found for entity".to_string());
        }

        let mut created = 0;
        for event in derive_events(entity_id, employee.as_ref(), employments.as_ref(), source) {
            let lookup_date = match event.event_type {
                TimelineEventType::EmployeeAdded => None,
                _ => Some(event.event_date),
            };
            let exists = self
                .store
                .timeline_event_exists(entity_id, event.event_type, lookup_date)
                .await
                .map_err(|err| err.to_string())?;
            if exists {
                continue;
            }

            debug!(entity_id, event_type = %event.event_type, date = %event.event_date, "creating timeline event");
            self.store
                .insert_timeline_event(event)
                .await
                .map_err(|err| err.to_string())?;
            created += 1;
        }

        Ok(created)
    }

    async fn latest(&self, entity_id: &str, endpoint: SnapshotEndpoint) -> Result<Option<RawSnapshot>, String> {
        let row = self
            .store
            .latest_snapshot(entity_id, endpoint)
            .await
            .map_err(|err| err.to_string())?;
        Ok(row.filter(|row| !row.is_partial))
    }
}

/// Every event the snapshots imply, before de-duplication against the store.
pub fn derive_events(
    entity_id: &str,
    employee: Option<&RawSnapshot>,
    employments: Option<&RawSnapshot>,
    source: &str,
) -> Vec<NewTimelineEvent> {
    let event = |event_type, event_date, title: String, description: String, data| NewTimelineEvent {
        entity_id: entity_id.to_string(),
        event_type,
        event_date,
        event_title: title,
        event_description: description,
        event_data: data,
        change_id: None,
    };

    let mut events = Vec::new();

    if let Some(anchor) = employee.or(employments) {
        let start = employee.and_then(|row| payload_start_date(&row.payload));
        let name = employee.and_then(|row| display_name(&row.payload));
        let description = match &name {
            Some(name) => format!("{name} was added to the team"),
            None => "Employee was added to the team".to_string(),
        };
        events.push(event(
            TimelineEventType::EmployeeAdded,
            start.unwrap_or_else(|| anchor.collected_at.date_naive()),
            "Employee added".to_string(),
            description,
            json!({ "source": source, "snapshot_id": anchor.id, "name": name }),
        ));
    }

    let Some(employments) = employments else {
        return events;
    };
    let (mut history, _) = EmploymentHistory::from_payload(&employments.payload);
    sort_by_start(&mut history.salary);
    sort_by_start(&mut history.hours);
    sort_by_start(&mut history.contracts);

    if let Some(first) = history.salary.first() {
        let amount = first.amount();
        let description = match amount {
            Some((field, wage)) => format!("Started at {} {}", money(wage), wage_unit(field)),
            None => "Started a new contract".to_string(),
        };
        events.push(event(
            TimelineEventType::ContractStarted,
            first.start_date,
            "Contract started".to_string(),
            description,
            json!({
                "source": source,
                "salary": amount.map(|(_, wage)| wage),
                "wage_field": amount.map(|(field, _)| field),
                "end_date": first.end_date,
            }),
        ));
    }

    for pair in history.salary.windows(2) {
        let (Some((_, old)), Some((field, new))) = (pair[0].amount(), pair[1].amount()) else {
            continue;
        };
        if old == new {
            continue;
        }
        let change = new - old;
        let percent = if old == 0.0 { 0.0 } else { change / old * 100.0 };
        let (event_type, title) = if change > 0.0 {
            (TimelineEventType::SalaryIncrease, "Salary increase")
        } else {
            (TimelineEventType::SalaryDecrease, "Salary decrease")
        };
        events.push(event(
            event_type,
            pair[1].start_date,
            title.to_string(),
            format!(
                "Salary changed from {} to {} {} ({:+.1}%)",
                money(old),
                money(new),
                wage_unit(field),
                percent
            ),
            json!({
                "source": source,
                "previous_salary": old,
                "new_salary": new,
                "change_amount": change,
                "change_percent": percent,
                "wage_field": field,
            }),
        ));
    }

    for pair in history.contracts.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let description = match (&current.contract_duration, current.end_date) {
            (Some(duration), Some(end)) => format!("Contract renewed ({duration}) until {end}"),
            (Some(duration), None) => format!("Contract renewed ({duration})"),
            (None, Some(end)) => format!("Contract renewed until {end}"),
            (None, None) => "Contract renewed".to_string(),
        };
        events.push(event(
            TimelineEventType::ContractRenewed,
            current.start_date,
            "Contract renewed".to_string(),
            description,
            json!({
                "source": source,
                "previous_duration": previous.contract_duration,
                "new_duration": current.contract_duration,
                "is_signed": current.is_signed,
                "end_date": current.end_date,
            }),
        ));
    }

    for pair in history.hours.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let (Some(old), Some(new)) = (previous.hours_per_week, current.hours_per_week) else {
            continue;
        };
        if old == new {
            continue;
        }
        events.push(event(
            TimelineEventType::HoursChange,
            current.start_date,
            "Working hours changed".to_string(),
            format!("Hours changed from {} to {} per week", hours(old), hours(new)),
            json!({
                "source": source,
                "previous_hours": old,
                "new_hours": new,
                "days_per_week": current.days_per_week,
            }),
        ));
    }

    events
}

fn display_name(payload: &serde_json::Value) -> Option<String> {
    read_string(payload, NAME_KEYS).or_else(|| {
        let first = read_string(payload, FIRST_NAME_KEYS);
        let last = read_string(payload, LAST_NAME_KEYS);
        match (first, last) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (first, last) => first.or(last),
        }
    })
}

fn money(amount: f64) -> String {
    format!("€{amount:.2}")
}

fn wage_unit(field: &str) -> &'static str {
    match field {
        "hour_wage" => "per hour",
        _ => "per month",
    }
}

fn hours(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::{partial_snapshot, snapshot};
    use serde_json::Value;
    use staffsync_protocol::timeline::TimelineQuery;

    fn processor(store: &MemoryStore) -> TimelineProcessor {
        TimelineProcessor::new(Arc::new(store.clone()), SyncSettings::default())
    }

    fn seed(store: &MemoryStore, employee: Value, employments: Value) {
        store.insert_raw(snapshot("e-1", SnapshotEndpoint::Employee, employee));
        store.insert_raw(snapshot("e-1", SnapshotEndpoint::Employments, employments));
    }

    async fn events_of(store: &MemoryStore, event_type: &str) -> Vec<staffsync_protocol::timeline::TimelineEvent> {
        store
            .list_timeline_events(
                "e-1",
                &TimelineQuery {
                    event_type: Some(event_type.to_string()),
                    limit: None,
                    offset: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn hours_event_carries_previous_and_new_hours() {
        let store = MemoryStore::new();
        seed(
            &store,
            json!({"id": "e-1"}),
            json!({"hours": [
                {"start_date": "2023-07-01", "hours_per_week": 32},
                {"start_date": "2023-01-01", "hours_per_week": 20}
            ]}),
        );

        processor(&store).process(&["e-1".to_string()], "test").await;

        let hours = events_of(&store, "hours_change").await;
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].event_date.to_string(), "2023-07-01");
        assert_eq!(hours[0].event_data["previous_hours"], 20.0);
        assert_eq!(hours[0].event_data["new_hours"], 32.0);
        assert_eq!(hours[0].event_description, "Hours changed from 20 to 32 per week");
    }

    #[tokio::test]
    async fn unchanged_contract_label_still_renews() {
        let store = MemoryStore::new();
        seed(
            &store,
            json!({"id": "e-1"}),
            json!({"contracts": [
                {"start_date": "2022-01-01", "contract_duration": "fixed"},
                {"start_date": "2023-01-01", "contract_duration": "fixed"}
            ]}),
        );

        processor(&store).process(&["e-1".to_string()], "test").await;

        let renewals = events_of(&store, "contract_renewed").await;
        assert_eq!(renewals.len(), 1);
        assert_eq!(renewals[0].event_date.to_string(), "2023-01-01");
    }

    #[tokio::test]
    async fn unchanged_salary_emits_no_event() {
        let store = MemoryStore::new();
        seed(
            &store,
            json!({"id": "e-1", "first_name": "Ada", "last_name": "Jansen", "start_date": "2021-01-01"}),
            json!({"salary": [
                {"start_date": "2021-01-01", "month_wage": 2000},
                {"start_date": "2022-01-01", "month_wage": 2000},
                {"start_date": "2023-01-01", "month_wage": 2100}
            ]}),
        );

        let result = processor(&store).process(&["e-1".to_string()], "test").await;
        // employee_added, contract_started, one increase
        assert_eq!(result.events_created, 3);

        let added = events_of(&store, "employee_added").await;
        assert_eq!(added[0].event_date.to_string(), "2021-01-01");
        assert_eq!(added[0].event_description, "Ada Jansen was added to the team");

        let increases = events_of(&store, "salary_increase").await;
        assert_eq!(increases.len(), 1);
        assert_eq!(increases[0].event_date.to_string(), "2023-01-01");
        assert_eq!(
            increases[0].event_description,
            "Salary changed from €2000.00 to €2100.00 per month (+5.0%)"
        );
    }

    #[tokio::test]
    async fn second_run_creates_nothing() {
        let store = MemoryStore::new();
        seed(
            &store,
            json!({"id": "e-1"}),
            json!({
                "salary": [
                    {"start_date": "2021-01-01", "month_wage": 2000},
                    {"start_date": "2022-01-01", "month_wage": 1900}
                ],
                "contracts": [
                    {"start_date": "2021-01-01", "contract_duration": "fixed"},
                    {"start_date": "2022-01-01", "contract_duration": "permanent"}
                ]
            }),
        );
        let processor = processor(&store);

        let first = processor.process(&["e-1".to_string()], "test").await;
        assert_eq!(first.events_created, 4);
        assert_eq!(first.employees_with_events, 1);

        let second = processor.process(&["e-1".to_string()], "test").await;
        assert_eq!(second.events_created, 0);
        assert_eq!(second.employees_with_events, 0);
        assert_eq!(store.event_count(), 4);
    }

    #[tokio::test]
    async fn entity_without_snapshots_reports_an_error() {
        let store = MemoryStore::new();
        store.insert_raw(partial_snapshot("e-2", SnapshotEndpoint::Employee, 0, None));

        let result = processor(&store)
            .process(&["e-2".to_string(), "e-3".to_string()], "test")
            .await;
        assert_eq!(result.employees_processed, 2);
        assert_eq!(result.events_created, 0);
        assert_eq!(result.errors.error_count, 2);
    }
}
