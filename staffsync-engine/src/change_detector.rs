//! Turns the nested period arrays of `/employments` snapshots into explicit
//! change records.
//!
//! Salary and hours produce a record for every adjacent pair of periods,
//! zero deltas included, because a new period at the same rate still marks a
//! dated event. Contract records only appear when the duration label moves.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};
use staffsync_core::config::SyncSettings;
use staffsync_protocol::api::{ChangeDetectionMode, ChangeDetectionRequest};
use staffsync_protocol::change::{BusinessImpact, ChangeType, NewChangeRecord};
use staffsync_protocol::history::{sort_by_start, EmploymentHistory, Period};
use staffsync_protocol::report::{EntityError, SyncResult};
use staffsync_protocol::snapshot::{RawSnapshot, SnapshotEndpoint};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::store::SyncStore;

pub struct ChangeDetector {
    store: Arc<dyn SyncStore>,
    settings: SyncSettings,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn SyncStore>, settings: SyncSettings) -> Self {
        Self { store, settings }
    }

    pub async fn detect(&self, request: &ChangeDetectionRequest) -> Result<SyncResult, EngineError> {
        let scope = match request.mode {
            ChangeDetectionMode::Full => None,
            ChangeDetectionMode::Scoped => match request.employee_ids.as_deref() {
                Some(ids) if !ids.is_empty() => Some(ids),
                _ => {
                    return Err(EngineError::InvalidRequest(
                        "scoped change detection needs employeeIds".into(),
                    ))
                }
            },
        };

        let snapshots = self
            .store
            .latest_snapshots(SnapshotEndpoint::Employments, scope)
            .await?;
        Ok(self.detect_in(&snapshots).await)
    }

    /// Runs detection over the given snapshots; partial rows carry no
    /// periods and are skipped.
    pub async fn detect_in(&self, snapshots: &[RawSnapshot]) -> SyncResult {
        let mut result = SyncResult::new(self.settings.error_list_cap);

        for snapshot in snapshots.iter().filter(|row| !row.is_partial) {
            result.snapshots_processed += 1;

            let (history, issues) = EmploymentHistory::from_payload(&snapshot.payload);
            if !issues.is_empty() {
                debug!(entity_id = %snapshot.entity_id, ?issues, "skipped unreadable periods");
            }
            let shared = shared_start_dates(&history);
            if !shared.is_empty() {
                warn!(
                    entity_id = %snapshot.entity_id,
                    ?shared,
                    "periods share a start date, only the first change on each date is kept"
                );
            }

            for record in derive_changes(snapshot, history) {
                let change_type = record.change_type;
                let effective_date = record.effective_date;
                let field_name = record.field_name.clone();
                match self.store.insert_change_record(record).await {
                    Ok(Some(_)) => {
                        result.total_changes += 1;
                        match change_type {
                            ChangeType::SalaryChange => result.salary_changes += 1,
                            ChangeType::HoursChange => result.hours_changes += 1,
                            ChangeType::ContractChange => result.contract_changes += 1,
                        }
                    }
                    Ok(None) => {
                        debug!(
                            entity_id = %snapshot.entity_id,
                            change_type = change_type.as_str(),
                            field = %field_name,
                            %effective_date,
                            "change record already stored"
                        );
                        result.skipped_existing += 1;
                    }
                    Err(err) => {
                        warn!(entity_id = %snapshot.entity_id, error = %err, "failed to store change record");
                        result.errors.push(
                            EntityError::new(snapshot.entity_id.clone(), err.to_string())
                                .at(SnapshotEndpoint::Employments),
                        );
                        break;
                    }
                }
            }
        }

        info!(
            snapshots = result.snapshots_processed,
            changes = result.total_changes,
            skipped = result.skipped_existing,
            errors = result.errors.error_count,
            "change detection finished"
        );
        result
    }
}

/// Every change implied by one snapshot's periods, in chronological order per kind.
pub fn derive_changes(snapshot: &RawSnapshot, mut history: EmploymentHistory) -> Vec<NewChangeRecord> {
    sort_by_start(&mut history.salary);
    sort_by_start(&mut history.hours);
    sort_by_start(&mut history.contracts);

    let base = |change_type, field_name: &str, effective_date, business_impact, meta| NewChangeRecord {
        entity_id: snapshot.entity_id.clone(),
        change_type,
        field_name: field_name.to_string(),
        effective_date,
        old_value: None,
        new_value: None,
        change_amount: None,
        change_percent: None,
        confidence_score: snapshot.confidence_score,
        business_impact,
        metadata: meta,
    };

    let mut records = Vec::new();

    for pair in history.salary.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let (Some((_, old)), Some((field, new))) = (previous.amount(), current.amount()) else {
            continue;
        };
        let (amount, percent) = delta(old, new);
        let impact = if amount > 0.0 {
            BusinessImpact::SalaryIncrease
        } else {
            BusinessImpact::SalaryDecrease
        };
        records.push(NewChangeRecord {
            old_value: Some(json!(old)),
            new_value: Some(json!(new)),
            change_amount: Some(amount),
            change_percent: Some(percent),
            ..base(
                ChangeType::SalaryChange,
                field,
                current.start_date,
                impact,
                metadata(snapshot, previous.start_date, current.end_date),
            )
        });
    }

    for pair in history.hours.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let (Some(old), Some(new)) = (previous.hours_per_week, current.hours_per_week) else {
            continue;
        };
        let (amount, percent) = delta(old, new);
        let impact = if amount > 0.0 {
            BusinessImpact::HoursIncrease
        } else {
            BusinessImpact::HoursDecrease
        };
        records.push(NewChangeRecord {
            old_value: Some(json!(old)),
            new_value: Some(json!(new)),
            change_amount: Some(amount),
            change_percent: Some(percent),
            ..base(
                ChangeType::HoursChange,
                "hours_per_week",
                current.start_date,
                impact,
                metadata(snapshot, previous.start_date, current.end_date),
            )
        });
    }

    for pair in history.contracts.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        if previous.contract_duration == current.contract_duration {
            continue;
        }
        let impact = if current.is_permanent() {
            BusinessImpact::PermanentContract
        } else {
            BusinessImpact::ContractRenewal
        };
        records.push(NewChangeRecord {
            old_value: previous.contract_duration.as_ref().map(|label| json!(label)),
            new_value: current.contract_duration.as_ref().map(|label| json!(label)),
            ..base(
                ChangeType::ContractChange,
                "contract_duration",
                current.start_date,
                impact,
                metadata(snapshot, previous.start_date, current.end_date),
            )
        });
    }

    records
}

/// Start dates used by more than one period of the same kind. Changes dated
/// on them share a record identity, so the store keeps only the first.
pub fn shared_start_dates(history: &EmploymentHistory) -> Vec<(ChangeType, NaiveDate)> {
    let kinds = [
        (ChangeType::SalaryChange, history.salary.iter().map(Period::start_date).collect::<Vec<_>>()),
        (ChangeType::HoursChange, history.hours.iter().map(Period::start_date).collect()),
        (ChangeType::ContractChange, history.contracts.iter().map(Period::start_date).collect()),
    ];

    let mut shared = Vec::new();
    for (kind, mut dates) in kinds {
        dates.sort();
        for pair in dates.windows(2) {
            if pair[0] == pair[1] && shared.last() != Some(&(kind, pair[0])) {
                shared.push((kind, pair[0]));
            }
        }
    }
    shared
}

/// Absolute and relative change; a zero baseline yields a 0% change.
fn delta(old: f64, new: f64) -> (f64, f64) {
    let amount = new - old;
    let percent = if old == 0.0 { 0.0 } else { amount / old * 100.0 };
    (amount, percent)
}

fn metadata(
    snapshot: &RawSnapshot,
    previous_start: NaiveDate,
    end_date: Option<NaiveDate>,
) -> Value {
    json!({
        "snapshot_id": snapshot.id,
        "previous_start_date": previous_start,
        "end_date": end_date,
    })
}
