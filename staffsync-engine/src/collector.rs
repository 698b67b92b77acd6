use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use staffsync_core::config::SyncSettings;
use staffsync_protocol::history::{payload_start_date, EmploymentHistory, Period};
use staffsync_protocol::report::{CollectorResult, EntityError};
use staffsync_protocol::snapshot::{content_hash, NewSnapshot, SnapshotEndpoint};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::payroll::PayrollSource;
use crate::store::SyncStore;

enum EndpointOutcome {
    Stored,
    Unchanged,
}

struct EndpointFailure {
    endpoint: SnapshotEndpoint,
    message: String,
    status: Option<u16>,
    partial_stored: bool,
}

/// Pulls employee and employment documents upstream and versions them in the
/// snapshot store.
pub struct SyncCollector {
    store: Arc<dyn SyncStore>,
    source: Arc<dyn PayrollSource>,
    settings: SyncSettings,
}

impl SyncCollector {
    pub fn new(store: Arc<dyn SyncStore>, source: Arc<dyn PayrollSource>, settings: SyncSettings) -> Self {
        Self {
            store,
            source,
            settings,
        }
    }

    /// Full sync: lists every employee upstream, then collects each one.
    ///
    /// Only a failure to list employees aborts the run.
    pub async fn collect_all(&self) -> Result<CollectorResult, EngineError> {
        let entity_ids = self.source.list_employee_ids().await?;
        info!(count = entity_ids.len(), "listed upstream employees");
        Ok(self.collect(&entity_ids).await)
    }

    /// Scoped sync over an explicit id list. Per-entity failures are reported
    /// in the result and never stop the batch.
    pub async fn collect(&self, entity_ids: &[String]) -> CollectorResult {
        let mut result = CollectorResult::new(self.settings.error_list_cap);
        result.total_entities = entity_ids.len();

        for entity_id in entity_ids {
            let mut failures = Vec::new();
            let mut stored_any = false;
            let mut succeeded_any = false;

            for endpoint in SnapshotEndpoint::ALL {
                let counts = match endpoint {
                    SnapshotEndpoint::Employee => &mut result.employees,
                    SnapshotEndpoint::Employments => &mut result.employments,
                };

                match self.collect_endpoint(entity_id, endpoint).await {
                    Ok(EndpointOutcome::Stored) => {
                        counts.new += 1;
                        stored_any = true;
                        succeeded_any = true;
                    }
                    Ok(EndpointOutcome::Unchanged) => {
                        counts.unchanged += 1;
                        succeeded_any = true;
                    }
                    Err(failure) => {
                        if failure.partial_stored {
                            result.partial_records += 1;
                        }
                        failures.push(failure);
                    }
                }
            }

            // Any endpoint that made it through still feeds timeline processing.
            if succeeded_any {
                result.processed_entity_ids.push(entity_id.clone());
            }
            if failures.is_empty() {
                if !stored_any {
                    result.unchanged_entities += 1;
                }
                continue;
            }

            let message = failures
                .iter()
                .map(|failure| format!("{}: {}", failure.endpoint, failure.message))
                .collect::<Vec<_>>()
                .join("; ");
            warn!(entity_id = %entity_id, %message, "entity collection failed");

            let first = &failures[0];
            result.errors.push(
                EntityError::new(entity_id.clone(), message)
                    .at(first.endpoint)
                    .status(first.status),
            );
        }

        info!(
            total = result.total_entities,
            processed = result.processed_entity_ids.len(),
            partial = result.partial_records,
            errors = result.errors.error_count,
            "collector run finished"
        );
        result
    }

    async fn collect_endpoint(
        &self,
        entity_id: &str,
        endpoint: SnapshotEndpoint,
    ) -> Result<EndpointOutcome, EndpointFailure> {
        let store_failure = |err: staffsync_core::SyncError| EndpointFailure {
            endpoint,
            message: err.to_string(),
            status: None,
            partial_stored: false,
        };

        let latest = self
            .store
            .latest_snapshot(entity_id, endpoint)
            .await
            .map_err(store_failure)?;

        let payload = match self.source.fetch(entity_id, endpoint).await {
            Ok(payload) => payload,
            Err(err) => {
                let mut partial_stored = false;
                if !err.is_terminal() && latest.is_none() {
                    let placeholder =
                        NewSnapshot::partial(entity_id, endpoint, err.status_code(), err.to_string());
                    self.store
                        .supersede_and_insert(placeholder, Utc::now())
                        .await
                        .map_err(store_failure)?;
                    partial_stored = true;
                    debug!(entity_id, %endpoint, "stored partial placeholder");
                }
                return Err(EndpointFailure {
                    endpoint,
                    message: err.to_string(),
                    status: err.status_code(),
                    partial_stored,
                });
            }
        };

        let now = Utc::now();
        let hash = content_hash(&payload);

        if let Some(latest) = latest.as_ref().filter(|row| row.content_hash == hash) {
            self.store
                .touch_verified(latest.id, now)
                .await
                .map_err(store_failure)?;
            return Ok(EndpointOutcome::Unchanged);
        }

        let mut snapshot = build_snapshot(entity_id, endpoint, payload);
        if latest.is_some() {
            // The new version opens exactly where the superseded one closes.
            snapshot = snapshot.effective_from(Some(now));
        }
        if !snapshot.collection_issues.is_empty() {
            debug!(entity_id, issues = ?snapshot.collection_issues, "payload has data-shape issues");
        }
        self.store
            .supersede_and_insert(snapshot, now)
            .await
            .map_err(store_failure)?;
        Ok(EndpointOutcome::Stored)
    }
}

fn build_snapshot(entity_id: &str, endpoint: SnapshotEndpoint, payload: Value) -> NewSnapshot {
    match endpoint {
        SnapshotEndpoint::Employee => {
            let start = payload_start_date(&payload);
            NewSnapshot::complete(entity_id, endpoint, payload).effective_from(start.and_then(midnight))
        }
        SnapshotEndpoint::Employments => {
            let (history, issues) = EmploymentHistory::from_payload(&payload);
            let start = payload_start_date(&payload).or_else(|| earliest_period(&history));
            NewSnapshot::complete(entity_id, endpoint, payload)
                .effective_from(start.and_then(midnight))
                .with_issues(issues)
        }
    }
}

fn earliest_period(history: &EmploymentHistory) -> Option<NaiveDate> {
    let salary = history.salary.iter().map(Period::start_date);
    let hours = history.hours.iter().map(Period::start_date);
    let contracts = history.contracts.iter().map(Period::start_date);
    salary.chain(hours).chain(contracts).min()
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc())
}
