use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use staffsync_protocol::snapshot::{NewSnapshot, RawSnapshot, SnapshotEndpoint};
use uuid::Uuid;

use crate::payroll::{FetchError, PayrollSource};

type Key = (String, SnapshotEndpoint);

/// Scripted payroll source. Unscripted pairs answer 404.
#[derive(Default)]
pub(crate) struct FakeSource {
    employees: Mutex<Vec<String>>,
    responses: Mutex<HashMap<Key, Result<Value, FetchError>>>,
    calls: Mutex<HashMap<Key, u32>>,
}

impl FakeSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_employees(ids: &[&str]) -> Self {
        let source = Self::new();
        *source.employees.lock() = ids.iter().map(|id| id.to_string()).collect();
        source
    }

    pub(crate) fn respond(&self, entity_id: &str, endpoint: SnapshotEndpoint, response: Result<Value, FetchError>) {
        self.responses
            .lock()
            .insert((entity_id.to_string(), endpoint), response);
    }

    pub(crate) fn calls(&self, entity_id: &str, endpoint: SnapshotEndpoint) -> u32 {
        self.calls
            .lock()
            .get(&(entity_id.to_string(), endpoint))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl PayrollSource for FakeSource {
    async fn list_employee_ids(&self) -> Result<Vec<String>, FetchError> {
        Ok(self.employees.lock().clone())
    }

    async fn fetch(&self, entity_id: &str, endpoint: SnapshotEndpoint) -> Result<Value, FetchError> {
        let key = (entity_id.to_string(), endpoint);
        *self.calls.lock().entry(key.clone()).or_insert(0) += 1;
        self.responses
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::status(404, "not scripted")))
    }
}

/// A latest, complete snapshot row for seeding stores directly.
pub(crate) fn snapshot(entity_id: &str, endpoint: SnapshotEndpoint, payload: Value) -> RawSnapshot {
    NewSnapshot::complete(entity_id, endpoint, payload).into_snapshot(Uuid::new_v4(), Utc::now())
}

/// A partial row with the given retry bookkeeping.
pub(crate) fn partial_snapshot(
    entity_id: &str,
    endpoint: SnapshotEndpoint,
    retry_count: u32,
    last_retry_at: Option<DateTime<Utc>>,
) -> RawSnapshot {
    let mut row = NewSnapshot::partial(entity_id, endpoint, Some(503), "unavailable")
        .into_snapshot(Uuid::new_v4(), Utc::now());
    row.retry_count = retry_count;
    row.last_retry_at = last_retry_at;
    row
}
