//! Run summaries returned by every entry point.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::snapshot::SnapshotEndpoint;

pub const DEFAULT_ERROR_CAP: usize = 10;

fn default_cap() -> usize {
    DEFAULT_ERROR_CAP
}

/// Failure attributed to one entity during a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityError {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<SnapshotEndpoint>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
}

impl EntityError {
    pub fn new(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            endpoint: None,
            message: message.into(),
            http_status_code: None,
        }
    }

    pub fn at(mut self, endpoint: SnapshotEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn status(mut self, status: Option<u16>) -> Self {
        self.http_status_code = status;
        self
    }
}

/// Bounded error list that still counts everything pushed into it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorList {
    pub errors: Vec<EntityError>,
    pub error_count: usize,
    #[serde(skip, default = "default_cap")]
    cap: usize,
}

impl Default for ErrorList {
    fn default() -> Self {
        Self::with_cap(DEFAULT_ERROR_CAP)
    }
}

impl ErrorList {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            errors: Vec::new(),
            error_count: 0,
            cap,
        }
    }

    pub fn push(&mut self, error: EntityError) {
        self.error_count += 1;
        if self.errors.len() < self.cap {
            self.errors.push(error);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.error_count == 0
    }

    pub fn len(&self) -> usize {
        self.error_count
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncCounts {
    pub new: usize,
    pub unchanged: usize,
}

/// Summary of one collector run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectorResult {
    pub total_entities: usize,
    pub employees: SyncCounts,
    pub employments: SyncCounts,
    pub partial_records: usize,
    /// Entities collected without error whose snapshots were all unchanged.
    pub unchanged_entities: usize,
    pub processed_entity_ids: Vec<String>,
    #[serde(flatten)]
    pub errors: ErrorList,
}

impl CollectorResult {
    pub fn new(error_cap: usize) -> Self {
        Self {
            total_entities: 0,
            employees: SyncCounts::default(),
            employments: SyncCounts::default(),
            partial_records: 0,
            unchanged_entities: 0,
            processed_entity_ids: Vec::new(),
            errors: ErrorList::with_cap(error_cap),
        }
    }
}

/// Summary of one change-detector run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncResult {
    pub snapshots_processed: usize,
    pub salary_changes: usize,
    pub hours_changes: usize,
    pub contract_changes: usize,
    pub total_changes: usize,
    pub skipped_existing: usize,
    #[serde(flatten)]
    pub errors: ErrorList,
}

impl SyncResult {
    pub fn new(error_cap: usize) -> Self {
        Self {
            snapshots_processed: 0,
            salary_changes: 0,
            hours_changes: 0,
            contract_changes: 0,
            total_changes: 0,
            skipped_existing: 0,
            errors: ErrorList::with_cap(error_cap),
        }
    }
}

/// Outcome for a single snapshot the retry handler worked on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryDetail {
    pub snapshot_id: Uuid,
    pub entity_id: String,
    pub endpoint: SnapshotEndpoint,
    pub success: bool,
    pub attempts: u32,
    pub retry_count: u32,
    pub terminal: bool,
    pub max_retries_reached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetryResult {
    pub processed: usize,
    pub succeeded_retries: usize,
    pub failed_retries: usize,
    pub max_retries_reached: usize,
    pub queue_signalled: bool,
    pub details: Vec<RetryDetail>,
}

/// Summary of one timeline-processor run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineResult {
    pub employees_processed: usize,
    pub events_created: usize,
    pub employees_with_events: usize,
    #[serde(flatten)]
    pub errors: ErrorList,
}

impl TimelineResult {
    pub fn new(error_cap: usize) -> Self {
        Self {
            employees_processed: 0,
            events_created: 0,
            employees_with_events: 0,
            errors: ErrorList::with_cap(error_cap),
        }
    }
}
