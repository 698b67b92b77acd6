use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SnapshotEndpoint;

/// Audit row written for every snapshot the retry handler works on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryLogEntry {
    pub id: Uuid,
    pub snapshot_id: Uuid,
    pub entity_id: String,
    pub endpoint: SnapshotEndpoint,
    pub attempt_number: u32,
    pub success: bool,
    pub latency_ms: u64,
    pub http_status_code: Option<u16>,
    pub error_message: Option<String>,
    pub attempted_at: DateTime<Utc>,
}
