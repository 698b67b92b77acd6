//! Request and response bodies of the HTTP entry points.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::report::{CollectorResult, RetryResult, SyncResult, TimelineResult};

/// Caller-declared intent: is a user waiting on the response?
/// Always stated by the caller; a request without it does not deserialize.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Interactive,
    Background,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Interactive => f.write_str("interactive"),
            SyncMode::Background => f.write_str("background"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRequest {
    pub source: String,
    pub mode: SyncMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    /// Restricts the collector to these entities instead of listing all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HybridProcessing {
    pub immediate: usize,
    pub queued: usize,
    pub mode: SyncMode,
}

/// Merged counts of a hybrid sync run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSummary {
    pub processed: usize,
    pub unchanged: usize,
    pub errored: usize,
    pub collector: CollectorResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<TimelineResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_entry_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncResponse {
    pub success: bool,
    pub result: SyncSummary,
    pub hybrid_processing: HybridProcessing,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetryRequest {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub max_retry_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryResponse {
    pub success: bool,
    pub result: RetryResult,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetectionMode {
    #[default]
    Full,
    Scoped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChangeDetectionRequest {
    #[serde(default)]
    pub mode: ChangeDetectionMode,
    #[serde(
        default,
        rename = "employeeIds",
        alias = "employee_ids",
        skip_serializing_if = "Option::is_none"
    )]
    pub employee_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeDetectionResponse {
    pub success: bool,
    pub result: SyncResult,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineProcessRequest {
    pub employee_ids: Vec<String>,
    #[serde(default = "default_timeline_source")]
    pub source: String,
}

fn default_timeline_source() -> String {
    "manual".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineProcessResponse {
    pub success: bool,
    pub result: TimelineResult,
}

/// Body returned with every non-200 response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(default, rename = "errorDetails", skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn change_detection_request_accepts_both_spellings() {
        let camel: ChangeDetectionRequest =
            serde_json::from_value(json!({"mode": "scoped", "employeeIds": ["1"]})).unwrap();
        let snake: ChangeDetectionRequest =
            serde_json::from_value(json!({"mode": "scoped", "employee_ids": ["1"]})).unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.mode, ChangeDetectionMode::Scoped);
    }

    #[test]
    fn sync_request_requires_an_explicit_mode() {
        let missing = serde_json::from_value::<SyncRequest>(json!({"source": "dashboard"}));
        assert!(missing.unwrap_err().to_string().contains("mode"));

        let request: SyncRequest =
            serde_json::from_value(json!({"source": "dashboard", "mode": "background"})).unwrap();
        assert_eq!(request.mode, SyncMode::Background);
        assert!(request.triggered_by.is_none());
    }
}
