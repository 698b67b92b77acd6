use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::content_hash;

/// Logical upstream resource whose responses are versioned independently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SnapshotEndpoint {
    #[serde(rename = "/employee")]
    Employee,
    #[serde(rename = "/employments")]
    Employments,
}

impl SnapshotEndpoint {
    pub const ALL: [SnapshotEndpoint; 2] = [SnapshotEndpoint::Employee, SnapshotEndpoint::Employments];

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotEndpoint::Employee => "/employee",
            SnapshotEndpoint::Employments => "/employments",
        }
    }

    /// Relative upstream path for the entity, without a leading slash.
    pub fn upstream_path(&self, entity_id: &str) -> String {
        match self {
            SnapshotEndpoint::Employee => format!("employees/{}", entity_id),
            SnapshotEndpoint::Employments => format!("employees/{}/employments", entity_id),
        }
    }
}

impl fmt::Display for SnapshotEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotEndpoint {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "/employee" | "employee" => Ok(SnapshotEndpoint::Employee),
            "/employments" | "employments" => Ok(SnapshotEndpoint::Employments),
            other => Err(format!("unknown snapshot endpoint: {other}")),
        }
    }
}

/// One stored version of an upstream payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawSnapshot {
    pub id: Uuid,
    pub entity_id: String,
    pub endpoint: SnapshotEndpoint,
    pub payload: Value,
    pub content_hash: String,
    pub collected_at: DateTime<Utc>,
    pub last_verified_at: DateTime<Utc>,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
    pub is_latest: bool,
    pub is_partial: bool,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub retry_succeeded_at: Option<DateTime<Utc>>,
    pub http_status_code: Option<u16>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub collection_issues: Vec<String>,
    pub confidence_score: f64,
}

/// Row about to be inserted as the new latest version of an (entity, endpoint) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub entity_id: String,
    pub endpoint: SnapshotEndpoint,
    pub payload: Value,
    pub content_hash: String,
    /// Start date carried by the payload itself; the insertion time is used when absent.
    pub effective_from: Option<DateTime<Utc>>,
    pub is_partial: bool,
    pub http_status_code: Option<u16>,
    pub error_message: Option<String>,
    pub collection_issues: Vec<String>,
    pub confidence_score: f64,
}

impl NewSnapshot {
    /// A fully trusted snapshot of a successful fetch.
    pub fn complete(entity_id: impl Into<String>, endpoint: SnapshotEndpoint, payload: Value) -> Self {
        Self {
            entity_id: entity_id.into(),
            endpoint,
            content_hash: content_hash(&payload),
            payload,
            effective_from: None,
            is_partial: false,
            http_status_code: Some(200),
            error_message: None,
            collection_issues: Vec::new(),
            confidence_score: 1.0,
        }
    }

    /// Placeholder for a degraded fetch, picked up later by the retry handler.
    pub fn partial(
        entity_id: impl Into<String>,
        endpoint: SnapshotEndpoint,
        http_status_code: Option<u16>,
        error_message: impl Into<String>,
    ) -> Self {
        let payload = Value::Null;
        Self {
            entity_id: entity_id.into(),
            endpoint,
            content_hash: content_hash(&payload),
            payload,
            effective_from: None,
            is_partial: true,
            http_status_code,
            error_message: Some(error_message.into()),
            collection_issues: vec!["fetch failed before a payload was received".to_string()],
            confidence_score: 0.0,
        }
    }

    pub fn effective_from(mut self, effective_from: Option<DateTime<Utc>>) -> Self {
        self.effective_from = effective_from;
        self
    }

    /// Records data-shape issues; each one costs 0.1 confidence, never below 0.5.
    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        if !self.is_partial && !issues.is_empty() {
            let penalty = 0.1 * issues.len() as f64;
            self.confidence_score = (1.0 - penalty).max(0.5);
        }
        self.collection_issues = issues;
        self
    }

    /// Materializes the row as it will be stored at `now`.
    pub fn into_snapshot(self, id: Uuid, now: DateTime<Utc>) -> RawSnapshot {
        RawSnapshot {
            id,
            entity_id: self.entity_id,
            endpoint: self.endpoint,
            payload: self.payload,
            content_hash: self.content_hash,
            collected_at: now,
            last_verified_at: now,
            effective_from: self.effective_from.unwrap_or(now),
            effective_to: None,
            is_latest: true,
            is_partial: self.is_partial,
            retry_count: 0,
            last_retry_at: None,
            retry_succeeded_at: None,
            http_status_code: self.http_status_code,
            error_message: self.error_message,
            collection_issues: self.collection_issues,
            confidence_score: self.confidence_score,
        }
    }
}
