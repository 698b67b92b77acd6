use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    TimelineProcessing,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::TimelineProcessing => "timeline_processing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "timeline_processing" => Some(JobType::TimelineProcessing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(QueueStatus::Pending),
            "processing" => Some(QueueStatus::Processing),
            "completed" => Some(QueueStatus::Completed),
            "failed" => Some(QueueStatus::Failed),
            _ => None,
        }
    }
}

/// Work item handed from the orchestrator's background path to the queue worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewQueueEntry {
    pub job_type: JobType,
    pub payload: Value,
    /// Lower is more urgent.
    pub priority: i32,
    pub created_by: String,
}

impl NewQueueEntry {
    pub fn timeline_batch(entity_ids: &[String], priority: i32, created_by: impl Into<String>) -> Self {
        Self {
            job_type: JobType::TimelineProcessing,
            payload: serde_json::json!({ "employee_ids": entity_ids }),
            priority,
            created_by: created_by.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingQueueEntry {
    pub id: Uuid,
    pub job_type: String,
    pub payload: Value,
    pub priority: i32,
    pub created_by: String,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ProcessingQueueEntry {
    pub fn from_new(entry: NewQueueEntry, id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            job_type: entry.job_type.as_str().to_string(),
            payload: entry.payload,
            priority: entry.priority,
            created_by: entry.created_by,
            status: QueueStatus::Pending,
            created_at,
            processed_at: None,
            result: None,
            error: None,
        }
    }

    /// Entity ids carried by a timeline batch.
    pub fn entity_ids(&self) -> Vec<String> {
        self.payload
            .get("employee_ids")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| match id {
                        Value::String(raw) => Some(raw.clone()),
                        Value::Number(number) => Some(number.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_batch_carries_ids() {
        let ids = vec!["1".to_string(), "2".to_string()];
        let entry = ProcessingQueueEntry::from_new(
            NewQueueEntry::timeline_batch(&ids, 50, "sync"),
            Uuid::new_v4(),
            Utc::now(),
        );
        assert_eq!(entry.job_type, "timeline_processing");
        assert_eq!(entry.entity_ids(), ids);
        assert_eq!(entry.status, QueueStatus::Pending);
    }
}
