use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    EmployeeAdded,
    ContractStarted,
    SalaryIncrease,
    SalaryDecrease,
    ContractRenewed,
    HoursChange,
}

impl TimelineEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineEventType::EmployeeAdded => "employee_added",
            TimelineEventType::ContractStarted => "contract_started",
            TimelineEventType::SalaryIncrease => "salary_increase",
            TimelineEventType::SalaryDecrease => "salary_decrease",
            TimelineEventType::ContractRenewed => "contract_renewed",
            TimelineEventType::HoursChange => "hours_change",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "employee_added" => Some(TimelineEventType::EmployeeAdded),
            "contract_started" => Some(TimelineEventType::ContractStarted),
            "salary_increase" => Some(TimelineEventType::SalaryIncrease),
            "salary_decrease" => Some(TimelineEventType::SalaryDecrease),
            "contract_renewed" => Some(TimelineEventType::ContractRenewed),
            "hours_change" => Some(TimelineEventType::HoursChange),
            _ => None,
        }
    }
}

impl fmt::Display for TimelineEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTimelineEvent {
    pub entity_id: String,
    pub event_type: TimelineEventType,
    pub event_date: NaiveDate,
    pub event_title: String,
    pub event_description: String,
    pub event_data: Value,
    pub change_id: Option<Uuid>,
}

/// Presentation-ready milestone on an employee's timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub entity_id: String,
    pub event_type: TimelineEventType,
    pub event_date: NaiveDate,
    pub event_title: String,
    pub event_description: String,
    pub event_data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TimelineEvent {
    pub fn from_new(event: NewTimelineEvent, id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            entity_id: event.entity_id,
            event_type: event.event_type,
            event_date: event.event_date,
            event_title: event.event_title,
            event_description: event.event_description,
            event_data: event.event_data,
            change_id: event.change_id,
            created_at,
        }
    }
}
