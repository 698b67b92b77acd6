use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    SalaryChange,
    HoursChange,
    ContractChange,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::SalaryChange => "salary_change",
            ChangeType::HoursChange => "hours_change",
            ChangeType::ContractChange => "contract_change",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "salary_change" => Some(ChangeType::SalaryChange),
            "hours_change" => Some(ChangeType::HoursChange),
            "contract_change" => Some(ChangeType::ContractChange),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived classification of a change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BusinessImpact {
    SalaryIncrease,
    SalaryDecrease,
    HoursIncrease,
    HoursDecrease,
    PermanentContract,
    ContractRenewal,
}

impl BusinessImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessImpact::SalaryIncrease => "salary_increase",
            BusinessImpact::SalaryDecrease => "salary_decrease",
            BusinessImpact::HoursIncrease => "hours_increase",
            BusinessImpact::HoursDecrease => "hours_decrease",
            BusinessImpact::PermanentContract => "permanent_contract",
            BusinessImpact::ContractRenewal => "contract_renewal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "salary_increase" => Some(BusinessImpact::SalaryIncrease),
            "salary_decrease" => Some(BusinessImpact::SalaryDecrease),
            "hours_increase" => Some(BusinessImpact::HoursIncrease),
            "hours_decrease" => Some(BusinessImpact::HoursDecrease),
            "permanent_contract" => Some(BusinessImpact::PermanentContract),
            "contract_renewal" => Some(BusinessImpact::ContractRenewal),
            _ => None,
        }
    }
}

/// Detected transition between two adjacent periods, ready to be stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewChangeRecord {
    pub entity_id: String,
    pub change_type: ChangeType,
    pub field_name: String,
    pub effective_date: NaiveDate,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub change_amount: Option<f64>,
    pub change_percent: Option<f64>,
    pub confidence_score: f64,
    pub business_impact: BusinessImpact,
    pub metadata: Value,
}

impl NewChangeRecord {
    /// Identity used for idempotent inserts.
    pub fn key(&self) -> (&str, ChangeType, &str, NaiveDate) {
        (
            &self.entity_id,
            self.change_type,
            &self.field_name,
            self.effective_date,
        )
    }
}

/// Stored change record. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeRecord {
    pub id: Uuid,
    pub entity_id: String,
    pub change_type: ChangeType,
    pub field_name: String,
    pub effective_date: NaiveDate,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub change_amount: Option<f64>,
    pub change_percent: Option<f64>,
    pub confidence_score: f64,
    pub business_impact: BusinessImpact,
    pub metadata: Value,
    pub detected_at: DateTime<Utc>,
}

impl ChangeRecord {
    pub fn from_new(record: NewChangeRecord, id: Uuid, detected_at: DateTime<Utc>) -> Self {
        Self {
            id,
            entity_id: record.entity_id,
            change_type: record.change_type,
            field_name: record.field_name,
            effective_date: record.effective_date,
            old_value: record.old_value,
            new_value: record.new_value,
            change_amount: record.change_amount,
            change_percent: record.change_percent,
            confidence_score: record.confidence_score,
            business_impact: record.business_impact,
            metadata: record.metadata,
            detected_at,
        }
    }
}
