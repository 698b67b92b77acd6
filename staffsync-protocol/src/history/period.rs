use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::extract::{self, keys};

/// Common accessors for the three period kinds.
pub trait Period {
    fn start_date(&self) -> NaiveDate;
}

/// Sorts periods chronologically; pairwise diffs are only meaningful afterwards.
pub fn sort_by_start<P: Period>(periods: &mut [P]) {
    periods.sort_by_key(|period| period.start_date());
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalaryPeriod {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub month_wage: Option<f64>,
    pub hour_wage: Option<f64>,
    pub yearly_wage: Option<f64>,
}

impl SalaryPeriod {
    /// Monthly wage, falling back to the hourly wage, with the field it came from.
    pub fn amount(&self) -> Option<(&'static str, f64)> {
        self.month_wage
            .map(|wage| ("month_wage", wage))
            .or_else(|| self.hour_wage.map(|wage| ("hour_wage", wage)))
    }
}

impl Period for SalaryPeriod {
    fn start_date(&self) -> NaiveDate {
        self.start_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HoursPeriod {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub hours_per_week: Option<f64>,
    pub days_per_week: Option<f64>,
}

impl Period for HoursPeriod {
    fn start_date(&self) -> NaiveDate {
        self.start_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractPeriod {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub contract_duration: Option<String>,
    pub is_signed: Option<bool>,
}

impl ContractPeriod {
    pub fn is_permanent(&self) -> bool {
        self.contract_duration
            .as_deref()
            .map(|label| label.eq_ignore_ascii_case("permanent"))
            .unwrap_or(false)
    }
}

impl Period for ContractPeriod {
    fn start_date(&self) -> NaiveDate {
        self.start_date
    }
}

/// All periods found in one `/employments` payload, in document order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmploymentHistory {
    pub salary: Vec<SalaryPeriod>,
    pub hours: Vec<HoursPeriod>,
    pub contracts: Vec<ContractPeriod>,
}

impl EmploymentHistory {
    /// Reads the periods out of the payload. Items that cannot be read are
    /// skipped and described in the returned issue list.
    pub fn from_payload(payload: &Value) -> (Self, Vec<String>) {
        let mut history = EmploymentHistory::default();
        let mut issues = Vec::new();
        let employments = extract::employment_objects(payload);

        if employments.is_empty() {
            issues.push("payload contains no employment objects".to_string());
            return (history, issues);
        }

        let mut seen = [false; 3];
        for employment in employments {
            if let Some(items) = extract::array_field(employment, keys::SALARY_ARRAY) {
                seen[0] = true;
                for (index, item) in items.iter().enumerate() {
                    match read_salary(item) {
                        Ok(period) => history.salary.push(period),
                        Err(reason) => issues.push(format!("salary[{index}]: {reason}")),
                    }
                }
            }
            if let Some(items) = extract::array_field(employment, keys::HOURS_ARRAY) {
                seen[1] = true;
                for (index, item) in items.iter().enumerate() {
                    match read_hours(item) {
                        Ok(period) => history.hours.push(period),
                        Err(reason) => issues.push(format!("hours[{index}]: {reason}")),
                    }
                }
            }
            if let Some(items) = extract::array_field(employment, keys::CONTRACT_ARRAY) {
                seen[2] = true;
                for (index, item) in items.iter().enumerate() {
                    match read_contract(item) {
                        Ok(period) => history.contracts.push(period),
                        Err(reason) => issues.push(format!("contracts[{index}]: {reason}")),
                    }
                }
            }
        }

        for (found, name) in seen.iter().zip(["salary", "hours", "contracts"]) {
            if !found {
                issues.push(format!("missing {name} array"));
            }
        }

        (history, issues)
    }

    pub fn is_empty(&self) -> bool {
        self.salary.is_empty() && self.hours.is_empty() && self.contracts.is_empty()
    }
}

fn start_of(item: &Value) -> Result<NaiveDate, String> {
    if !item.is_object() {
        return Err("period is not an object".to_string());
    }
    extract::read_date(item, keys::START_DATE).ok_or_else(|| "missing start_date".to_string())
}

fn read_salary(item: &Value) -> Result<SalaryPeriod, String> {
    Ok(SalaryPeriod {
        start_date: start_of(item)?,
        end_date: extract::read_date(item, keys::END_DATE),
        month_wage: extract::read_number(item, keys::MONTH_WAGE),
        hour_wage: extract::read_number(item, keys::HOUR_WAGE),
        yearly_wage: extract::read_number(item, keys::YEARLY_WAGE),
    })
}

fn read_hours(item: &Value) -> Result<HoursPeriod, String> {
    Ok(HoursPeriod {
        start_date: start_of(item)?,
        end_date: extract::read_date(item, keys::END_DATE),
        hours_per_week: extract::read_number(item, keys::HOURS_PER_WEEK),
        days_per_week: extract::read_number(item, keys::DAYS_PER_WEEK),
    })
}

fn read_contract(item: &Value) -> Result<ContractPeriod, String> {
    Ok(ContractPeriod {
        start_date: start_of(item)?,
        end_date: extract::read_date(item, keys::END_DATE),
        contract_duration: extract::read_string(item, keys::CONTRACT_DURATION),
        is_signed: extract::read_bool(item, keys::IS_SIGNED),
    })
}
