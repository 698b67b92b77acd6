use chrono::{DateTime, NaiveDate};
use serde_json::Value;

/// Known spellings for each concept, most specific first.
pub(crate) mod keys {
    pub const START_DATE: &[&str] = &[
        "start_date",
        "startDate",
        "effective_date",
        "date_from",
        "from",
    ];
    pub const END_DATE: &[&str] = &["end_date", "endDate", "date_to", "to"];
    pub const EMPLOYEE_START: &[&str] = &[
        "start_date",
        "startDate",
        "employment_start_date",
        "date_of_employment",
        "hire_date",
    ];

    pub const SALARY_ARRAY: &[&str] = &["salary", "salaries", "salary_periods", "wages"];
    pub const HOURS_ARRAY: &[&str] = &["hours", "working_hours", "hours_periods"];
    pub const CONTRACT_ARRAY: &[&str] = &["contracts", "contract", "contract_periods"];
    pub const EMPLOYMENT_LIST: &[&str] = &["employments", "data", "items", "results"];

    pub const MONTH_WAGE: &[&str] = &["month_wage", "monthly_wage", "monthWage", "salary_amount"];
    pub const HOUR_WAGE: &[&str] = &["hour_wage", "hourly_wage", "hourWage"];
    pub const YEARLY_WAGE: &[&str] = &["yearly_wage", "annual_wage", "yearlyWage"];
    pub const HOURS_PER_WEEK: &[&str] = &["hours_per_week", "hoursPerWeek", "weekly_hours"];
    pub const DAYS_PER_WEEK: &[&str] = &["days_per_week", "daysPerWeek"];
    pub const CONTRACT_DURATION: &[&str] = &[
        "contract_duration",
        "contractDuration",
        "duration",
        "contract_type",
    ];
    pub const IS_SIGNED: &[&str] = &["is_signed", "isSigned", "signed"];
}

fn first_present<'a>(value: &'a Value, candidates: &[&str]) -> Option<&'a Value> {
    let object = value.as_object()?;
    candidates
        .iter()
        .filter_map(|key| object.get(*key))
        .find(|found| !found.is_null())
}

/// First non-null field among `candidates`, read as a number. Numeric strings
/// with a decimal comma are accepted.
pub fn read_number(value: &Value, candidates: &[&str]) -> Option<f64> {
    match first_present(value, candidates)? {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => {
            let trimmed = raw.trim();
            let normalized = if trimmed.contains(',') && !trimmed.contains('.') {
                trimmed.replace(',', ".")
            } else {
                trimmed.replace(',', "")
            };
            normalized.parse::<f64>().ok()
        }
        _ => None,
    }
}

pub fn read_string(value: &Value, candidates: &[&str]) -> Option<String> {
    match first_present(value, candidates)? {
        Value::String(raw) if !raw.trim().is_empty() => Some(raw.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn read_bool(value: &Value, candidates: &[&str]) -> Option<bool> {
    match first_present(value, candidates)? {
        Value::Bool(flag) => Some(*flag),
        Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        Value::Number(number) => number.as_i64().map(|n| n != 0),
        _ => None,
    }
}

/// Reads `YYYY-MM-DD`, or the date part of an RFC 3339 timestamp.
pub fn read_date(value: &Value, candidates: &[&str]) -> Option<NaiveDate> {
    let raw = first_present(value, candidates)?.as_str()?.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

pub(crate) fn array_field<'a>(value: &'a Value, candidates: &[&str]) -> Option<&'a Vec<Value>> {
    let object = value.as_object()?;
    candidates
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(Value::as_array)
}

/// Employment objects that carry period arrays: the document itself, a list
/// nested under a known key, or a top-level array.
pub(crate) fn employment_objects(payload: &Value) -> Vec<&Value> {
    let carries_periods = |value: &Value| {
        array_field(value, keys::SALARY_ARRAY).is_some()
            || array_field(value, keys::HOURS_ARRAY).is_some()
            || array_field(value, keys::CONTRACT_ARRAY).is_some()
    };

    match payload {
        Value::Array(items) => items.iter().filter(|item| item.is_object()).collect(),
        Value::Object(_) if carries_periods(payload) => vec![payload],
        Value::Object(_) => array_field(payload, keys::EMPLOYMENT_LIST)
            .map(|items| items.iter().filter(|item| item.is_object()).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// The start date a payload declares for itself, if any. For employment lists
/// the earliest employment start wins.
pub fn payload_start_date(payload: &Value) -> Option<NaiveDate> {
    if let Some(date) = read_date(payload, keys::EMPLOYEE_START) {
        return Some(date);
    }
    employment_objects(payload)
        .into_iter()
        .filter_map(|employment| read_date(employment, keys::EMPLOYEE_START))
        .min()
}
