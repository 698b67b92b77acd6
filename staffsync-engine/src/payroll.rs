use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use staffsync_core::config::PayrollApiConfig;
use staffsync_protocol::snapshot::SnapshotEndpoint;
use thiserror::Error;
use tracing::debug;
use url::Url;

const LIST_KEYS: &[&str] = &["data", "employees", "items", "results"];
const PAGE_COUNT_KEYS: &[&str] = &["pages", "total_pages", "last_page", "page_count"];
const PAGINATION_KEYS: &[&str] = &["meta", "pagination", "paging"];
const ID_KEYS: &[&str] = &["id", "employee_id", "uuid"];

/// Upstream system the collector and retry handler read from.
#[async_trait]
pub trait PayrollSource: Send + Sync {
    /// Every employee id known upstream, following pagination until exhausted.
    async fn list_employee_ids(&self) -> Result<Vec<String>, FetchError>;

    /// Raw document for one (entity, endpoint) pair.
    async fn fetch(&self, entity_id: &str, endpoint: SnapshotEndpoint) -> Result<Value, FetchError>;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("payroll API returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("payroll API request timed out: {0}")]
    Timeout(String),
    #[error("payroll API request failed: {0}")]
    Network(String),
    #[error("failed to decode payroll response: {0}")]
    Decode(String),
    #[error("invalid payroll url {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Whether a failed fetch is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Terminal,
    Retryable,
}

impl FetchError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        FetchError::Status {
            status,
            message: message.into(),
        }
    }

    /// 404 (gone upstream) and 403 (access revoked) are never retried.
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Status { status: 403 | 404, .. } | FetchError::InvalidUrl { .. } => {
                FetchErrorKind::Terminal
            }
            _ => FetchErrorKind::Retryable,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind() == FetchErrorKind::Terminal
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::status(status.as_u16(), err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// HTTP client for the Employes.nl payroll API.
#[derive(Clone)]
pub struct PayrollClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    per_page: u32,
    max_pages: u32,
}

impl PayrollClient {
    pub fn new(config: &PayrollApiConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| FetchError::Network(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            per_page: config.per_page.max(1),
            max_pages: config.max_pages.max(1),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|err| FetchError::InvalidUrl {
                url: format!("{}{}", self.base_url, path),
                message: err.to_string(),
            })
    }

    async fn get_json(&self, url: Url, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::status(status.as_u16(), summarize_body(status, &body)));
        }

        response.json::<Value>().await.map_err(|err| FetchError::Decode(err.to_string()))
    }
}

#[async_trait]
impl PayrollSource for PayrollClient {
    async fn list_employee_ids(&self) -> Result<Vec<String>, FetchError> {
        let url = self.url_for("employees")?;
        let mut ids = Vec::new();

        for page in 1..=self.max_pages {
            let body = self
                .get_json(
                    url.clone(),
                    &[("page", page.to_string()), ("per_page", self.per_page.to_string())],
                )
                .await?;

            let items = list_items(&body);
            let received = items.len();
            ids.extend(items.iter().filter_map(|item| employee_id(item)));
            debug!(page, received, "fetched employee page");

            let exhausted = match page_count(&body) {
                Some(pages) => u64::from(page) >= pages,
                None => received < self.per_page as usize,
            };
            if received == 0 || exhausted {
                break;
            }
        }

        Ok(ids)
    }

    async fn fetch(&self, entity_id: &str, endpoint: SnapshotEndpoint) -> Result<Value, FetchError> {
        let segment: String = url::form_urlencoded::byte_serialize(entity_id.as_bytes()).collect();
        let url = self.url_for(&endpoint.upstream_path(&segment))?;
        self.get_json(url, &[]).await
    }
}

fn summarize_body(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

fn list_items(body: &Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items.clone(),
        Value::Object(object) => LIST_KEYS
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn page_count(body: &Value) -> Option<u64> {
    let read = |value: &Value| {
        PAGE_COUNT_KEYS
            .iter()
            .filter_map(|key| value.get(*key))
            .find_map(Value::as_u64)
    };

    read(body).or_else(|| {
        PAGINATION_KEYS
            .iter()
            .filter_map(|key| body.get(*key))
            .find_map(|nested| read(nested))
    })
}

fn employee_id(item: &Value) -> Option<String> {
    ID_KEYS
        .iter()
        .filter_map(|key| item.get(*key))
        .find_map(|value| match value {
            Value::String(raw) if !raw.is_empty() => Some(raw.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
}
