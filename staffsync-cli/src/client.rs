use serde::de::DeserializeOwned;
use serde::Serialize;
use staffsync_protocol::api::{
    ChangeDetectionRequest, ChangeDetectionResponse, ErrorBody, RetryRequest, RetryResponse,
    SyncRequest, SyncResponse, TimelineProcessRequest, TimelineProcessResponse,
};
use staffsync_protocol::change::ChangeRecord;
use staffsync_protocol::timeline::TimelineEvent;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("engine returned {status}: {message}")]
    Engine { status: u16, message: String },
    #[error("{0}")]
    Validation(String),
}

impl From<reqwest::Error> for CliError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

/// Thin client over the engine's HTTP API.
pub struct EngineClient {
    base_url: Url,
    http: reqwest::Client,
}

impl EngineClient {
    pub fn new(base_url: &str) -> Result<Self, CliError> {
        let url = Url::parse(base_url)
            .map_err(|err| CliError::Validation(format!("invalid engine URL: {err}")))?;
        Ok(Self {
            base_url: url,
            http: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CliError> {
        self.base_url
            .join(path)
            .map_err(|err| CliError::Validation(format!("invalid path: {err}")))
    }

    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse, CliError> {
        self.post("v1/sync", request).await
    }

    pub async fn retry(&self, request: &RetryRequest) -> Result<RetryResponse, CliError> {
        self.post("v1/retry", request).await
    }

    pub async fn detect(
        &self,
        request: &ChangeDetectionRequest,
    ) -> Result<ChangeDetectionResponse, CliError> {
        self.post("v1/changes/detect", request).await
    }

    pub async fn process_timeline(
        &self,
        request: &TimelineProcessRequest,
    ) -> Result<TimelineProcessResponse, CliError> {
        self.post("v1/timeline/process", request).await
    }

    pub async fn employee_changes(&self, employee_id: &str) -> Result<Vec<ChangeRecord>, CliError> {
        let mut url = self.endpoint("v1/employees/")?;
        push_segments(&mut url, &[employee_id, "changes"])?;
        parse_response(self.http.get(url).send().await?).await
    }

    pub async fn employee_timeline(
        &self,
        employee_id: &str,
    ) -> Result<Vec<TimelineEvent>, CliError> {
        let mut url = self.endpoint("v1/employees/")?;
        push_segments(&mut url, &[employee_id, "timeline"])?;
        parse_response(self.http.get(url).send().await?).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, CliError> {
        let url = self.endpoint(path)?;
        let response = self.http.post(url).json(body).send().await?;
        parse_response(response).await
    }
}

fn push_segments(url: &mut Url, segments: &[&str]) -> Result<(), CliError> {
    url.path_segments_mut()
        .map_err(|_| CliError::Validation("engine URL cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(())
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CliError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| CliError::Http(err.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|err| err.error)
        .unwrap_or(body);
    Err(CliError::Engine {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use staffsync_protocol::api::{ChangeDetectionMode, SyncMode};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sync_body() -> serde_json::Value {
        json!({
            "success": true,
            "result": {
                "processed": 1,
                "unchanged": 0,
                "errored": 0,
                "collector": {
                    "total_entities": 1,
                    "processed_entity_ids": ["e-1"],
                    "unchanged_entities": 0,
                    "employees": {"new": 1, "unchanged": 0},
                    "employments": {"new": 1, "unchanged": 0},
                    "partial_records": 0,
                    "errors": [],
                    "error_count": 0
                }
            },
            "hybrid_processing": {"immediate": 1, "queued": 0, "mode": "interactive"}
        })
    }

    #[tokio::test]
    async fn sync_posts_request_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sync"))
            .and(body_json(json!({"source": "cli", "mode": "interactive"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(sync_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = EngineClient::new(&server.uri()).unwrap();
        let response = client
            .sync(&SyncRequest {
                source: "cli".to_string(),
                mode: SyncMode::Interactive,
                triggered_by: None,
                employee_ids: None,
            })
            .await
            .unwrap();

        assert_eq!(response.result.processed, 1);
        assert_eq!(response.hybrid_processing.immediate, 1);
    }

    #[tokio::test]
    async fn error_bodies_surface_the_engine_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/changes/detect"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "error": "scoped detection requires employeeIds"
            })))
            .mount(&server)
            .await;

        let client = EngineClient::new(&server.uri()).unwrap();
        let err = client
            .detect(&ChangeDetectionRequest {
                mode: ChangeDetectionMode::Scoped,
                employee_ids: None,
            })
            .await
            .unwrap_err();

        match err {
            CliError::Engine { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("employeeIds"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn employee_reads_escape_the_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/employees/a%2Fb/changes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = EngineClient::new(&server.uri()).unwrap();
        let changes = client.employee_changes("a/b").await.unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            EngineClient::new("not a url"),
            Err(CliError::Validation(_))
        ));
    }
}
