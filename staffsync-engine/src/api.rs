use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use staffsync_core::config::SyncSettings;
use staffsync_core::errors::{ConfigError, SyncError};
use staffsync_protocol::api::{
    ChangeDetectionRequest, ChangeDetectionResponse, ErrorBody, RetryRequest, RetryResponse,
    SyncRequest, SyncResponse, TimelineProcessRequest, TimelineProcessResponse,
};
use staffsync_protocol::change::ChangeRecord;
use staffsync_protocol::timeline::{TimelineEvent, TimelineQuery};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::change_detector::ChangeDetector;
use crate::collector::SyncCollector;
use crate::error::EngineError;
use crate::orchestrator::SyncOrchestrator;
use crate::payroll::{FetchError, PayrollSource};
use crate::queue::{QueueTrigger, QueueWorker};
use crate::retry::RetryHandler;
use crate::store::SyncStore;
use crate::timeline::TimelineProcessor;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn SyncStore>,
    source: Result<Arc<dyn PayrollSource>, ConfigError>,
    settings: SyncSettings,
    trigger: QueueTrigger,
    timeline: Arc<TimelineProcessor>,
    detector: Arc<ChangeDetector>,
}

impl AppState {
    fn source(&self) -> AppResult<Arc<dyn PayrollSource>> {
        self.source
            .clone()
            .map_err(|err| EngineError::Config(err).into())
    }

    fn orchestrator(&self) -> AppResult<SyncOrchestrator> {
        let collector = SyncCollector::new(self.store.clone(), self.source()?, self.settings.clone());
        Ok(SyncOrchestrator::new(
            self.store.clone(),
            Arc::new(collector),
            self.timeline.clone(),
            self.trigger.clone(),
        ))
    }

    fn retry_handler(&self) -> AppResult<RetryHandler> {
        Ok(
            RetryHandler::new(self.store.clone(), self.source()?, self.settings.clone())
                .with_queue_trigger(self.trigger.clone()),
        )
    }
}

/// Builder to bootstrap the sync service.
pub struct SyncServiceBuilder {
    store: Arc<dyn SyncStore>,
    source: Result<Arc<dyn PayrollSource>, ConfigError>,
    settings: SyncSettings,
}

impl SyncServiceBuilder {
    pub fn new(store: Arc<dyn SyncStore>, settings: SyncSettings) -> Self {
        Self {
            store,
            source: Err(ConfigError::MissingEnvVar("EMPLOYES_API_KEY".into())),
            settings,
        }
    }

    pub fn payroll_source(mut self, source: Arc<dyn PayrollSource>) -> Self {
        self.source = Ok(source);
        self
    }

    /// Keeps serving without an upstream; payroll-backed endpoints answer
    /// with this error.
    pub fn payroll_unavailable(mut self, err: ConfigError) -> Self {
        self.source = Err(err);
        self
    }

    pub fn build(self) -> SyncService {
        let timeline = Arc::new(TimelineProcessor::new(self.store.clone(), self.settings.clone()));
        let detector = Arc::new(ChangeDetector::new(self.store.clone(), self.settings.clone()));

        SyncService {
            state: AppState {
                store: self.store,
                source: self.source,
                settings: self.settings,
                trigger: QueueTrigger::new(),
                timeline,
                detector,
            },
        }
    }
}

pub struct SyncService {
    state: AppState,
}

/// Running service; dropping it leaves the server running until `stop`.
pub struct ServiceHandle {
    pub local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl ServiceHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.join.await {
            error!("sync service task crashed: {:?}", err);
        }
    }
}

impl SyncService {
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/v1/sync", post(run_sync))
            .route("/v1/retry", post(run_retry))
            .route("/v1/changes/detect", post(detect_changes))
            .route("/v1/timeline/process", post(process_timeline))
            .route("/v1/employees/:id/timeline", get(employee_timeline))
            .route("/v1/employees/:id/changes", get(employee_changes))
            .with_state(self.state.clone())
    }

    /// Binds, starts the queue worker and the optional retry timer, and
    /// serves until the handle is stopped.
    pub async fn serve(self, bind_address: &str) -> anyhow::Result<ServiceHandle> {
        let router = self.router();
        let state = self.state;

        let worker = QueueWorker::new(state.store.clone(), state.timeline.clone(), state.trigger.clone()).spawn();
        let retry_timer = spawn_retry_timer(&state);

        let listener = tokio::net::TcpListener::bind(bind_address).await?;
        let local_addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel();

        let join = tokio::spawn(async move {
            info!(address = %local_addr, "starting sync service");
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
            {
                error!(error = %err, "sync service stopped with error");
            }
            if let Some(timer) = retry_timer {
                timer.abort();
            }
            worker.shutdown().await;
        });

        Ok(ServiceHandle {
            local_addr,
            shutdown: tx,
            join,
        })
    }

    /// Convenience for binaries: serve until `signal` resolves.
    pub async fn serve_until<F>(self, bind_address: &str, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let handle = self.serve(bind_address).await?;
        signal.await;
        info!("shutdown signal received");
        handle.stop().await;
        Ok(())
    }
}

fn spawn_retry_timer(state: &AppState) -> Option<JoinHandle<()>> {
    let period = state.settings.retry_interval?;
    let handler = match state.retry_handler() {
        Ok(handler) => handler,
        Err(err) => {
            warn!(error = %err.message, "periodic retry disabled");
            return None;
        }
    };

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match handler.run(&RetryRequest::default()).await {
                Ok(result) => info!(processed = result.processed, succeeded = result.succeeded_retries, "periodic retry pass"),
                Err(err) => warn!(error = %err, "periodic retry pass failed"),
            }
        }
    }))
}

type AppResult<T> = Result<T, AppError>;

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn run_sync(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> AppResult<Json<SyncResponse>> {
    let response = state.orchestrator()?.run(&request).await?;
    Ok(Json(response))
}

async fn run_retry(
    State(state): State<AppState>,
    request: Option<Json<RetryRequest>>,
) -> AppResult<Json<RetryResponse>> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let result = state.retry_handler()?.run(&request).await?;
    Ok(Json(RetryResponse {
        success: true,
        result,
    }))
}

async fn detect_changes(
    State(state): State<AppState>,
    Json(request): Json<ChangeDetectionRequest>,
) -> AppResult<Json<ChangeDetectionResponse>> {
    let started = Instant::now();
    let result = state.detector.detect(&request).await?;
    Ok(Json(ChangeDetectionResponse {
        success: true,
        result,
        duration_ms: started.elapsed().as_millis() as u64,
    }))
}

async fn process_timeline(
    State(state): State<AppState>,
    Json(request): Json<TimelineProcessRequest>,
) -> AppResult<Json<TimelineProcessResponse>> {
    if request.employee_ids.is_empty() {
        return Err(AppError::bad_request("employee_ids must not be empty"));
    }
    let result = state.timeline.process(&request.employee_ids, &request.source).await;
    Ok(Json(TimelineProcessResponse {
        success: true,
        result,
    }))
}

async fn employee_timeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TimelineQuery>,
) -> AppResult<Json<Vec<TimelineEvent>>> {
    let events = state.store.list_timeline_events(&id, &query).await?;
    Ok(Json(events))
}

async fn employee_changes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<ChangeRecord>>> {
    let changes = state.store.list_change_records(&id).await?;
    Ok(Json(changes))
}

#[derive(Debug, Clone)]
struct AppError {
    status: StatusCode,
    message: String,
    details: Option<serde_json::Value>,
}

impl AppError {
    fn new<M: Into<String>>(status: StatusCode, message: M) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    fn bad_request<M: Into<String>>(message: M) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal<M: Into<String>>(message: M) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error_details: self.details,
            ..ErrorBody::new(self.message)
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidRequest(message) => AppError::bad_request(message),
            EngineError::Store(SyncError::InvalidInput(message)) => AppError::bad_request(message),
            EngineError::Source(source) => {
                let details = json!({ "http_status_code": source.status_code() });
                let status = match &source {
                    FetchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::BAD_GATEWAY,
                };
                AppError {
                    details: Some(details),
                    ..AppError::new(status, source.to_string())
                }
            }
            EngineError::ShuttingDown => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, EngineError::ShuttingDown.to_string())
            }
            other => {
                error!(error = %other, "request failed");
                AppError::internal(other.to_string())
            }
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        EngineError::Store(err).into()
    }
}
