use std::env;
use std::sync::Arc;

use staffsync_core::config::{load_core_config, PayrollApiConfig, SyncSettings};
use staffsync_core::errors::{ConfigError, SyncError};
use staffsync_core::logging;
use staffsync_engine::{MemoryStore, PayrollClient, PgStore, SyncServiceBuilder, SyncStore};
use tracing::{info, warn};

const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    if let Err(err) = logging::init_tracing(None) {
        eprintln!("failed to initialise tracing: {err}");
    }

    let settings = SyncSettings::from_env()?;
    let (store, bind): (Arc<dyn SyncStore>, String) = if use_memory_store() {
        warn!("running on the in-memory store, data is lost on exit");
        let bind = env::var("STAFFSYNC_HTTP_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        (Arc::new(MemoryStore::new()), bind)
    } else {
        let config = load_core_config()?;
        let store = PgStore::from_config(&config).await?;
        let bind = config.http_bind.clone().unwrap_or_else(|| DEFAULT_BIND.to_string());
        (Arc::new(store), bind)
    };

    let mut builder = SyncServiceBuilder::new(store, settings);
    match PayrollApiConfig::from_env() {
        Ok(api) => {
            let client = PayrollClient::new(&api)
                .map_err(|err| ConfigError::Internal(format!("payroll client: {err}")))?;
            info!(base_url = %api.base_url, "payroll API configured");
            builder = builder.payroll_source(Arc::new(client));
        }
        Err(err) => {
            warn!(error = %err, "payroll API not configured, sync and retry requests will fail");
            builder = builder.payroll_unavailable(err);
        }
    }

    info!(%bind, "starting staffsync-engine");
    builder
        .build()
        .serve_until(&bind, shutdown_signal())
        .await
        .map_err(ServerError::Server)?;

    info!("staffsync-engine stopped");
    Ok(())
}

fn use_memory_store() -> bool {
    env::var("STAFFSYNC_STORE")
        .map(|value| value.eq_ignore_ascii_case("memory"))
        .unwrap_or(false)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sigterm) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("startup error: {0}")]
    Startup(#[from] SyncError),
    #[error("http server error: {0}")]
    Server(anyhow::Error),
}
