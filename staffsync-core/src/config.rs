use std::env;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::errors::{ConfigError, SyncError};

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Process-level configuration shared by the services.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_url: String,
    pub environment: Environment,
    pub node_name: String,
    pub http_bind: Option<String>,
    /// Upper bound for the snapshot store's connection pool.
    pub db_max_connections: u32,
}

impl CoreConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix("")
    }

    /// Loads configuration from env vars prefixed with the provided value (e.g. `STAFFSYNC_`).
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let db_key = key("DATABASE_URL");
        let database_url = env::var(&db_key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(db_key.clone()))?;

        let environment = env::var(key("ENV"))
            .map(|raw| Environment::parse(&raw))
            .unwrap_or_default();

        let node_name = env::var(key("NODE_NAME")).unwrap_or_else(|_| "staffsync-node".to_string());
        let http_bind = env::var(key("HTTP_BIND")).ok();
        let db_max_connections = parse_env(&key("DB_MAX_CONNECTIONS"), 5u32)?.max(1);

        Ok(Self {
            database_url,
            environment,
            node_name,
            http_bind,
            db_max_connections,
        })
    }

    /// Returns the base Postgres URL.
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Whether the service is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

/// Connection settings for the external payroll API.
#[derive(Debug, Clone)]
pub struct PayrollApiConfig {
    pub base_url: Url,
    pub api_key: String,
    pub per_page: u32,
    pub timeout: Duration,
    pub max_pages: u32,
}

impl PayrollApiConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://connect.employes.nl/v4/";

    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = parse_base_url("EMPLOYES_BASE_URL", base_url)?;
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            per_page: 100,
            timeout: Duration::from_secs(30),
            max_pages: 500,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_key = env::var("EMPLOYES_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("EMPLOYES_API_KEY".into()))?;

        let base_url = env::var("EMPLOYES_BASE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string());

        let mut config = Self::new(&base_url, api_key)?;
        config.per_page = parse_env("EMPLOYES_PER_PAGE", config.per_page)?;
        config.max_pages = parse_env("EMPLOYES_MAX_PAGES", config.max_pages)?;
        config.timeout = Duration::from_secs(parse_env("EMPLOYES_TIMEOUT_SECS", 30u64)?);
        Ok(config)
    }
}

/// Tunables for the collector, retry handler and orchestrator.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Attempts made per snapshot inside one retry-handler invocation.
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub retry_cooldown: Duration,
    pub max_retry_count: u32,
    pub retry_batch_limit: u32,
    /// Upper bound for the error list returned in run summaries.
    pub error_list_cap: usize,
    /// When set, the service runs the retry handler on this interval.
    pub retry_interval: Option<Duration>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(1_000),
            retry_max_delay: Duration::from_secs(30),
            retry_cooldown: Duration::from_secs(60 * 60),
            max_retry_count: 5,
            retry_batch_limit: 50,
            error_list_cap: 10,
            retry_interval: None,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let retry_interval = match parse_env("STAFFSYNC_RETRY_INTERVAL_SECS", 0u64)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            retry_attempts: parse_env("STAFFSYNC_RETRY_ATTEMPTS", defaults.retry_attempts)?.max(1),
            retry_base_delay: Duration::from_millis(parse_env(
                "STAFFSYNC_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )?),
            retry_max_delay: Duration::from_millis(parse_env(
                "STAFFSYNC_RETRY_MAX_DELAY_MS",
                defaults.retry_max_delay.as_millis() as u64,
            )?),
            retry_cooldown: Duration::from_secs(parse_env(
                "STAFFSYNC_RETRY_COOLDOWN_SECS",
                defaults.retry_cooldown.as_secs(),
            )?),
            max_retry_count: parse_env("STAFFSYNC_MAX_RETRY_COUNT", defaults.max_retry_count)?,
            retry_batch_limit: parse_env("STAFFSYNC_RETRY_LIMIT", defaults.retry_batch_limit)?,
            error_list_cap: parse_env("STAFFSYNC_ERROR_LIST_CAP", defaults.error_list_cap)?,
            retry_interval,
        })
    }

    /// Exponential backoff for the given 1-based attempt, capped at `retry_max_delay`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let multiplier = 2u32.saturating_pow(exponent) as f64;
        self.retry_base_delay
            .mul_f64(multiplier)
            .min(self.retry_max_delay)
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map_err(|err| ConfigError::InvalidEnvVar {
                    key: key.to_string(),
                    message: err.to_string(),
                })
        }
        _ => Ok(default),
    }
}

fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw).map_err(|err| ConfigError::InvalidEnvVar {
        key: key.to_string(),
        message: err.to_string(),
    })?;

    if !url.path().ends_with('/') {
        let mut path = url.path().trim_end_matches('/').to_string();
        path.push('/');
        url.set_path(&path);
    }

    Ok(url)
}

/// Loads the service configuration, preferring `STAFFSYNC_`-prefixed variables.
pub fn load_core_config() -> Result<CoreConfig, SyncError> {
    dotenvy::dotenv().ok();
    CoreConfig::from_env_with_prefix("STAFFSYNC_")
        .or_else(|_| CoreConfig::from_env())
        .map_err(Into::into)
}
