use std::env;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::errors::{Result, SyncError};

/// Dependencies that log too much at `info`.
const QUIET_TARGETS: &[&str] = &["sqlx=warn", "hyper=warn", "reqwest=warn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Reads `STAFFSYNC_LOG_FORMAT`; anything but `json` means text.
    pub fn from_env() -> Self {
        env::var("STAFFSYNC_LOG_FORMAT")
            .map(|raw| Self::parse(&raw))
            .unwrap_or_default()
    }

    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Initializes the process-wide subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: Option<&str>) -> Result<()> {
    init_tracing_with(level, LogFormat::from_env())
}

pub fn init_tracing_with(level: Option<&str>, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level.unwrap_or("info"))));
    let builder = SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match format {
        LogFormat::Text => builder.with_ansi(atty::is(atty::Stream::Stdout)).try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    installed.map_err(|err| SyncError::GeneralError(err.to_string()))
}

fn default_directives(level: &str) -> String {
    std::iter::once(level)
        .chain(QUIET_TARGETS.iter().copied())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_format() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
    }

    #[test]
    fn default_directives_quiet_noisy_crates() {
        assert_eq!(default_directives("debug"), "debug,sqlx=warn,hyper=warn,reqwest=warn");
    }
}
