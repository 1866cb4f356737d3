//! Logging configuration and initialization.

use std::env;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Output shape for the subscriber: pretty for terminals, json for anything
/// that scrapes the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// An env-filter directive string ("info", "rm_features=debug", ...).
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Reads `RMF_LOG` (filter directives) and `RMF_LOG_FORMAT`; anything missing
/// or unparseable keeps its default.
pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Ok(filter) = env::var("RMF_LOG") {
        let trimmed = filter.trim();
        if !trimmed.is_empty() {
            config.filter = trimmed.to_string();
        }
    }

    if let Ok(format) = env::var("RMF_LOG_FORMAT")
        && let Some(parsed) = LogFormat::parse(&format)
    {
        config.format = parsed;
    }

    config
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.filter.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(config.format == LogFormat::Pretty);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}
