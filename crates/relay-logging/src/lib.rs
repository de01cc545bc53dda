//! # relay-logging
//!
//! Installs the global `tracing` subscriber: an [`EnvFilter`] built from
//! `RUST_LOG` (when set) or the configured levels, and a JSON or
//! human-readable fmt layer on stdout.

#![deny(unsafe_code)]

use std::str::FromStr;

use relay_settings::LoggingSettings;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Logging setup failure.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A configured level name is not a tracing level.
    #[error("invalid log level {value:?} for {target}")]
    InvalidLevel {
        /// `default` or the module the level was set for.
        target: String,
        /// The unparsable value.
        value: String,
    },
    /// A global subscriber was already installed.
    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Resolved logging configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default level. Overridden by `RUST_LOG`.
    pub level: Level,
    /// Per-module overrides (e.g. `relay_broker` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Resolve level names from settings.
    pub fn from_settings(settings: &LoggingSettings) -> Result<Self, LoggingError> {
        let level = parse_level("default", &settings.level)?;
        let module_levels = settings
            .modules
            .iter()
            .map(|(module, value)| Ok((module.clone(), parse_level(module, value)?)))
            .collect::<Result<Vec<_>, LoggingError>>()?;
        Ok(Self {
            level,
            module_levels,
            json: settings.json,
        })
    }

    /// `EnvFilter` directive string for the configured levels.
    pub fn filter_directive(&self) -> String {
        let mut directive = self.level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            directive.push(',');
            directive.push_str(module);
            directive.push('=');
            directive.push_str(&level.to_string().to_lowercase());
        }
        directive
    }
}

fn parse_level(target: &str, value: &str) -> Result<Level, LoggingError> {
    Level::from_str(value.trim()).map_err(|_| LoggingError::InvalidLevel {
        target: target.to_string(),
        value: value.to_string(),
    })
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let directive = config.filter_directive();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}
