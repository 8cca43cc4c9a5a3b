//! Subscriber setup for the Natours server.
//!
//! Production emits one JSON object per event; development emits the
//! multi-line pretty format with colors and source locations. A `RUST_LOG`
//! variable, when set and valid, replaces the configured filter.
//!
//! # Example
//!
//! ```rust,ignore
//! use natours_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::from(&natours_config.logging))?;
//! tracing::info!(http.method = "GET", http.path = "/api/v1/tours", "request");
//! ```

use natours_config::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Variable whose directive overrides [`LogConfig::filter`].
pub const FILTER_ENV: &str = "RUST_LOG";

/// Logging setup derived from the `logging` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Install no subscriber at all.
    pub enabled: bool,
    /// Filter directive, e.g. `info` or `natours_server=debug,hyper=warn`.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
    /// Colorize pretty output. JSON output is never colorized.
    pub ansi: bool,
    /// Include file and line of the callsite.
    pub source_location: bool,
    /// Honor [`FILTER_ENV`].
    pub env_override: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Pretty, colored output at debug level.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            filter: "debug".to_string(),
            format: LogFormat::Pretty,
            ansi: true,
            source_location: true,
            env_override: true,
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            filter: "info".to_string(),
            format: LogFormat::Json,
            ansi: false,
            source_location: false,
            env_override: true,
        }
    }

    /// The filter to install: `RUST_LOG` if allowed and valid, otherwise the
    /// configured directive.
    pub fn resolve_filter(&self) -> TelemetryResult<EnvFilter> {
        if self.env_override {
            if let Ok(filter) = EnvFilter::try_from_env(FILTER_ENV) {
                return Ok(filter);
            }
        }
        create_env_filter(&self.filter)
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            enabled: true,
            filter: config.level.clone(),
            format: config.format,
            ansi: config.ansi_enabled,
            source_location: config.include_location,
            env_override: true,
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` for a bad directive and
/// `TelemetryError::LoggingInit` if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = config.resolve_filter()?;
    let fmt = tracing_subscriber::fmt::layer()
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_target(true);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt.json().with_ansi(false).with_filter(filter).boxed(),
        LogFormat::Pretty => fmt.pretty().with_ansi(config.ansi).with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Builds an [`EnvFilter`] from a directive string.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` if the directive does not parse.
pub fn create_env_filter(directive: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directive).map_err(|e| TelemetryError::InvalidFilter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}
