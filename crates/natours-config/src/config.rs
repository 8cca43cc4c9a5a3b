//! Main configuration type.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::{
    BodyConfig, CompressionConfig, ConfigError, Environment, ErrorsConfig, LogFormat,
    LoggingConfig, ParameterPollutionConfig, RateLimitConfig, RateLimitKeyMode, SanitizeConfig,
    ServerConfig, StaticFilesConfig,
};

/// Complete Natours server configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use natours_config::NatoursConfig;
///
/// let config = NatoursConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:3000");
/// assert_eq!(config.rate_limit.max_requests, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct NatoursConfig {
    /// Runtime mode.
    #[serde(default)]
    pub environment: Environment,

    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Static asset configuration.
    #[serde(default)]
    pub static_files: StaticFilesConfig,

    /// Rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Body decoding limits.
    #[serde(default)]
    pub body: BodyConfig,

    /// Input sanitization.
    #[serde(default)]
    pub sanitize: SanitizeConfig,

    /// Query parameter de-duplication.
    #[serde(default)]
    pub parameter_pollution: ParameterPollutionConfig,

    /// Response compression.
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Error reporting.
    #[serde(default)]
    pub errors: ErrorsConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NatoursConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` or `ConfigError::ValidationError`
    /// describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than zero",
            ));
        }

        if self.static_files.enabled && self.static_files.root.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "static_files.root",
                "must not be empty when static files are enabled",
            ));
        }

        let rate_limit = &self.rate_limit;
        if rate_limit.enabled {
            if rate_limit.max_requests == 0 {
                return Err(ConfigError::invalid_value(
                    "rate_limit.max_requests",
                    "must be greater than zero",
                ));
            }
            if rate_limit.window_ms == 0 {
                return Err(ConfigError::invalid_value(
                    "rate_limit.window_ms",
                    "must be greater than zero",
                ));
            }
            if !rate_limit.path_prefix.starts_with('/') {
                return Err(ConfigError::invalid_value(
                    "rate_limit.path_prefix",
                    "must start with '/'",
                ));
            }
            if rate_limit.key == RateLimitKeyMode::Header
                && rate_limit.key_header.as_deref().map_or(true, str::is_empty)
            {
                return Err(ConfigError::validation_error(
                    "rate_limit.key_header must be set when key is 'header'",
                ));
            }
        }

        if self.body.json_limit_bytes == 0 || self.body.form_limit_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "body",
                "size limits must be greater than zero",
            ));
        }

        if self.compression.level > 9 {
            return Err(ConfigError::invalid_value(
                "compression.level",
                "must be between 0 and 9",
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty, colored debug logs and the request logger enabled.
    ///
    /// # Example
    ///
    /// ```
    /// use natours_config::NatoursConfig;
    ///
    /// let config = NatoursConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// assert!(config.environment.is_development());
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.environment = Environment::Development;
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.ansi_enabled = true;
        config.logging.include_location = true;
        config
    }

    /// Create a production configuration preset.
    ///
    /// # Example
    ///
    /// ```
    /// use natours_config::{LogFormat, NatoursConfig};
    ///
    /// let config = NatoursConfig::production();
    /// assert_eq!(config.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.environment = Environment::Production;
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.logging.ansi_enabled = false;
        config.errors.expose_internal_errors = false;
        config
    }
}
