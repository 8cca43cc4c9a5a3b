//! Layered configuration loading: built-in defaults, a TOML or JSON file,
//! `.env`, then process environment overrides.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, Environment, LogFormat, NatoursConfig, RateLimitKeyMode};

/// Name of the variable selecting the runtime mode.
pub const NODE_ENV: &str = "NODE_ENV";

/// Builds a [`NatoursConfig`] from layered sources.
///
/// Later layers win:
/// 1. Defaults, or a preset
/// 2. A TOML or JSON file; missing sections keep their defaults
/// 3. `.env`, which only fills variables not already set
/// 4. `NODE_ENV`, then `PREFIX__SECTION__KEY` variables
///
/// # Example
///
/// ```no_run
/// use natours_config::ConfigLoader;
///
/// # fn main() -> Result<(), natours_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("natours.toml")?
///     .with_dotenv()?
///     .with_node_env()
///     .with_env_prefix("NATOURS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: NatoursConfig,
    env_prefix: Option<String>,
    read_node_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader starting from [`NatoursConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: NatoursConfig::default(),
            env_prefix: None,
            read_node_env: false,
        }
    }

    /// Resets to [`NatoursConfig::default`].
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = NatoursConfig::default();
        self
    }

    /// Starts from [`NatoursConfig::development`].
    ///
    /// # Example
    ///
    /// ```
    /// use natours_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = NatoursConfig::development();
        self
    }

    /// Starts from [`NatoursConfig::production`].
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = NatoursConfig::production();
        self
    }

    /// Replaces the configuration with the contents of `path`, parsed as
    /// TOML or JSON by extension.
    ///
    /// # Errors
    ///
    /// Fails when the file is missing or unreadable, has another extension,
    /// does not parse, or names a field the schema does not know.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Replaces the configuration with `content` in `format` (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or `format` is neither
    /// `"toml"` nor `"json"`.
    ///
    /// # Example
    ///
    /// ```
    /// use natours_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [rate_limit]
    ///     max_requests = 5
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.rate_limit.max_requests, 5);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unknown config format '{format}'"
                )))
            }
        };
        Ok(self)
    }

    /// Load a `.env` file from the working directory, if there is one.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DotEnv` if the file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(err) if err.not_found() => Ok(self),
            Err(err) => Err(err.into()),
        }
    }

    /// Load a specific `.env`-style file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DotEnv` if the file is missing or malformed.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref())?;
        Ok(self)
    }

    /// Take the runtime mode from `NODE_ENV` when it is set.
    #[must_use]
    pub fn with_node_env(mut self) -> Self {
        self.read_node_env = true;
        self
    }

    /// Applies `PREFIX__SECTION__KEY` variables at [`load`](Self::load).
    /// With prefix `NATOURS`:
    /// - `NATOURS__SERVER__HTTP_ADDR=0.0.0.0:8000`
    /// - `NATOURS__RATE_LIMIT__MAX_REQUESTS=500`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Applies the environment layers and validates the result.
    ///
    /// # Errors
    ///
    /// Fails on an unparsable override or a configuration that does not
    /// pass [`NatoursConfig::validate`].
    pub fn load(mut self) -> Result<NatoursConfig, ConfigError> {
        if self.read_node_env {
            if let Ok(value) = env::var(NODE_ENV) {
                self.apply_node_env(&value)?;
            }
        }

        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without validation or environment overrides.
    #[must_use]
    pub fn load_unvalidated(self) -> NatoursConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<NatoursConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "config file {} is neither .toml nor .json",
                path.display()
            ))),
        }
    }

    fn apply_node_env(&mut self, value: &str) -> Result<(), ConfigError> {
        self.config.environment = Environment::parse(value).ok_or_else(|| {
            ConfigError::env_parse_error(NODE_ENV, "expected 'development', 'production' or 'test'")
        })?;
        Ok(())
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        // sorted so a failing run always reports the same variable
        let overrides: BTreeMap<String, String> = env::vars()
            .filter(|(name, _)| name.starts_with(prefix))
            .collect();
        overrides
            .iter()
            .try_for_each(|(name, value)| self.apply_env_var(name, value, prefix))
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let path = key
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "expected PREFIX__SECTION__KEY"))?;

        let parts: Vec<&str> = path.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["ENVIRONMENT"] => self.apply_node_env(value)?,

            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_int(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                config.server.request_timeout_ms = parse_int(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => config.server.max_body_bytes = parse_int(key, value)?,

            ["STATIC_FILES", "ENABLED"] => config.static_files.enabled = parse_flag(key, value)?,
            ["STATIC_FILES", "ROOT"] => config.static_files.root = value.to_string(),
            ["STATIC_FILES", "INDEX_FILE"] => config.static_files.index_file = value.to_string(),
            ["STATIC_FILES", "MAX_AGE_SECS"] => {
                config.static_files.max_age_secs = parse_int(key, value)?;
            }

            ["RATE_LIMIT", "ENABLED"] => config.rate_limit.enabled = parse_flag(key, value)?,
            ["RATE_LIMIT", "MAX_REQUESTS"] => {
                config.rate_limit.max_requests = parse_int(key, value)?;
            }
            ["RATE_LIMIT", "WINDOW_MS"] => config.rate_limit.window_ms = parse_int(key, value)?,
            ["RATE_LIMIT", "PATH_PREFIX"] => config.rate_limit.path_prefix = value.to_string(),
            ["RATE_LIMIT", "KEY"] => {
                config.rate_limit.key = match value.to_lowercase().as_str() {
                    "remote_addr" => RateLimitKeyMode::RemoteAddr,
                    "forwarded_for" => RateLimitKeyMode::ForwardedFor,
                    "header" => RateLimitKeyMode::Header,
                    "global" => RateLimitKeyMode::Global,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'remote_addr', 'forwarded_for', 'header' or 'global'",
                        ))
                    }
                };
            }
            ["RATE_LIMIT", "KEY_HEADER"] => {
                config.rate_limit.key_header = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            ["RATE_LIMIT", "MESSAGE"] => config.rate_limit.message = value.to_string(),

            ["BODY", "JSON_LIMIT_BYTES"] => config.body.json_limit_bytes = parse_int(key, value)?,
            ["BODY", "FORM_LIMIT_BYTES"] => config.body.form_limit_bytes = parse_int(key, value)?,
            ["BODY", "TEXT_ENABLED"] => config.body.text_enabled = parse_flag(key, value)?,

            ["SANITIZE", "ENABLED"] => config.sanitize.enabled = parse_flag(key, value)?,
            ["SANITIZE", "ALLOW_DOTS"] => config.sanitize.allow_dots = parse_flag(key, value)?,

            ["PARAMETER_POLLUTION", "ENABLED"] => {
                config.parameter_pollution.enabled = parse_flag(key, value)?;
            }
            ["PARAMETER_POLLUTION", "WHITELIST"] => {
                config.parameter_pollution.whitelist = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect();
            }

            ["COMPRESSION", "ENABLED"] => config.compression.enabled = parse_flag(key, value)?,
            ["COMPRESSION", "MIN_SIZE_BYTES"] => {
                config.compression.min_size_bytes = parse_int(key, value)?;
            }
            ["COMPRESSION", "LEVEL"] => config.compression.level = parse_int(key, value)?,

            ["ERRORS", "EXPOSE_INTERNAL_ERRORS"] => {
                config.errors.expose_internal_errors = parse_flag(key, value)?;
            }

            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "ANSI_ENABLED"] => config.logging.ansi_enabled = parse_flag(key, value)?,

            // unknown keys are ignored
            _ => {}
        }
        Ok(())
    }
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
