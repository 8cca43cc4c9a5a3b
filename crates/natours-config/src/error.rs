//! Errors raised while loading or validating a [`NatoursConfig`](crate::NatoursConfig).

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration file does not exist.
    #[error("config file {path} does not exist")]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read config file {path}")]
    ReadError {
        /// Path that was read.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML, or TOML that does not fit the schema.
    #[error("bad TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Malformed JSON, or JSON that does not fit the schema.
    #[error("bad JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A field holds a value outside its allowed range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the field, e.g. `rate_limit.window_ms`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An override variable (`NODE_ENV`, `NATOURS__*`) could not be applied.
    #[error("cannot apply {var}: {reason}")]
    EnvParseError {
        /// Variable name.
        var: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A `.env` file exists but could not be loaded.
    #[error("cannot load .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),

    /// Fields that are individually valid but inconsistent together.
    #[error("inconsistent configuration: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub(crate) fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub(crate) fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// The offending field or variable, when the error names one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { field, .. } => Some(field),
            Self::EnvParseError { var, .. } => Some(var),
            _ => None,
        }
    }
}
