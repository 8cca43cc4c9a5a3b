//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};

/// Runtime mode, read from `NODE_ENV`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development. Enables the request logger.
    #[default]
    Development,
    /// Production deployment.
    Production,
    /// Automated tests.
    Test,
}

impl Environment {
    /// Parses a `NODE_ENV` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            "test" => Some(Self::Test),
            _ => None,
        }
    }

    /// Returns true in development mode.
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Server configuration section.
///
/// # Example
///
/// ```
/// use natours_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:3000".to_string(),
///     ..ServerConfig::default()
/// };
/// assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Request timeout in milliseconds, covering body collection and the chain.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Hard ceiling on collected body bytes, before any decoder runs.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// Static asset section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StaticFilesConfig {
    /// Serve files at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory served at `/`.
    #[serde(default = "default_static_root")]
    pub root: String,

    /// File served for directory requests. Empty disables index files.
    #[serde(default = "default_index_file")]
    pub index_file: String,

    /// `max-age` of the `Cache-Control` header.
    #[serde(default)]
    pub max_age_secs: u64,

    /// Emit `ETag` and honor `If-None-Match`.
    #[serde(default = "default_true")]
    pub etag: bool,

    /// Emit `Last-Modified` and honor `If-Modified-Since`.
    #[serde(default = "default_true")]
    pub last_modified: bool,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: default_static_root(),
            index_file: default_index_file(),
            max_age_secs: 0,
            etag: true,
            last_modified: true,
        }
    }
}

fn default_static_root() -> String {
    "public".to_string()
}

fn default_index_file() -> String {
    "index.html".to_string()
}

/// How the rate limiter identifies a client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKeyMode {
    /// The connection's peer IP.
    #[default]
    RemoteAddr,
    /// First `X-Forwarded-For` entry, falling back to the peer IP.
    ForwardedFor,
    /// The value of `rate_limit.key_header`.
    Header,
    /// One shared counter for every client.
    Global,
}

/// Rate limiting section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Enable the rate limiter.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests allowed per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Only paths inside this prefix are counted.
    #[serde(default = "default_rate_limit_prefix")]
    pub path_prefix: String,

    /// Client identity.
    #[serde(default)]
    pub key: RateLimitKeyMode,

    /// Header read when `key = "header"`.
    #[serde(default)]
    pub key_header: Option<String>,

    /// Message of the 429 failure.
    #[serde(default = "default_rate_limit_message")]
    pub message: String,

    /// Send `X-RateLimit-*` headers on allowed responses.
    #[serde(default = "default_true")]
    pub headers: bool,

    /// How often expired windows are dropped, in seconds.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            path_prefix: default_rate_limit_prefix(),
            key: RateLimitKeyMode::default(),
            key_header: None,
            message: default_rate_limit_message(),
            headers: true,
            prune_interval_secs: default_prune_interval(),
        }
    }
}

fn default_max_requests() -> u64 {
    100
}

fn default_window_ms() -> u64 {
    60 * 60 * 1000
}

fn default_rate_limit_prefix() -> String {
    "/api".to_string()
}

fn default_rate_limit_message() -> String {
    "Too many requests from this IP, please try again in an hour".to_string()
}

fn default_prune_interval() -> u64 {
    60
}

/// Body decoding section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BodyConfig {
    /// Maximum JSON body size in bytes.
    #[serde(default = "default_json_limit")]
    pub json_limit_bytes: usize,

    /// Only accept objects and arrays at the JSON top level.
    #[serde(default = "default_true")]
    pub json_strict: bool,

    /// Maximum URL-encoded body size in bytes.
    #[serde(default = "default_form_limit")]
    pub form_limit_bytes: usize,

    /// Maximum number of URL-encoded pairs.
    #[serde(default = "default_form_parameter_limit")]
    pub form_parameter_limit: usize,

    /// Decode `text/plain` bodies.
    #[serde(default = "default_true")]
    pub text_enabled: bool,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            json_limit_bytes: default_json_limit(),
            json_strict: true,
            form_limit_bytes: default_form_limit(),
            form_parameter_limit: default_form_parameter_limit(),
            text_enabled: true,
        }
    }
}

fn default_json_limit() -> usize {
    100 * 1024
}

fn default_form_limit() -> usize {
    10 * 1024
}

fn default_form_parameter_limit() -> usize {
    1000
}

/// Input sanitization section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SanitizeConfig {
    /// Enable sanitization.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Keep keys containing `.`; `$`-prefixed keys are always removed.
    #[serde(default)]
    pub allow_dots: bool,

    /// Escape `<` and `>` in string values.
    #[serde(default = "default_true")]
    pub escape_html: bool,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_dots: false,
            escape_html: true,
        }
    }
}

/// Parameter pollution section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ParameterPollutionConfig {
    /// Enable de-duplication.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Keys whose repeated values are all kept.
    #[serde(default = "default_whitelist")]
    pub whitelist: Vec<String>,

    /// Also de-duplicate URL-encoded form bodies.
    #[serde(default = "default_true")]
    pub check_body: bool,
}

impl Default for ParameterPollutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            whitelist: default_whitelist(),
            check_body: true,
        }
    }
}

fn default_whitelist() -> Vec<String> {
    [
        "authorization",
        "content-type",
        "dnt",
        "origin",
        "duration",
        "difficulty",
        "price",
        "maxGroupSize",
        "ratingQuantity",
        "ratingAverage",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Response compression section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CompressionConfig {
    /// Enable compression.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Smallest body worth compressing, in bytes.
    #[serde(default = "default_min_size")]
    pub min_size_bytes: usize,

    /// Compression level, 0-9.
    #[serde(default = "default_compression_level")]
    pub level: u32,

    /// Offer gzip.
    #[serde(default = "default_true")]
    pub gzip: bool,

    /// Offer deflate.
    #[serde(default = "default_true")]
    pub deflate: bool,

    /// Offer brotli.
    #[serde(default = "default_true")]
    pub brotli: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size_bytes: default_min_size(),
            level: default_compression_level(),
            gzip: true,
            deflate: true,
            brotli: true,
        }
    }
}

fn default_min_size() -> usize {
    1024
}

fn default_compression_level() -> u32 {
    6
}

/// Error reporting section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ErrorsConfig {
    /// Send non-operational messages to clients. Local debugging only.
    #[serde(default)]
    pub expose_internal_errors: bool,
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
