//! Typed configuration for the Natours server.
//!
//! This crate provides a strongly-typed configuration system with support for:
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → `.env` → env)
//!
//! # Overview
//!
//! [`NatoursConfig`] holds one section per pipeline concern:
//!
//! - [`ServerConfig`] - Bind address, timeouts, global body ceiling
//! - [`StaticFilesConfig`] - Public asset directory
//! - [`RateLimitConfig`] - Window, maximum and client identity
//! - [`BodyConfig`] - Per-decoder size caps
//! - [`SanitizeConfig`] - Operator key stripping and HTML escaping
//! - [`ParameterPollutionConfig`] - De-duplication whitelist
//! - [`CompressionConfig`] - Response compression
//! - [`ErrorsConfig`] - Error reporting
//! - [`LoggingConfig`] - Log level and format
//!
//! # Example
//!
//! ```no_run
//! use natours_config::ConfigLoader;
//!
//! # fn main() -> Result<(), natours_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("natours.toml")?
//!     .with_dotenv()?
//!     .with_node_env()
//!     .with_env_prefix("NATOURS")
//!     .load()?;
//!
//! println!("Server will listen on: {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! environment = "production"
//!
//! [server]
//! http_addr = "0.0.0.0:3000"
//! max_body_bytes = 10485760
//!
//! [rate_limit]
//! max_requests = 100
//! window_ms = 3600000
//! path_prefix = "/api"
//! key = "forwarded_for"
//!
//! [body]
//! json_limit_bytes = 102400
//! form_limit_bytes = 10240
//!
//! [parameter_pollution]
//! whitelist = ["duration", "difficulty", "price"]
//! ```
//!
//! # Environment Variables
//!
//! `NODE_ENV` selects the runtime mode. Every other field can be set with
//! `NATOURS__SECTION__KEY`, for example `NATOURS__RATE_LIMIT__MAX_REQUESTS=500`.

#![doc(html_root_url = "https://docs.rs/natours-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::NatoursConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, NODE_ENV};
pub use schema::{
    BodyConfig, CompressionConfig, Environment, ErrorsConfig, LogFormat, LoggingConfig,
    ParameterPollutionConfig, RateLimitConfig, RateLimitKeyMode, SanitizeConfig, ServerConfig,
    StaticFilesConfig,
};
