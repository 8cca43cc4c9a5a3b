//! Structured logging for the Natours server.
//!
//! Every crate logs through [`tracing`]; this crate installs the subscriber.
//! Production uses JSON lines, development a human-readable format.
//!
//! # Example
//!
//! ```rust,ignore
//! use natours_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(port = 3000, "App running");
//! ```

#![doc(html_root_url = "https://docs.rs/natours-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, FILTER_ENV};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
