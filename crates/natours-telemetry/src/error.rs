use thiserror::Error;

/// Logging setup failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The subscriber could not be installed, usually because one already is.
    #[error("cannot install log subscriber: {0}")]
    LoggingInit(String),

    /// A filter directive did not parse.
    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidFilter {
        /// The directive as given.
        directive: String,
        /// Parser message.
        reason: String,
    },
}
