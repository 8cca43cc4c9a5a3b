//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors that stop the server from running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `server.http_addr` is not a socket address.
    #[error("invalid listen address '{addr}': {reason}")]
    InvalidAddress {
        /// The configured address.
        addr: String,
        /// Why it failed to parse.
        reason: String,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Listener I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
