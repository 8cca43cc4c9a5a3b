//! Structured failures raised by pipeline stages and route handlers.
//!
//! Every stage and handler returns [`AppResult`]. A failure is either
//! *operational* (an expected client-facing condition such as a malformed
//! body, an unknown route or an exhausted rate limit) or *non-operational*
//! (a bug or an infrastructure fault). Only the error normalization stage
//! turns an [`AppError`] into a response; see `natours-middleware`.
//!
//! | Constructor | Status | Operational |
//! |---|---|---|
//! | [`AppError::new`] | any | yes |
//! | [`AppError::bad_request`] | 400 | yes |
//! | [`AppError::not_found_route`] | 404 | yes |
//! | [`AppError::payload_too_large`] | 413 | yes |
//! | [`AppError::too_many_requests`] | 429 | yes |
//! | [`AppError::internal`] | 500 | no |
//! | [`AppError::unexpected`] | 500 | no |

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use thiserror::Error;

/// Result type alias using [`AppError`].
pub type AppResult<T> = Result<T, AppError>;

/// Message returned to clients in place of a non-operational failure.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went very wrong!";

/// A failure travelling from its creator to the error normalizer.
///
/// # Example
///
/// ```
/// use natours_core::AppError;
/// use http::StatusCode;
///
/// let err = AppError::not_found_route("/api/v1/unknown?x=1");
/// assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
/// assert_eq!(err.message(), "Route /api/v1/unknown?x=1 not found on this server");
/// assert!(err.is_operational());
/// assert_eq!(err.status_text(), "fail");
/// ```
#[derive(Error, Debug)]
#[error("{message}")]
pub struct AppError {
    message: String,
    status_code: StatusCode,
    operational: bool,
    headers: HeaderMap,
    #[source]
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Creates an operational failure with an explicit status.
    #[must_use]
    pub fn new(message: impl Into<String>, status_code: StatusCode) -> Self {
        Self {
            message: message.into(),
            status_code,
            operational: true,
            headers: HeaderMap::new(),
            source: None,
        }
    }

    /// Malformed client input.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::BAD_REQUEST)
    }

    /// No mounted route matched `original_url` (path plus query string).
    #[must_use]
    pub fn not_found_route(original_url: &str) -> Self {
        Self::new(
            format!("Route {original_url} not found on this server"),
            StatusCode::NOT_FOUND,
        )
    }

    /// A body exceeded its decoder's size cap.
    #[must_use]
    pub fn payload_too_large() -> Self {
        Self::new("request entity too large", StatusCode::PAYLOAD_TOO_LARGE)
    }

    /// A client exhausted its rate-limit window.
    ///
    /// `retry_after_secs` becomes the `Retry-After` header of the response.
    #[must_use]
    pub fn too_many_requests(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::new(message, StatusCode::TOO_MANY_REQUESTS)
            .with_header(http::header::RETRY_AFTER, HeaderValue::from(retry_after_secs))
    }

    /// A non-operational failure described only by a message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            operational: false,
            headers: HeaderMap::new(),
            source: None,
        }
    }

    /// Wraps an unannotated error as a non-operational failure.
    pub fn unexpected(source: impl Into<anyhow::Error>) -> Self {
        let source = source.into();
        Self {
            message: source.to_string(),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            operational: false,
            headers: HeaderMap::new(),
            source: Some(source),
        }
    }

    /// Attaches a header that the error response will carry.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns the failure message as created.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the status the creator assigned.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.status_code
    }

    /// Returns true if the message is safe to show to clients.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        self.operational
    }

    /// Returns the headers attached to this failure.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `"fail"` for 4xx statuses, `"error"` for everything else.
    #[must_use]
    pub fn status_text(&self) -> &'static str {
        status_text(self.status_code)
    }
}

/// `"fail"` for 4xx statuses, `"error"` for everything else.
#[must_use]
pub fn status_text(status: StatusCode) -> &'static str {
    if status.is_client_error() {
        "fail"
    } else {
        "error"
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::unexpected(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::unexpected(err)
    }
}
