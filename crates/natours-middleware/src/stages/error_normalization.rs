//! Error normalization.
//!
//! Every failure produced anywhere in the pipeline ends here and is turned
//! into the client-facing envelope:
//!
//! ```json
//! { "status": "fail", "message": "Route /nope not found on this server" }
//! ```
//!
//! Operational failures are passed through verbatim with their status
//! (`"fail"` for 4xx, `"error"` otherwise). Anything else is logged in
//! full and answered with a generic 500.
//!
//! # Example
//!
//! ```
//! use natours_core::{AppError, RequestContext};
//! use natours_middleware::stages::ErrorNormalizer;
//!
//! let normalizer = ErrorNormalizer::new();
//! let response = normalizer.normalize(
//!     &RequestContext::mock(),
//!     &AppError::internal("connection refused"),
//! );
//! assert_eq!(response.status(), 500);
//! ```

use std::error::Error as StdError;

use http::StatusCode;
use natours_config::ErrorsConfig;
use natours_core::{status_text, AppError, RequestContext, Response, ResponseExt, GENERIC_ERROR_MESSAGE};

/// Turns failures into `{status, message}` responses.
#[derive(Debug, Clone, Default)]
pub struct ErrorNormalizer {
    expose_internal_errors: bool,
}

impl ErrorNormalizer {
    /// Creates a normalizer that hides non-operational details.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a normalizer from the `errors` configuration section.
    #[must_use]
    pub fn from_config(config: &ErrorsConfig) -> Self {
        Self::new().expose_internal_errors(config.expose_internal_errors)
    }

    /// Sets whether non-operational messages reach the client.
    ///
    /// **Warning**: Only enable this for local debugging.
    #[must_use]
    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    /// Returns whether non-operational messages reach the client.
    #[must_use]
    pub fn exposes_internal_errors(&self) -> bool {
        self.expose_internal_errors
    }

    /// Builds the client response for `err`.
    pub fn normalize(&self, ctx: &RequestContext, err: &AppError) -> Response {
        let (status, message) = if err.is_operational() {
            tracing::debug!(
                request_id = %ctx.request_id(),
                http.status_code = err.status_code().as_u16(),
                error = %err,
                "operational error"
            );
            (err.status_code(), err.message())
        } else {
            tracing::error!(
                request_id = %ctx.request_id(),
                http.method = %ctx.method(),
                http.url = %ctx.original_url(),
                error = %err,
                cause = %source_chain(err),
                "unexpected error"
            );
            let message = if self.expose_internal_errors {
                err.message()
            } else {
                GENERIC_ERROR_MESSAGE
            };
            (StatusCode::INTERNAL_SERVER_ERROR, message)
        };

        let body = serde_json::json!({
            "status": status_text(status),
            "message": message,
        });

        let mut response = Response::json(status, &body);
        for (name, value) in err.headers() {
            response.headers_mut().append(name.clone(), value.clone());
        }
        response
    }
}

/// Joins the `source()` chain below `err` with `": "`.
fn source_chain(err: &AppError) -> String {
    let mut parts = Vec::new();
    let mut current = err.source();
    while let Some(cause) = current {
        parts.push(cause.to_string());
        current = cause.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::header;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes: Bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_operational_client_error() {
        let normalizer = ErrorNormalizer::new();
        let err = AppError::not_found_route("/missing");
        let response = normalizer.normalize(&RequestContext::mock(), &err);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
        let body = body_json(response).await;
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "Route /missing not found on this server");
    }

    #[tokio::test]
    async fn test_operational_server_error_keeps_message() {
        let normalizer = ErrorNormalizer::new();
        let err = AppError::new("upstream unavailable", StatusCode::SERVICE_UNAVAILABLE);
        let response = normalizer.normalize(&RequestContext::mock(), &err);

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "upstream unavailable");
    }

    #[tokio::test]
    async fn test_non_operational_is_hidden() {
        let normalizer = ErrorNormalizer::new();
        let err = AppError::unexpected(anyhow::anyhow!("db password is hunter2"));
        let response = normalizer.normalize(&RequestContext::mock(), &err);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], GENERIC_ERROR_MESSAGE);
        assert!(!body.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_expose_internal_errors() {
        let normalizer = ErrorNormalizer::new().expose_internal_errors(true);
        assert!(normalizer.exposes_internal_errors());

        let err = AppError::internal("handler missing");
        let body = body_json(normalizer.normalize(&RequestContext::mock(), &err)).await;
        assert_eq!(body["message"], "handler missing");
    }

    #[test]
    fn test_from_config() {
        let config = ErrorsConfig {
            expose_internal_errors: true,
        };
        assert!(ErrorNormalizer::from_config(&config).exposes_internal_errors());
        assert!(!ErrorNormalizer::from_config(&ErrorsConfig::default()).exposes_internal_errors());
    }

    #[test]
    fn test_headers_copied() {
        let normalizer = ErrorNormalizer::new();
        let err = AppError::too_many_requests("slow down", 120);
        let response = normalizer.normalize(&RequestContext::mock(), &err);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "120");
    }

    #[test]
    fn test_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = AppError::unexpected(anyhow::Error::new(io).context("reading tour"));
        let chain = source_chain(&err);
        assert!(chain.contains("disk on fire"));
    }
}
