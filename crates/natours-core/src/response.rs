//! Response types shared by stages and handlers.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;

/// The HTTP response type produced by the pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Constructors for common response shapes.
pub trait ResponseExt {
    /// A JSON response with `Content-Type: application/json; charset=utf-8`.
    fn json(status: StatusCode, body: &serde_json::Value) -> Response;

    /// A plain text response.
    fn text(status: StatusCode, body: impl Into<String>) -> Response;

    /// A response with no body.
    fn empty(status: StatusCode) -> Response;
}

impl ResponseExt for Response {
    fn json(status: StatusCode, body: &serde_json::Value) -> Response {
        with_body(
            status,
            Bytes::from(body.to_string()),
            "application/json; charset=utf-8",
        )
    }

    fn text(status: StatusCode, body: impl Into<String>) -> Response {
        with_body(status, Bytes::from(body.into()), "text/plain; charset=utf-8")
    }

    fn empty(status: StatusCode) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }
}

fn with_body(status: StatusCode, body: Bytes, content_type: &'static str) -> Response {
    let mut response = http::Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response() {
        let response = Response::json(StatusCode::OK, &serde_json::json!({"status": "success"}));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
    }

    #[test]
    fn test_text_response() {
        let response = Response::text(StatusCode::NOT_FOUND, "nope");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_empty_response() {
        let response = Response::empty(StatusCode::NO_CONTENT);
        assert!(response.headers().is_empty());
    }
}
