//! Development request logging.
//!
//! Emits one `info` event per request after the rest of the chain has run,
//! in the compact `METHOD url status latency - length` shape. Failed
//! requests are logged with the status they are about to be normalized to.

use std::fmt;
use std::time::Duration;

use http::header::CONTENT_LENGTH;
use hyper::body::Body as _;
use natours_core::{AppResult, BoxFuture, RequestContext, Response};

use crate::middleware::{Middleware, Next};
use crate::pipeline::Stage;

/// One logged request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestLogEntry {
    /// HTTP method.
    pub method: String,
    /// Original URL, query included.
    pub url: String,
    /// Response status.
    pub status: u16,
    /// Time spent in the pipeline so far.
    pub latency: Duration,
    /// Response body length, when known.
    pub content_length: Option<u64>,
}

impl RequestLogEntry {
    /// Builds the entry for a finished request.
    #[must_use]
    pub fn collect(ctx: &RequestContext, result: &AppResult<Response>) -> Self {
        let (status, content_length) = match result {
            Ok(response) => {
                let declared = response
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                (
                    response.status().as_u16(),
                    declared.or_else(|| response.body().size_hint().exact()),
                )
            }
            Err(err) => (err.status_code().as_u16(), None),
        };
        Self {
            method: ctx.method().to_string(),
            url: ctx.original_url().to_string(),
            status,
            latency: ctx.elapsed(),
            content_length,
        }
    }

    /// Latency in fractional milliseconds.
    #[must_use]
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

impl fmt::Display for RequestLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {:.3} ms - ",
            self.method,
            self.url,
            self.status,
            self.latency_ms()
        )?;
        match self.content_length {
            Some(len) => write!(f, "{len}"),
            None => f.write_str("-"),
        }
    }
}

/// Logs every request at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLoggerMiddleware;

impl RequestLoggerMiddleware {
    /// Creates the logger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for RequestLoggerMiddleware {
    fn name(&self) -> &'static str {
        Stage::RequestLogger.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, AppResult<Response>> {
        Box::pin(async move {
            let result = next.run(ctx).await;
            let entry = RequestLogEntry::collect(ctx, &result);
            tracing::info!(
                request_id = %ctx.request_id(),
                method = %entry.method,
                url = %entry.url,
                status = entry.status,
                latency_ms = entry.latency_ms(),
                content_length = entry.content_length,
                "{entry}"
            );
            result
        })
    }
}
