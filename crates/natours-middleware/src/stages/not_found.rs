//! Not-found terminal.
//!
//! The end of every chain: a request that no stage answered becomes an
//! operational 404 naming the original URL.

use natours_core::{AppError, AppResult, BoxFuture, RequestContext, Response};

/// Fails with `Route <originalUrl> not found on this server`.
pub fn terminate(ctx: &mut RequestContext) -> BoxFuture<'static, AppResult<Response>> {
    let err = AppError::not_found_route(ctx.original_url());
    tracing::debug!(request_id = %ctx.request_id(), http.url = %ctx.original_url(), "no route matched");
    Box::pin(std::future::ready(Err(err)))
}
