//! Cookie parsing middleware.
//!
//! Fills [`RequestContext::cookies`] from the `Cookie` header. Never fails:
//! a missing or non-UTF-8 header leaves the map empty.

use natours_core::{AppResult, BoxFuture, Cookies, RequestContext, Response};

use crate::middleware::{Middleware, Next};
use crate::pipeline::Stage;

/// Cookie parsing middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieParserMiddleware;

impl CookieParserMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for CookieParserMiddleware {
    fn name(&self) -> &'static str {
        Stage::CookieParser.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, AppResult<Response>> {
        Box::pin(async move {
            if let Some(header) = ctx.header("cookie") {
                let cookies = Cookies::parse(header);
                ctx.set_cookies(cookies);
            }
            next.run(ctx).await
        })
    }
}
