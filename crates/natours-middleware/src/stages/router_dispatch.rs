//! Route dispatch.
//!
//! Matches the request against the mounted route groups, writes the captured
//! parameters and operation id into the context, and invokes the handler.
//! Unmatched requests continue down the chain to the not-found terminal.
//!
//! Route parameters only exist once a route has matched, so the input
//! sanitizer's policy for them is applied here rather than in the
//! sanitize stage.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use natours_core::{AppError, AppResult, BoxFuture, HandlerRegistry, RequestContext, Response};
use natours_router::MountTable;

use crate::middleware::{Middleware, Next};
use crate::pipeline::Stage;
use crate::stages::sanitize::SanitizeMiddleware;

/// Route groups, each carrying the handlers for its operations.
pub type RouteTable = MountTable<HandlerRegistry>;

/// Dispatches matched requests to their handler.
///
/// A handler that panics is reported as an unexpected failure instead of
/// tearing down the connection task.
#[derive(Debug, Clone)]
pub struct RouterDispatcher {
    routes: Arc<RouteTable>,
    sanitizer: Option<SanitizeMiddleware>,
}

impl RouterDispatcher {
    /// Creates a dispatcher over `routes`.
    #[must_use]
    pub fn new(routes: RouteTable) -> Self {
        Self::shared(Arc::new(routes))
    }

    /// Creates a dispatcher over a shared table.
    #[must_use]
    pub fn shared(routes: Arc<RouteTable>) -> Self {
        Self {
            routes,
            sanitizer: None,
        }
    }

    /// Sanitizes captured route parameters with `sanitizer` before the
    /// handler sees them.
    #[must_use]
    pub fn sanitize_params(mut self, sanitizer: SanitizeMiddleware) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    /// The route table.
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl Middleware for RouterDispatcher {
    fn name(&self) -> &'static str {
        Stage::RouterDispatch.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, AppResult<Response>> {
        Box::pin(async move {
            let Some(found) = self.routes.dispatch(ctx.method(), ctx.path()) else {
                return next.run(ctx).await;
            };

            let operation_id = found.operation_id.to_string();
            let registry = found.group;
            ctx.set_params(found.params);
            ctx.set_operation_id(operation_id.as_str());
            if let Some(sanitizer) = &self.sanitizer {
                let removed = sanitizer.sanitize_params(ctx.params_mut());
                if removed > 0 {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        removed,
                        "removed prohibited route parameters"
                    );
                }
            }

            let Some(handler) = registry.get(&operation_id) else {
                return Err(AppError::internal(format!(
                    "no handler registered for operation '{operation_id}'"
                )));
            };

            tracing::debug!(
                request_id = %ctx.request_id(),
                operation_id = %operation_id,
                mount = found.prefix,
                "dispatching"
            );

            match AssertUnwindSafe(handler.call(ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(AppError::internal(format!(
                    "handler '{operation_id}' panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            }
        })
    }
}
