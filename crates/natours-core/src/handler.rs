//! Route handler trait and registry.
//!
//! Route handlers are the business logic behind a route group: they are
//! looked up by operation id once the dispatcher has matched a route.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::error::AppResult;
use crate::response::{BoxFuture, Response};
use crate::RequestContext;

/// Business logic behind one operation.
///
/// # Example
///
/// ```rust
/// use natours_core::{AppResult, BoxFuture, Handler, RequestContext, Response, ResponseExt};
/// use http::StatusCode;
///
/// struct Health;
///
/// impl Handler for Health {
///     fn call<'a>(&'a self, _ctx: &'a mut RequestContext) -> BoxFuture<'a, AppResult<Response>> {
///         Box::pin(async { Ok(Response::text(StatusCode::OK, "ok")) })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handles the request.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`](crate::AppError) that the error normalizer
    /// turns into the client response.
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, AppResult<Response>>;
}

/// A handler built from an async closure over a snapshot of the context.
///
/// The closure receives an owned clone of the context, which keeps the
/// returned future free of borrows.
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F> {
    /// Wraps `func`.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Response>> + Send + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, AppResult<Response>> {
        let fut = (self.func)(ctx.clone());
        Box::pin(fut)
    }
}

/// Wraps an async closure as a [`Handler`].
pub const fn handler_fn<F>(func: F) -> FnHandler<F> {
    FnHandler::new(func)
}

/// Handlers of one route group, keyed by operation id.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `operation_id`, replacing any previous one.
    pub fn register<H: Handler>(&mut self, operation_id: impl Into<String>, handler: H) {
        self.handlers.insert(operation_id.into(), Arc::new(handler));
    }

    /// Registers a shared handler for `operation_id`.
    pub fn register_shared(&mut self, operation_id: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(operation_id.into(), handler);
    }

    /// Looks up the handler for `operation_id`.
    #[must_use]
    pub fn get(&self, operation_id: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(operation_id)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut operations: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        operations.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("operations", &operations)
            .finish()
    }
}
