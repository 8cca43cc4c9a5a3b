//! Core middleware trait and the chain continuation.
//!
//! Every pipeline stage implements [`Middleware`]. A stage receives the
//! mutable [`RequestContext`] and a [`Next`] continuation; it can
//! short-circuit with its own response, fail with an [`AppError`], or call
//! [`Next::run`] and post-process whatever comes back.
//!
//! [`AppError`]: natours_core::AppError
//!
//! # Example
//!
//! ```
//! use natours_core::{AppResult, BoxFuture, RequestContext, Response};
//! use natours_middleware::{Middleware, Next};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut RequestContext,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, AppResult<Response>> {
//!         Box::pin(async move {
//!             let result = next.run(ctx).await;
//!             tracing::debug!(elapsed = ?ctx.elapsed(), "chain finished");
//!             result
//!         })
//!     }
//! }
//! ```

use natours_core::{AppResult, BoxFuture, RequestContext, Response};

/// The core middleware trait.
///
/// # Invariants
///
/// - A stage calls `next.run()` at most once
/// - A stage that fails returns `Err`; it never builds an error response
///   itself, so every failure reaches the error normalizer
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    fn name(&self) -> &'static str;

    /// Process the request through this middleware.
    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, AppResult<Response>>;
}

/// Terminal function invoked when every stage has passed the request on.
pub type Terminal = fn(&mut RequestContext) -> BoxFuture<'static, AppResult<Response>>;

/// Continuation to the rest of the chain.
///
/// Consumed by [`Next::run`], so it can only be invoked once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Terminal(Terminal),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that invokes `middleware`, then `next`.
    pub fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates the end of the chain.
    pub fn terminal(terminal: Terminal) -> Self {
        Self {
            inner: NextInner::Terminal(terminal),
        }
    }

    /// Invokes the next middleware or the terminal.
    pub async fn run(self, ctx: &mut RequestContext) -> AppResult<Response> {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, *next).await,
            NextInner::Terminal(terminal) => terminal(ctx).await,
        }
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            NextInner::Chain { middleware, .. } => f
                .debug_struct("Next")
                .field("middleware", &middleware.name())
                .finish_non_exhaustive(),
            NextInner::Terminal(_) => f.write_str("Next(terminal)"),
        }
    }
}
