//! Fixed-order middleware pipeline.
//!
//! The pipeline is built once at startup and shared by every request. A
//! request walks the stages in order; the first stage that returns a
//! response or a failure ends the walk. Requests that no stage handles
//! reach the not-found terminal, and every failure is handed to the
//! [`ErrorNormalizer`].
//!
//! ## Pipeline Stages
//!
//! | Order | Stage               | Purpose                                  |
//! |-------|---------------------|------------------------------------------|
//! | 1     | Static Assets       | Serve files from the public root         |
//! | 2     | Request Logger      | Log method, url, status, latency (dev)   |
//! | 3     | Rate Limit          | Cap requests per client under `/api`     |
//! | 4     | Body Decoder        | JSON, URL-encoded and text payloads      |
//! | 5     | Cookie Parser       | `Cookie` header into a map               |
//! | 6     | Sanitize            | Strip operator keys, escape markup       |
//! | 7     | Parameter Pollution | Collapse duplicate query parameters      |
//! | 8     | Compression         | gzip / deflate / brotli responses        |
//! | 9     | Router Dispatch     | Mounted route groups and handlers        |
//! | 10    | Not Found           | Unrouted request becomes a 404 failure   |
//! | 11    | Error Normalization | Failure into `{status, message}`         |

use std::sync::Arc;

use natours_core::{AppResult, RequestContext, Response};

use crate::middleware::{Middleware, Next};
use crate::stages::error_normalization::ErrorNormalizer;
use crate::stages::not_found;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The middleware pipeline.
///
/// # Example
///
/// ```
/// use natours_middleware::pipeline::Pipeline;
/// use natours_middleware::stages::CookieParserMiddleware;
///
/// let pipeline = Pipeline::builder()
///     .stage(CookieParserMiddleware::new())
///     .build();
/// assert_eq!(pipeline.stage_names(), vec!["cookie_parser"]);
/// ```
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
    normalizer: ErrorNormalizer,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs the request through every stage, returning the raw outcome.
    pub async fn process(&self, ctx: &mut RequestContext) -> AppResult<Response> {
        self.build_chain().run(ctx).await
    }

    /// Runs the request and converts any failure into its client response.
    pub async fn handle(&self, mut ctx: RequestContext) -> Response {
        match self.process(&mut ctx).await {
            Ok(response) => response,
            Err(err) => self.normalizer.normalize(&ctx, &err),
        }
    }

    /// Returns the error normalizer used by [`Pipeline::handle`].
    #[must_use]
    pub fn normalizer(&self) -> &ErrorNormalizer {
        &self.normalizer
    }

    fn build_chain(&self) -> Next<'_> {
        let mut next = Next::terminal(not_found::terminate);
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the names of all middleware stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of middleware stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("normalizer", &self.normalizer)
            .finish()
    }
}

/// Builder for constructing a [`Pipeline`].
///
/// Stages run in the order they are added.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
    normalizer: ErrorNormalizer,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends a stage that is shared with other owners.
    #[must_use]
    pub fn shared_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Appends a stage only when `enabled`.
    #[must_use]
    pub fn stage_if<M, F>(self, enabled: bool, make: F) -> Self
    where
        M: Middleware,
        F: FnOnce() -> M,
    {
        if enabled {
            self.stage(make())
        } else {
            self
        }
    }

    /// Sets the error normalizer.
    #[must_use]
    pub fn error_normalizer(mut self, normalizer: ErrorNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
            normalizer: self.normalizer,
        }
    }
}

/// The components of the request pipeline, in traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: static file serving
    StaticAssets = 1,
    /// Stage 2: development request logging
    RequestLogger = 2,
    /// Stage 3: per-client rate limiting
    RateLimit = 3,
    /// Stage 4: body decoding
    BodyDecoder = 4,
    /// Stage 5: cookie parsing
    CookieParser = 5,
    /// Stage 6: input sanitization
    Sanitize = 6,
    /// Stage 7: parameter de-duplication
    ParameterPollution = 7,
    /// Stage 8: response compression
    Compression = 8,
    /// Stage 9: route dispatch
    RouterDispatch = 9,
    /// Stage 10: not-found terminal
    NotFound = 10,
    /// Stage 11: error normalization
    ErrorNormalization = 11,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::StaticAssets => "static_assets",
            Self::RequestLogger => "request_logger",
            Self::RateLimit => "rate_limit",
            Self::BodyDecoder => "body_decoder",
            Self::CookieParser => "cookie_parser",
            Self::Sanitize => "sanitize",
            Self::ParameterPollution => "parameter_pollution",
            Self::Compression => "compression",
            Self::RouterDispatch => "router_dispatch",
            Self::NotFound => "not_found",
            Self::ErrorNormalization => "error_normalization",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 11] {
        [
            Self::StaticAssets,
            Self::RequestLogger,
            Self::RateLimit,
            Self::BodyDecoder,
            Self::CookieParser,
            Self::Sanitize,
            Self::ParameterPollution,
            Self::Compression,
            Self::RouterDispatch,
            Self::NotFound,
            Self::ErrorNormalization,
        ]
    }

    /// Returns true for the stages that are [`Middleware`] objects in the
    /// chain; the last two are the chain's terminal and its error sink.
    #[must_use]
    pub const fn is_middleware(self) -> bool {
        (self as u8) <= 9
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use natours_core::{AppError, BoxFuture, ResponseExt};
    use std::sync::Mutex;

    struct OrderTracking {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for OrderTracking {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut RequestContext,
            next: Next<'a>,
        ) -> BoxFuture<'a, AppResult<Response>> {
            Box::pin(async move {
                self.order.lock().unwrap().push(self.name);
                next.run(ctx).await
            })
        }
    }

    struct Respond;

    impl Middleware for Respond {
        fn name(&self) -> &'static str {
            "respond"
        }

        fn process<'a>(
            &'a self,
            _ctx: &'a mut RequestContext,
            _next: Next<'a>,
        ) -> BoxFuture<'a, AppResult<Response>> {
            Box::pin(async { Ok(Response::text(StatusCode::OK, "handled")) })
        }
    }

    struct Fail;

    impl Middleware for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn process<'a>(
            &'a self,
            _ctx: &'a mut RequestContext,
            _next: Next<'a>,
        ) -> BoxFuture<'a, AppResult<Response>> {
            Box::pin(async { Err(AppError::bad_request("nope")) })
        }
    }

    #[tokio::test]
    async fn test_pipeline_executes_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .stage(OrderTracking {
                name: "first",
                order: order.clone(),
            })
            .stage(OrderTracking {
                name: "second",
                order: order.clone(),
            })
            .stage(Respond)
            .stage(OrderTracking {
                name: "unreached",
                order: order.clone(),
            })
            .build();

        let response = pipeline.handle(RequestContext::mock()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_not_found() {
        let pipeline = Pipeline::builder().build();
        let mut ctx = RequestContext::new(http::Method::GET, "/nowhere?x=1".parse().unwrap());

        let err = pipeline.process(&mut ctx).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Route /nowhere?x=1 not found on this server");
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_stages() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .stage(Fail)
            .stage(OrderTracking {
                name: "after",
                order: order.clone(),
            })
            .build();

        let response = pipeline.handle(RequestContext::mock()).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(order.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stage_if() {
        let pipeline = Pipeline::builder()
            .stage_if(false, || Respond)
            .stage_if(true, || Fail)
            .build();
        assert_eq!(pipeline.stage_names(), vec!["fail"]);
        assert_eq!(pipeline.stage_count(), 1);
    }

    #[test]
    fn test_stage_ordering() {
        let stages = Stage::all();
        assert_eq!(stages.len(), 11);
        assert!(stages.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(stages[0].name(), "static_assets");
        assert_eq!(stages[10].name(), "error_normalization");
    }

    #[test]
    fn test_stage_is_middleware() {
        assert!(Stage::Compression.is_middleware());
        assert!(Stage::RouterDispatch.is_middleware());
        assert!(!Stage::NotFound.is_middleware());
        assert!(!Stage::ErrorNormalization.is_middleware());
    }
}
