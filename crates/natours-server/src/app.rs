//! Application assembly.
//!
//! [`AppBuilder`] turns a [`NatoursConfig`] and the route groups into the
//! fixed-order [`Pipeline`]. Route groups are mounted views first, then
//! the API groups, whatever order they are supplied in.
//!
//! # Example
//!
//! ```rust
//! use natours_config::NatoursConfig;
//! use natours_core::HandlerRegistry;
//! use natours_router::{MethodRouter, Router};
//! use natours_server::{App, RouteGroup};
//!
//! let mut tours = Router::new();
//! tours.insert("/", MethodRouter::new().get("getAllTours")).unwrap();
//!
//! let app = App::builder(NatoursConfig::production())
//!     .group(RouteGroup::Tours, tours, HandlerRegistry::new())
//!     .build();
//! assert!(!app.pipeline().stage_names().contains(&"request_logger"));
//! ```

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use natours_config::NatoursConfig;
use natours_core::{AppError, HandlerRegistry, RequestContext, Response};
use natours_middleware::stages::{
    BodyDecoderMiddleware, CompressionMiddleware, CookieParserMiddleware, ErrorNormalizer,
    ParameterPollutionMiddleware, RateLimitBuilder, RateLimitMiddleware, RateLimitStore,
    RequestLoggerMiddleware, RouteTable, RouterDispatcher, SanitizeMiddleware,
    StaticAssetsMiddleware,
};
use natours_middleware::{BoxedMiddleware, Pipeline};
use natours_router::Router;

/// The mounted route groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteGroup {
    /// Rendered pages, mounted at `/`.
    Views,
    /// `/api/v1/tours`
    Tours,
    /// `/api/v1/users`
    Users,
    /// `/api/v1/reviews`
    Reviews,
    /// `/api/v1/booking`
    Booking,
}

impl RouteGroup {
    /// Mount prefix of the group.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Views => "/",
            Self::Tours => "/api/v1/tours",
            Self::Users => "/api/v1/users",
            Self::Reviews => "/api/v1/reviews",
            Self::Booking => "/api/v1/booking",
        }
    }

    /// All groups in mount order.
    #[must_use]
    pub const fn all() -> [RouteGroup; 5] {
        [
            Self::Views,
            Self::Tours,
            Self::Users,
            Self::Reviews,
            Self::Booking,
        ]
    }
}

/// The assembled application: pipeline plus the handles the server needs.
#[derive(Debug, Clone)]
pub struct App {
    pipeline: Arc<Pipeline>,
    rate_limiter: Option<Arc<RateLimitMiddleware>>,
    config: Arc<NatoursConfig>,
}

impl App {
    /// Starts assembling an application from `config`.
    #[must_use]
    pub fn builder(config: NatoursConfig) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The request pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The rate limiter, when enabled.
    #[must_use]
    pub fn rate_limiter(&self) -> Option<&Arc<RateLimitMiddleware>> {
        self.rate_limiter.as_ref()
    }

    /// The configuration the app was built from.
    #[must_use]
    pub fn config(&self) -> &NatoursConfig {
        &self.config
    }

    /// Runs a request through the pipeline; failures come back normalized.
    pub async fn handle(&self, ctx: RequestContext) -> Response {
        self.pipeline.handle(ctx).await
    }

    /// Like [`App::handle`], failing with 503 once `timeout` elapses.
    pub async fn handle_with_timeout(&self, mut ctx: RequestContext, timeout: Duration) -> Response {
        let result = match tokio::time::timeout(timeout, self.pipeline.process(&mut ctx)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    url = ctx.original_url(),
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "request timed out"
                );
                Err(AppError::new(
                    "Request timed out",
                    StatusCode::SERVICE_UNAVAILABLE,
                ))
            }
        };
        match result {
            Ok(response) => response,
            Err(err) => self.pipeline.normalizer().normalize(&ctx, &err),
        }
    }

    /// Renders a failure raised outside the pipeline (e.g. while collecting
    /// the body).
    #[must_use]
    pub fn reject(&self, ctx: &RequestContext, err: &AppError) -> Response {
        self.pipeline.normalizer().normalize(ctx, err)
    }
}

/// Builder for [`App`].
pub struct AppBuilder {
    config: NatoursConfig,
    groups: Vec<(RouteGroup, Router, HandlerRegistry)>,
    rate_limit_store: Option<Arc<dyn RateLimitStore>>,
}

impl AppBuilder {
    /// Creates a builder with no route groups.
    #[must_use]
    pub fn new(config: NatoursConfig) -> Self {
        Self {
            config,
            groups: Vec::new(),
            rate_limit_store: None,
        }
    }

    /// Mounts a route group. Mounting a group twice keeps both; the first
    /// full match wins at dispatch.
    #[must_use]
    pub fn group(mut self, group: RouteGroup, router: Router, handlers: HandlerRegistry) -> Self {
        self.groups.push((group, router, handlers));
        self
    }

    /// Replaces the in-memory rate-limit store.
    #[must_use]
    pub fn rate_limit_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limit_store = Some(store);
        self
    }

    /// Builds the application.
    #[must_use]
    pub fn build(mut self) -> App {
        let config = self.config;

        // stable: same-group mounts keep their order
        self.groups
            .sort_by_key(|(group, _, _)| RouteGroup::all().iter().position(|g| g == group));
        let mut routes = RouteTable::new();
        for (group, router, handlers) in self.groups {
            routes.mount(group.prefix(), router, handlers);
        }

        let rate_limiter = config.rate_limit.enabled.then(|| {
            let mut builder = RateLimitBuilder::from_config(&config.rate_limit);
            if let Some(store) = self.rate_limit_store {
                builder = builder.store(store);
            }
            Arc::new(builder.build())
        });

        let mut dispatcher = RouterDispatcher::new(routes);
        if config.sanitize.enabled {
            dispatcher =
                dispatcher.sanitize_params(SanitizeMiddleware::from_config(&config.sanitize));
        }

        let mut pipeline = Pipeline::builder()
            .stage_if(config.static_files.enabled, || {
                StaticAssetsMiddleware::from_config(&config.static_files)
            })
            .stage_if(config.environment.is_development(), RequestLoggerMiddleware::new);
        if let Some(limiter) = &rate_limiter {
            pipeline = pipeline.shared_stage(Arc::clone(limiter) as BoxedMiddleware);
        }
        let pipeline = pipeline
            .stage(BodyDecoderMiddleware::from_config(&config.body))
            .stage(CookieParserMiddleware::new())
            .stage_if(config.sanitize.enabled, || {
                SanitizeMiddleware::from_config(&config.sanitize)
            })
            .stage_if(config.parameter_pollution.enabled, || {
                ParameterPollutionMiddleware::from_config(&config.parameter_pollution)
            })
            .stage_if(config.compression.enabled, || {
                CompressionMiddleware::from_config(&config.compression)
            })
            .stage(dispatcher)
            .error_normalizer(ErrorNormalizer::from_config(&config.errors))
            .build();

        tracing::debug!(stages = ?pipeline.stage_names(), "pipeline assembled");

        App {
            pipeline: Arc::new(pipeline),
            rate_limiter,
            config: Arc::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use natours_middleware::Stage;

    #[test]
    fn test_group_prefixes() {
        let prefixes: Vec<_> = RouteGroup::all().iter().map(|g| g.prefix()).collect();
        assert_eq!(
            prefixes,
            vec!["/", "/api/v1/tours", "/api/v1/users", "/api/v1/reviews", "/api/v1/booking"]
        );
    }

    #[test]
    fn test_development_stage_order() {
        let mut config = NatoursConfig::development();
        config.static_files.root = "/nonexistent".to_string();
        let app = App::builder(config).build();

        let expected: Vec<&str> = Stage::all()
            .into_iter()
            .filter(|s| s.is_middleware())
            .map(Stage::name)
            .collect();
        assert_eq!(app.pipeline().stage_names(), expected);
        assert!(app.rate_limiter().is_some());
    }

    #[test]
    fn test_production_drops_logger() {
        let app = App::builder(NatoursConfig::production()).build();
        let names = app.pipeline().stage_names();
        assert!(!names.contains(&"request_logger"));
        assert_eq!(names.first(), Some(&"static_assets"));
        assert_eq!(names.last(), Some(&"router_dispatch"));
    }

    #[test]
    fn test_disabled_stages_skipped() {
        let mut config = NatoursConfig::production();
        config.rate_limit.enabled = false;
        config.compression.enabled = false;
        config.static_files.enabled = false;
        let app = App::builder(config).build();

        assert!(app.rate_limiter().is_none());
        assert_eq!(
            app.pipeline().stage_names(),
            vec!["body_decoder", "cookie_parser", "sanitize", "parameter_pollution", "router_dispatch"]
        );
    }

    #[test]
    fn test_normalizer_follows_config() {
        let mut config = NatoursConfig::production();
        config.errors.expose_internal_errors = true;
        let app = App::builder(config).build();
        assert!(app.pipeline().normalizer().exposes_internal_errors());
        assert_eq!(app.config().environment.as_str(), "production");
    }
}
