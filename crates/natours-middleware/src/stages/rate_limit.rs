//! Rate limiting middleware.
//!
//! Caps the number of requests a client may make under a path prefix
//! (`/api` by default) within a fixed time window. Every scoped request
//! counts, including the rejected ones; once the count for the current
//! window exceeds the limit the request fails with `429 Too Many Requests`
//! and a `Retry-After` header. A new window starts from zero.
//!
//! ## Client Identity
//!
//! - **RemoteAddr** (default): the connection's IP address
//! - **ForwardedFor**: first `X-Forwarded-For` entry, for deployments
//!   behind a proxy
//! - **Header**: the value of a named header
//! - **Global**: one shared counter for every client
//!
//! ## Storage
//!
//! Counters live in a [`RateLimitStore`]. [`InMemoryStore`] keeps them in
//! a `DashMap`, so increments for one client never lock another.
//!
//! ## Example
//!
//! ```
//! use natours_middleware::stages::RateLimitMiddleware;
//! use std::time::Duration;
//!
//! let rate_limit = RateLimitMiddleware::builder()
//!     .limit(100)
//!     .window(Duration::from_secs(3600))
//!     .path_prefix("/api")
//!     .per_ip()
//!     .build();
//! assert_eq!(rate_limit.limit(), 100);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use http::{HeaderName, HeaderValue};
use natours_config::{RateLimitConfig, RateLimitKeyMode};
use natours_core::{AppError, AppResult, BoxFuture, RequestContext, Response};
use natours_router::prefix_matches;

use crate::middleware::{Middleware, Next};
use crate::pipeline::Stage;

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Remaining requests in the current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Unix timestamp (seconds) when the window resets.
    pub const RESET: &str = "x-ratelimit-reset";
}

/// Default rejection message.
pub const DEFAULT_MESSAGE: &str = "Too many requests from this IP, please try again in an hour";

/// Counter state of one client after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Requests counted in the current window, this one included.
    pub count: u64,
    /// When the current window started.
    pub window_start: Instant,
}

/// Storage for per-client window counters.
///
/// Implementations must make [`increment`](RateLimitStore::increment)
/// atomic per key.
pub trait RateLimitStore: Send + Sync + 'static {
    /// Counts one request for `key` and returns the updated window.
    ///
    /// A window older than `window` is discarded first.
    fn increment(&self, key: &str, window: Duration, now: Instant) -> WindowState;

    /// Forgets the counter for `key`.
    fn reset(&self, key: &str);

    /// Drops every window that has expired by `now`, returning how many.
    fn prune(&self, window: Duration, now: Instant) -> usize;

    /// Number of tracked clients.
    fn len(&self) -> usize;

    /// Returns true if no client is tracked.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process counter store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    windows: DashMap<String, WindowState>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for InMemoryStore {
    fn increment(&self, key: &str, window: Duration, now: Instant) -> WindowState {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(WindowState {
                count: 0,
                window_start: now,
            });
        if now.saturating_duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.count = entry.count.saturating_add(1);
        *entry
    }

    fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    fn prune(&self, window: Duration, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, state| now.saturating_duration_since(state.window_start) < window);
        before.saturating_sub(self.windows.len())
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}

/// How to derive the client key from a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyExtractor {
    /// Connection IP address.
    #[default]
    RemoteAddr,
    /// First `X-Forwarded-For` entry, falling back to the connection IP.
    ForwardedFor,
    /// Value of the named header; requests without it are not limited.
    Header(String),
    /// One counter for all requests.
    Global,
}

/// Key used when the connection address is unknown.
const UNKNOWN_CLIENT: &str = "unknown";

impl KeyExtractor {
    /// Extracts the key, or `None` when the request is not limited.
    pub fn extract(&self, ctx: &RequestContext) -> Option<String> {
        match self {
            Self::RemoteAddr => Some(Self::remote_ip(ctx)),
            Self::ForwardedFor => ctx
                .header("x-forwarded-for")
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(String::from)
                .or_else(|| Some(Self::remote_ip(ctx))),
            Self::Header(name) => ctx.header(name).map(String::from),
            Self::Global => Some("global".to_string()),
        }
    }

    fn remote_ip(ctx: &RequestContext) -> String {
        ctx.remote_addr()
            .map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.ip().to_string())
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Configured maximum per window.
    pub limit: u64,
    /// Requests counted in the window, this one included.
    pub count: u64,
    /// Time until the window resets.
    pub reset_in: Duration,
}

impl RateLimitDecision {
    /// Returns true if the request may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        self.count <= self.limit
    }

    /// Requests left in the window.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }

    /// Whole seconds until the window resets, at least one.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.reset_in.as_secs();
        let rounded = if self.reset_in.subsec_nanos() > 0 { secs + 1 } else { secs };
        rounded.max(1)
    }
}

/// Rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    limit: u64,
    window: Duration,
    path_prefix: String,
    key_extractor: KeyExtractor,
    message: String,
    send_headers: bool,
    store: Arc<dyn RateLimitStore>,
}

impl std::fmt::Debug for RateLimitMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitMiddleware")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("path_prefix", &self.path_prefix)
            .field("key_extractor", &self.key_extractor)
            .field("message", &self.message)
            .field("send_headers", &self.send_headers)
            .field("tracked_clients", &self.store.len())
            .finish()
    }
}

impl RateLimitMiddleware {
    /// Creates a new rate limit builder.
    #[must_use]
    pub fn builder() -> RateLimitBuilder {
        RateLimitBuilder::new()
    }

    /// Creates the middleware from the `rate_limit` configuration section.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        RateLimitBuilder::from_config(config).build()
    }

    /// Maximum requests per window.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Path prefix the limit applies to.
    #[must_use]
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// The counter store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RateLimitStore> {
        &self.store
    }

    /// Drops expired windows from the store.
    pub fn prune(&self) -> usize {
        self.store.prune(self.window, Instant::now())
    }

    /// Returns true if requests to `path` are counted.
    #[must_use]
    pub fn applies_to(&self, path: &str) -> bool {
        prefix_matches(&self.path_prefix, path).is_some()
    }

    /// Counts one request for `key` at `now`.
    pub fn check(&self, key: &str, now: Instant) -> RateLimitDecision {
        let state = self.store.increment(key, self.window, now);
        let elapsed = now.saturating_duration_since(state.window_start);
        RateLimitDecision {
            limit: self.limit,
            count: state.count,
            reset_in: self.window.saturating_sub(elapsed),
        }
    }

    fn header_values(&self, decision: &RateLimitDecision) -> [(HeaderName, HeaderValue); 3] {
        let reset_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            + decision.retry_after_secs();
        [
            (HeaderName::from_static(headers::LIMIT), HeaderValue::from(decision.limit)),
            (
                HeaderName::from_static(headers::REMAINING),
                HeaderValue::from(decision.remaining()),
            ),
            (HeaderName::from_static(headers::RESET), HeaderValue::from(reset_at)),
        ]
    }

    fn rejection(&self, decision: &RateLimitDecision) -> AppError {
        let mut err = AppError::too_many_requests(self.message.clone(), decision.retry_after_secs());
        if self.send_headers {
            for (name, value) in self.header_values(decision) {
                err = err.with_header(name, value);
            }
        }
        err
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        Stage::RateLimit.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, AppResult<Response>> {
        Box::pin(async move {
            if !self.applies_to(ctx.path()) {
                return next.run(ctx).await;
            }
            let Some(key) = self.key_extractor.extract(ctx) else {
                return next.run(ctx).await;
            };

            let decision = self.check(&key, Instant::now());
            if !decision.is_allowed() {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    client = %key,
                    count = decision.count,
                    limit = decision.limit,
                    "rate limit exceeded"
                );
                return Err(self.rejection(&decision));
            }

            let result = next.run(ctx).await;
            if !self.send_headers {
                return result;
            }
            let values = self.header_values(&decision);
            match result {
                Ok(mut response) => {
                    for (name, value) in values {
                        response.headers_mut().insert(name, value);
                    }
                    Ok(response)
                }
                Err(mut err) => {
                    for (name, value) in values {
                        err = err.with_header(name, value);
                    }
                    Err(err)
                }
            }
        })
    }
}

/// Builder for [`RateLimitMiddleware`].
#[derive(Clone)]
pub struct RateLimitBuilder {
    limit: u64,
    window: Duration,
    path_prefix: String,
    key_extractor: KeyExtractor,
    message: String,
    send_headers: bool,
    store: Option<Arc<dyn RateLimitStore>>,
}

impl Default for RateLimitBuilder {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60 * 60),
            path_prefix: "/api".to_string(),
            key_extractor: KeyExtractor::default(),
            message: DEFAULT_MESSAGE.to_string(),
            send_headers: true,
            store: None,
        }
    }
}

impl RateLimitBuilder {
    /// Creates a builder with the default policy: 100 requests per hour
    /// per IP under `/api`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder preset from the `rate_limit` configuration section.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let builder = Self::new()
            .limit(config.max_requests)
            .window(Duration::from_millis(config.window_ms))
            .path_prefix(config.path_prefix.clone())
            .message(config.message.clone())
            .headers(config.headers);
        match config.key {
            RateLimitKeyMode::RemoteAddr => builder.per_ip(),
            RateLimitKeyMode::ForwardedFor => builder.per_forwarded_for(),
            RateLimitKeyMode::Header => match &config.key_header {
                Some(name) => builder.per_header(name.clone()),
                None => builder.per_ip(),
            },
            RateLimitKeyMode::Global => builder.global(),
        }
    }

    /// Sets the maximum number of requests allowed per window.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the window length.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Limits only requests under `prefix`.
    #[must_use]
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    /// Uses the connection IP as the key.
    #[must_use]
    pub fn per_ip(mut self) -> Self {
        self.key_extractor = KeyExtractor::RemoteAddr;
        self
    }

    /// Uses the first `X-Forwarded-For` entry as the key.
    #[must_use]
    pub fn per_forwarded_for(mut self) -> Self {
        self.key_extractor = KeyExtractor::ForwardedFor;
        self
    }

    /// Uses a header value as the key.
    #[must_use]
    pub fn per_header(mut self, header_name: impl Into<String>) -> Self {
        self.key_extractor = KeyExtractor::Header(header_name.into());
        self
    }

    /// Uses one counter for all clients.
    #[must_use]
    pub fn global(mut self) -> Self {
        self.key_extractor = KeyExtractor::Global;
        self
    }

    /// Sets the rejection message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets whether `X-RateLimit-*` headers are sent.
    #[must_use]
    pub fn headers(mut self, enabled: bool) -> Self {
        self.send_headers = enabled;
        self
    }

    /// Uses an existing counter store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the middleware, creating an [`InMemoryStore`] if none was set.
    #[must_use]
    pub fn build(self) -> RateLimitMiddleware {
        RateLimitMiddleware {
            limit: self.limit,
            window: self.window,
            path_prefix: self.path_prefix,
            key_extractor: self.key_extractor,
            message: self.message,
            send_headers: self.send_headers,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryStore::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use http::{header, Method, StatusCode};
    use natours_core::ResponseExt;
    use std::net::SocketAddr;

    struct Ok200;

    impl Middleware for Ok200 {
        fn name(&self) -> &'static str {
            "ok"
        }

        fn process<'a>(
            &'a self,
            _ctx: &'a mut RequestContext,
            _next: Next<'a>,
        ) -> BoxFuture<'a, AppResult<Response>> {
            Box::pin(async { Ok(Response::text(StatusCode::OK, "ok")) })
        }
    }

    fn request(path: &str, ip: &str) -> RequestContext {
        let addr: SocketAddr = format!("{ip}:40000").parse().unwrap();
        RequestContext::new(Method::GET, path.parse().unwrap()).with_remote_addr(addr)
    }

    #[test]
    fn test_builder_defaults() {
        let mw = RateLimitMiddleware::builder().build();
        assert_eq!(mw.limit(), 100);
        assert_eq!(mw.window(), Duration::from_millis(3_600_000));
        assert_eq!(mw.path_prefix(), "/api");
        assert_eq!(mw.key_extractor, KeyExtractor::RemoteAddr);
        assert_eq!(mw.message, DEFAULT_MESSAGE);
    }

    #[test]
    fn test_from_config() {
        let config = RateLimitConfig {
            max_requests: 5,
            window_ms: 1000,
            key: RateLimitKeyMode::Header,
            key_header: Some("x-api-key".to_string()),
            ..RateLimitConfig::default()
        };
        let mw = RateLimitMiddleware::from_config(&config);
        assert_eq!(mw.limit(), 5);
        assert_eq!(mw.window(), Duration::from_secs(1));
        assert_eq!(mw.key_extractor, KeyExtractor::Header("x-api-key".to_string()));
    }

    #[test]
    fn test_scope_is_segment_prefix() {
        let mw = RateLimitMiddleware::builder().build();
        assert!(mw.applies_to("/api"));
        assert!(mw.applies_to("/api/v1/tours"));
        assert!(!mw.applies_to("/apis"));
        assert!(!mw.applies_to("/overview"));
        assert!(mw.applies_to("/API/v1/tours"));
    }

    #[test]
    fn test_hundred_allowed_then_rejected() {
        let mw = RateLimitMiddleware::builder().build();
        let now = Instant::now();

        for i in 1..=100 {
            let decision = mw.check("10.0.0.1", now);
            assert!(decision.is_allowed(), "request {i} should pass");
            assert_eq!(decision.remaining(), 100 - i);
        }
        let decision = mw.check("10.0.0.1", now);
        assert!(!decision.is_allowed());
        assert_eq!(decision.count, 101);
        assert_eq!(decision.remaining(), 0);
    }

    #[test]
    fn test_rejected_requests_still_count() {
        let mw = RateLimitMiddleware::builder().limit(1).build();
        let now = Instant::now();
        mw.check("k", now);
        assert_eq!(mw.check("k", now).count, 2);
        assert_eq!(mw.check("k", now).count, 3);
    }

    #[test]
    fn test_new_window_resets_count() {
        let mw = RateLimitMiddleware::builder()
            .limit(2)
            .window(Duration::from_secs(10))
            .build();
        let start = Instant::now();
        mw.check("k", start);
        mw.check("k", start);
        assert!(!mw.check("k", start + Duration::from_secs(9)).is_allowed());

        let decision = mw.check("k", start + Duration::from_secs(10));
        assert!(decision.is_allowed());
        assert_eq!(decision.count, 1);
        assert_eq!(decision.reset_in, Duration::from_secs(10));
    }

    #[test]
    fn test_clients_are_independent() {
        let mw = RateLimitMiddleware::builder().limit(1).build();
        let now = Instant::now();
        assert!(mw.check("a", now).is_allowed());
        assert!(mw.check("b", now).is_allowed());
        assert!(!mw.check("a", now).is_allowed());
    }

    #[test]
    fn test_concurrent_burst_is_counted_exactly() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mw = RateLimitMiddleware::builder().build();
        let now = Instant::now();
        let allowed = AtomicUsize::new(0);
        let rejected = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..10 {
                scope.spawn(|| {
                    for _ in 0..15 {
                        if mw.check("10.0.0.1", now).is_allowed() {
                            allowed.fetch_add(1, Ordering::Relaxed);
                        } else {
                            rejected.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(allowed.into_inner(), 100);
        assert_eq!(rejected.into_inner(), 50);
        assert_eq!(mw.check("10.0.0.1", now).count, 151);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = RateLimitDecision {
            limit: 1,
            count: 2,
            reset_in: Duration::from_millis(1500),
        };
        assert_eq!(decision.retry_after_secs(), 2);

        let decision = RateLimitDecision {
            reset_in: Duration::ZERO,
            ..decision
        };
        assert_eq!(decision.retry_after_secs(), 1);
    }

    #[test]
    fn test_store_prune() {
        let store = InMemoryStore::new();
        let start = Instant::now();
        store.increment("old", Duration::from_secs(5), start);
        store.increment("new", Duration::from_secs(5), start + Duration::from_secs(4));
        assert_eq!(store.len(), 2);

        let removed = store.prune(Duration::from_secs(5), start + Duration::from_secs(6));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);

        store.reset("new");
        assert!(store.is_empty());
    }

    #[test]
    fn test_key_extractors() {
        let ctx = request("/api/v1/tours", "192.168.1.7")
            .with_header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .with_header("x-api-key", "secret");

        assert_eq!(KeyExtractor::RemoteAddr.extract(&ctx).as_deref(), Some("192.168.1.7"));
        assert_eq!(KeyExtractor::ForwardedFor.extract(&ctx).as_deref(), Some("203.0.113.9"));
        assert_eq!(
            KeyExtractor::Header("x-api-key".into()).extract(&ctx).as_deref(),
            Some("secret")
        );
        assert_eq!(KeyExtractor::Global.extract(&ctx).as_deref(), Some("global"));

        let bare = RequestContext::mock();
        assert_eq!(KeyExtractor::RemoteAddr.extract(&bare).as_deref(), Some(UNKNOWN_CLIENT));
        assert_eq!(KeyExtractor::ForwardedFor.extract(&bare).as_deref(), Some(UNKNOWN_CLIENT));
        assert_eq!(KeyExtractor::Header("x-api-key".into()).extract(&bare), None);
    }

    #[tokio::test]
    async fn test_middleware_rejects_after_limit() {
        let pipeline = Pipeline::builder()
            .stage(RateLimitMiddleware::builder().limit(2).build())
            .stage(Ok200)
            .build();

        for _ in 0..2 {
            let mut ctx = request("/api/v1/tours", "10.1.1.1");
            let response = pipeline.process(&mut ctx).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers().get(headers::LIMIT).unwrap(), "2");
        }

        let mut ctx = request("/api/v1/tours", "10.1.1.1");
        let err = pipeline.process(&mut ctx).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.message(), DEFAULT_MESSAGE);
        assert!(err.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(err.headers().get(headers::REMAINING).unwrap(), "0");
    }

    #[tokio::test]
    async fn test_unscoped_paths_not_counted() {
        let mw = RateLimitMiddleware::builder().limit(1).build();
        let store = Arc::clone(mw.store());
        let pipeline = Pipeline::builder().stage(mw).stage(Ok200).build();

        for _ in 0..3 {
            let mut ctx = request("/tour/the-forest-hiker", "10.1.1.2");
            let response = pipeline.process(&mut ctx).await.unwrap();
            assert!(response.headers().get(headers::LIMIT).is_none());
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_headers_disabled() {
        let pipeline = Pipeline::builder()
            .stage(RateLimitMiddleware::builder().headers(false).build())
            .stage(Ok200)
            .build();
        let mut ctx = request("/api", "10.1.1.3");
        let response = pipeline.process(&mut ctx).await.unwrap();
        assert!(response.headers().get(headers::LIMIT).is_none());
    }

    #[tokio::test]
    async fn test_downstream_failure_keeps_headers() {
        let pipeline = Pipeline::builder()
            .stage(RateLimitMiddleware::builder().build())
            .build();
        let mut ctx = request("/api/v1/nothing", "10.1.1.4");
        let err = pipeline.process(&mut ctx).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.headers().get(headers::REMAINING).unwrap(), "99");
    }
}
