//! Request context types.
//!
//! The [`RequestContext`] carries all per-request state through the middleware
//! pipeline and into route handlers. Stages fill it in as the request moves
//! along: the cookie parser sets [`RequestContext::cookies`], the body
//! decoder replaces the raw [`Payload`], the dispatcher records route
//! parameters, and so on.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};
use natours_router::Params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cookies::Cookies;
use crate::query::{parse_query, QueryMap};

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
///
/// # Example
///
/// ```
/// use natours_core::RequestId;
///
/// let id = RequestId::new();
/// assert_eq!(id.to_string().len(), 36);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The request body at its current stage of decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Bytes as received; no decoder matched (yet).
    Raw(Bytes),
    /// A decoded JSON object or array.
    Json(serde_json::Value),
    /// A decoded URL-encoded form.
    Form(QueryMap),
    /// A decoded `text/plain` body.
    Text(String),
}

impl Payload {
    /// Returns true for an undecoded body.
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    /// Renders the payload as JSON. Undecoded bodies render as `{}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Raw(_) => serde_json::Value::Object(serde_json::Map::new()),
            Self::Json(value) => value.clone(),
            Self::Form(form) => serde_json::to_value(form)
                .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new())),
            Self::Text(text) => serde_json::Value::String(text.clone()),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::Raw(Bytes::new())
    }
}

/// Per-request state that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use natours_core::RequestContext;
/// use http::Method;
///
/// let ctx = RequestContext::new(Method::GET, "/api/v1/tours?sort=price".parse().unwrap());
/// assert_eq!(ctx.path(), "/api/v1/tours");
/// assert_eq!(ctx.original_url(), "/api/v1/tours?sort=price");
/// assert!(ctx.query().contains_key("sort"));
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    started_at: Instant,

    cookies: Cookies,
    query: QueryMap,
    /// Values dropped from `query` by parameter de-duplication.
    query_polluted: QueryMap,
    body: Payload,
    /// Values dropped from a form body by parameter de-duplication.
    body_polluted: QueryMap,
    params: Params,

    /// Operation id of the matched route, once dispatched.
    operation_id: Option<String>,
}

impl RequestContext {
    /// Creates a context for `method` and `uri` with an empty body.
    ///
    /// The query string is parsed immediately.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        let query = uri.query().map(parse_query).unwrap_or_default();
        Self {
            request_id: RequestId::new(),
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            remote_addr: None,
            started_at: Instant::now(),
            cookies: Cookies::new(),
            query,
            query_polluted: QueryMap::new(),
            body: Payload::default(),
            body_polluted: QueryMap::new(),
            params: Params::new(),
            operation_id: None,
        }
    }

    /// Creates a context from request parts and a collected body.
    #[must_use]
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let mut ctx = Self::new(parts.method, parts.uri);
        ctx.version = parts.version;
        ctx.headers = parts.headers;
        ctx.body = Payload::Raw(body);
        ctx
    }

    /// Creates a `GET /` context for tests.
    #[must_use]
    pub fn mock() -> Self {
        Self::new(Method::GET, Uri::from_static("/"))
    }

    /// Returns a context with an added request header.
    ///
    /// Invalid header names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::header::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Returns a context with a raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Payload::Raw(body.into());
        self
    }

    /// Returns a context with the peer address set.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the path component of the URI.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the path plus query string as received.
    #[must_use]
    pub fn original_url(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path(), |pq| pq.as_str())
    }

    /// Returns the HTTP version.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string, if present and visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the peer address, if known.
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Sets the peer address.
    pub fn set_remote_addr(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the parsed cookies.
    #[must_use]
    pub const fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    /// Replaces the parsed cookies.
    pub fn set_cookies(&mut self, cookies: Cookies) {
        self.cookies = cookies;
    }

    /// Returns the parsed query string.
    #[must_use]
    pub const fn query(&self) -> &QueryMap {
        &self.query
    }

    /// Returns the parsed query string for modification.
    pub fn query_mut(&mut self) -> &mut QueryMap {
        &mut self.query
    }

    /// Returns query values dropped by de-duplication.
    #[must_use]
    pub const fn query_polluted(&self) -> &QueryMap {
        &self.query_polluted
    }

    /// Returns the dropped query values for modification.
    pub fn query_polluted_mut(&mut self) -> &mut QueryMap {
        &mut self.query_polluted
    }

    /// Returns the body payload.
    #[must_use]
    pub const fn body(&self) -> &Payload {
        &self.body
    }

    /// Returns the body payload for modification.
    pub fn body_mut(&mut self) -> &mut Payload {
        &mut self.body
    }

    /// Replaces the body payload.
    pub fn set_body(&mut self, body: Payload) {
        self.body = body;
    }

    /// Returns form values dropped by de-duplication.
    #[must_use]
    pub const fn body_polluted(&self) -> &QueryMap {
        &self.body_polluted
    }

    /// Returns the dropped form values for modification.
    pub fn body_polluted_mut(&mut self) -> &mut QueryMap {
        &mut self.body_polluted
    }

    /// Returns the matched route parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Returns the route parameters for modification.
    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// Sets the route parameters.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Returns the operation ID if set.
    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }

    /// Sets the operation ID of the matched route.
    pub fn set_operation_id(&mut self, operation_id: impl Into<String>) {
        self.operation_id = Some(operation_id.into());
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::mock()
    }
}
