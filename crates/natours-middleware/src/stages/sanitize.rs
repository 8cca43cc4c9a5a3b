//! Input sanitization middleware.
//!
//! Repairs user input in place instead of rejecting it:
//!
//! - **Operator injection**: map keys starting with `$` (and, unless
//!   `allow_dots` is set, keys containing `.`) are removed from the query,
//!   the body and the route parameters, so `{"email": {"$gt": ""}}` cannot
//!   reach a document store as a query operator.
//! - **Script injection**: `<` and `>` in string values are escaped as
//!   `&lt;` and `&gt;`.
//!
//! Sanitizing is idempotent: running it twice changes nothing the first
//! run did not.

use std::borrow::Cow;

use natours_config::SanitizeConfig;
use natours_core::{AppResult, BoxFuture, Payload, QueryMap, QueryValue, RequestContext, Response};
use natours_router::Params;
use serde_json::Value;

use crate::middleware::{Middleware, Next};
use crate::pipeline::Stage;

/// Escapes `<` and `>` for HTML contexts.
#[must_use]
pub fn escape_html(input: &str) -> Cow<'_, str> {
    if !input.contains(['<', '>']) {
        return Cow::Borrowed(input);
    }
    let mut escaped = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Input sanitization middleware.
#[derive(Debug, Clone)]
pub struct SanitizeMiddleware {
    allow_dots: bool,
    escape_html: bool,
}

impl Default for SanitizeMiddleware {
    fn default() -> Self {
        Self {
            allow_dots: false,
            escape_html: true,
        }
    }
}

impl SanitizeMiddleware {
    /// Creates the middleware with both protections on.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the middleware from the `sanitize` configuration section.
    #[must_use]
    pub fn from_config(config: &SanitizeConfig) -> Self {
        Self {
            allow_dots: config.allow_dots,
            escape_html: config.escape_html,
        }
    }

    /// Keeps keys that contain `.`.
    #[must_use]
    pub fn allow_dots(mut self, allow: bool) -> Self {
        self.allow_dots = allow;
        self
    }

    /// Enables or disables markup escaping.
    #[must_use]
    pub fn escape_html(mut self, enabled: bool) -> Self {
        self.escape_html = enabled;
        self
    }

    /// Returns true if `key` must be removed.
    #[must_use]
    pub fn is_prohibited_key(&self, key: &str) -> bool {
        key.starts_with('$') || (!self.allow_dots && key.contains('.'))
    }

    /// Sanitizes every input location of the request, returning the number
    /// of keys removed.
    pub fn sanitize(&self, ctx: &mut RequestContext) -> usize {
        let mut removed = self.sanitize_query(ctx.query_mut());
        removed += match ctx.body_mut() {
            Payload::Json(value) => self.sanitize_json(value),
            Payload::Form(form) => self.sanitize_query(form),
            Payload::Text(text) => {
                self.escape_in_place(text);
                0
            }
            Payload::Raw(_) => 0,
        };
        removed += self.sanitize_params(ctx.params_mut());
        removed
    }

    /// Sanitizes a parsed query string or form.
    pub fn sanitize_query(&self, map: &mut QueryMap) -> usize {
        let before = map.len();
        map.retain(|key, _| !self.is_prohibited_key(key));
        let mut removed = before - map.len();
        for value in map.values_mut() {
            removed += self.sanitize_query_value(value);
        }
        removed
    }

    fn sanitize_query_value(&self, value: &mut QueryValue) -> usize {
        match value {
            QueryValue::Str(text) => {
                self.escape_in_place(text);
                0
            }
            QueryValue::List(items) => items
                .iter_mut()
                .map(|item| self.sanitize_query_value(item))
                .sum(),
            QueryValue::Map(map) => self.sanitize_query(map),
        }
    }

    /// Sanitizes a JSON document.
    pub fn sanitize_json(&self, value: &mut Value) -> usize {
        match value {
            Value::String(text) => {
                self.escape_in_place(text);
                0
            }
            Value::Array(items) => items.iter_mut().map(|item| self.sanitize_json(item)).sum(),
            Value::Object(object) => {
                let before = object.len();
                object.retain(|key, _| !self.is_prohibited_key(key));
                let mut removed = before - object.len();
                for nested in object.values_mut() {
                    removed += self.sanitize_json(nested);
                }
                removed
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => 0,
        }
    }

    /// Sanitizes route parameters.
    pub fn sanitize_params(&self, params: &mut Params) -> usize {
        if params.is_empty() {
            return 0;
        }
        let before = params.len();
        let cleaned: Params = std::mem::take(params)
            .into_iter()
            .filter(|(name, _)| !self.is_prohibited_key(name))
            .map(|(name, mut value)| {
                self.escape_in_place(&mut value);
                (name, value)
            })
            .collect();
        *params = cleaned;
        before - params.len()
    }

    fn escape_in_place(&self, text: &mut String) {
        if !self.escape_html {
            return;
        }
        if let Cow::Owned(escaped) = escape_html(text) {
            *text = escaped;
        }
    }
}

impl Middleware for SanitizeMiddleware {
    fn name(&self) -> &'static str {
        Stage::Sanitize.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, AppResult<Response>> {
        Box::pin(async move {
            let removed = self.sanitize(ctx);
            if removed > 0 {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    removed,
                    "removed prohibited keys from request input"
                );
            }
            next.run(ctx).await
        })
    }
}
