//! HTTP parameter pollution protection.
//!
//! `?sort=price&sort=duration` parses into a list, which downstream code
//! expecting a single value may mishandle. This stage keeps the last value
//! of every repeated top-level key and moves the full list to
//! [`RequestContext::query_polluted`]. Whitelisted keys keep their lists.
//! URL-encoded bodies get the same treatment, recorded in
//! [`RequestContext::body_polluted`].

use std::collections::HashSet;

use natours_config::ParameterPollutionConfig;
use natours_core::{AppResult, BoxFuture, Payload, QueryMap, QueryValue, RequestContext, Response};

use crate::middleware::{Middleware, Next};
use crate::pipeline::Stage;

/// Parameter pollution middleware.
#[derive(Debug, Clone, Default)]
pub struct ParameterPollutionMiddleware {
    whitelist: HashSet<String>,
    check_body: bool,
}

impl ParameterPollutionMiddleware {
    /// Creates the middleware with an empty whitelist, checking bodies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            whitelist: HashSet::new(),
            check_body: true,
        }
    }

    /// Creates the middleware from the `parameter_pollution` section.
    #[must_use]
    pub fn from_config(config: &ParameterPollutionConfig) -> Self {
        Self {
            whitelist: config.whitelist.iter().cloned().collect(),
            check_body: config.check_body,
        }
    }

    /// Adds keys whose lists are kept intact.
    #[must_use]
    pub fn whitelist<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Enables or disables de-duplication of URL-encoded bodies.
    #[must_use]
    pub fn check_body(mut self, enabled: bool) -> Self {
        self.check_body = enabled;
        self
    }

    /// Returns true if `key` keeps every value.
    #[must_use]
    pub fn is_whitelisted(&self, key: &str) -> bool {
        self.whitelist.contains(key)
    }

    /// Collapses repeated keys of `map` to their last value, recording the
    /// removed lists in `polluted`.
    pub fn collapse(&self, map: &mut QueryMap, polluted: &mut QueryMap) {
        for (key, value) in map.iter_mut() {
            if self.is_whitelisted(key) {
                continue;
            }
            let QueryValue::List(items) = value else {
                continue;
            };
            let Some(last) = items.last().cloned() else {
                continue;
            };
            let original = std::mem::replace(value, last);
            polluted.insert(key.clone(), original);
        }
    }

    /// Applies the policy to the query and, when enabled, a form body.
    pub fn apply(&self, ctx: &mut RequestContext) {
        let mut query = std::mem::take(ctx.query_mut());
        let mut polluted = std::mem::take(ctx.query_polluted_mut());
        self.collapse(&mut query, &mut polluted);
        *ctx.query_mut() = query;
        *ctx.query_polluted_mut() = polluted;

        if !self.check_body {
            return;
        }
        let mut body_polluted = std::mem::take(ctx.body_polluted_mut());
        if let Payload::Form(form) = ctx.body_mut() {
            self.collapse(form, &mut body_polluted);
        }
        *ctx.body_polluted_mut() = body_polluted;
    }
}

impl Middleware for ParameterPollutionMiddleware {
    fn name(&self) -> &'static str {
        Stage::ParameterPollution.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, AppResult<Response>> {
        Box::pin(async move {
            self.apply(ctx);
            if !ctx.query_polluted().is_empty() || !ctx.body_polluted().is_empty() {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    query_keys = ctx.query_polluted().len(),
                    body_keys = ctx.body_polluted().len(),
                    "collapsed repeated parameters"
                );
            }
            next.run(ctx).await
        })
    }
}
