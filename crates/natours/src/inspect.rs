//! Inspector handlers.
//!
//! The route groups' real handlers live outside this workspace. The
//! binary mounts an inspector on every group instead: it answers any
//! method with the request state as the pipeline left it.

use http::StatusCode;
use natours_core::{handler_fn, Handler, HandlerRegistry, RequestContext, Response, ResponseExt};
use natours_router::{MethodRouter, Router};
use natours_server::{AppBuilder, RouteGroup};
use serde_json::{json, Map, Value};

/// Operation id every inspector route maps to.
pub const INSPECT_OPERATION: &str = "inspect";

/// Renders the decoded request state.
pub fn snapshot(ctx: &RequestContext) -> Value {
    let params: Map<String, Value> = ctx
        .params()
        .iter()
        .map(|(name, value)| (name.to_string(), Value::from(value)))
        .collect();

    json!({
        "status": "success",
        "data": {
            "requestId": ctx.request_id().to_string(),
            "method": ctx.method().as_str(),
            "url": ctx.original_url(),
            "operation": ctx.operation_id(),
            "params": params,
            "query": serde_json::to_value(ctx.query()).unwrap_or_default(),
            "queryPolluted": serde_json::to_value(ctx.query_polluted()).unwrap_or_default(),
            "body": ctx.body().to_json(),
            "bodyPolluted": serde_json::to_value(ctx.body_polluted()).unwrap_or_default(),
            "cookies": serde_json::to_value(ctx.cookies()).unwrap_or_default(),
        }
    })
}

/// A handler answering 200 with [`snapshot`].
pub fn inspector() -> impl Handler {
    handler_fn(|ctx: RequestContext| async move {
        Ok(Response::json(StatusCode::OK, &snapshot(&ctx)))
    })
}

/// Routes for `group`: the rendered pages for views, every path for the
/// API groups.
pub fn router(group: RouteGroup) -> Router {
    let any = || MethodRouter::new().all(INSPECT_OPERATION);
    let patterns: &[&str] = match group {
        RouteGroup::Views => &["/", "/tour/:slug", "/login", "/signup", "/me", "/my-tours"],
        _ => &["/", "/:id", "/:id/*rest"],
    };

    let mut router = Router::new();
    for &pattern in patterns {
        if let Err(e) = router.insert(pattern, any()) {
            tracing::warn!(pattern, error = %e, "skipping inspector route");
        }
    }
    router
}

/// Mounts an inspector on every route group.
pub fn mount_all(mut builder: AppBuilder) -> AppBuilder {
    for group in RouteGroup::all() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(INSPECT_OPERATION, inspector());
        builder = builder.group(group, router(group), handlers);
    }
    builder
}
