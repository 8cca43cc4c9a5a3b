//! End-to-end tests of the assembled application.
//!
//! Most tests drive [`App`] directly with a [`RequestContext`]; the last one
//! goes through a real socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use natours_config::NatoursConfig;
use natours_core::{
    handler_fn, AppError, Handler, HandlerRegistry, RequestContext, Response, ResponseExt,
};
use natours_router::{MethodRouter, Router};
use natours_server::{App, RouteGroup, Server, ShutdownSignal};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const CLIENT: &str = "203.0.113.7:51000";

/// Echoes what the pipeline made of the request.
fn inspector() -> impl Handler {
    handler_fn(|ctx: RequestContext| async move {
        let params: serde_json::Map<String, Value> = ctx
            .params()
            .iter()
            .map(|(name, value)| (name.to_string(), Value::from(value)))
            .collect();
        let body = json!({
            "method": ctx.method().as_str(),
            "path": ctx.path(),
            "query": serde_json::to_value(ctx.query()).unwrap_or_default(),
            "queryPolluted": serde_json::to_value(ctx.query_polluted()).unwrap_or_default(),
            "body": ctx.body().to_json(),
            "params": params,
            "operation": ctx.operation_id(),
        });
        Ok(Response::json(StatusCode::OK, &body))
    })
}

fn group_router() -> Router {
    let mut router = Router::new();
    router
        .insert("/", MethodRouter::new().all("inspect"))
        .unwrap();
    router
        .insert("/:id", MethodRouter::new().all("inspect"))
        .unwrap();
    router
}

fn inspector_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register("inspect", inspector());
    registry
}

fn test_config() -> NatoursConfig {
    let mut config = NatoursConfig::production();
    config.static_files.enabled = false;
    config
}

fn build_app(config: NatoursConfig) -> App {
    App::builder(config)
        .group(RouteGroup::Tours, group_router(), inspector_registry())
        .group(RouteGroup::Booking, group_router(), inspector_registry())
        .build()
}

fn request(method: Method, uri: &str, headers: &[(&str, &str)], body: impl Into<Bytes>) -> RequestContext {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let (parts, ()) = builder.body(()).unwrap().into_parts();
    RequestContext::from_parts(parts, body.into()).with_remote_addr(CLIENT.parse().unwrap())
}

fn get(uri: &str) -> RequestContext {
    request(Method::GET, uri, &[], Bytes::new())
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_booking_keeps_whitelisted_duplicates() {
    let app = build_app(test_config());
    let ctx = request(
        Method::POST,
        "/api/v1/booking?difficulty=easy&difficulty=hard&price=10&price=20&sort=a&sort=b",
        &[],
        Bytes::new(),
    );

    let response = app.handle(ctx).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["query"]["difficulty"], json!(["easy", "hard"]));
    assert_eq!(body["query"]["price"], json!(["10", "20"]));
    assert_eq!(body["query"]["sort"], "b");
    assert_eq!(body["queryPolluted"]["sort"], json!(["a", "b"]));
}

#[tokio::test]
async fn test_route_params_reach_handler() {
    let app = build_app(test_config());
    let body = body_json(app.handle(get("/api/v1/tours/5c88fa8cf4afda39709c2955")).await).await;

    assert_eq!(body["params"]["id"], "5c88fa8cf4afda39709c2955");
    assert_eq!(body["operation"], "inspect");
    assert_eq!(body["method"], "GET");
}

#[tokio::test]
async fn test_route_params_are_sanitized() {
    let app = build_app(test_config());
    let body = body_json(app.handle(get("/api/v1/tours/%3Cscript%3E")).await).await;
    assert_eq!(body["params"]["id"], "&lt;script&gt;");

    let mut config = test_config();
    config.sanitize.enabled = false;
    let app = build_app(config);
    let body = body_json(app.handle(get("/api/v1/tours/%3Cscript%3E")).await).await;
    assert_eq!(body["params"]["id"], "<script>");
}

#[tokio::test]
async fn test_mount_prefix_ignores_case() {
    let mut config = test_config();
    config.rate_limit.max_requests = 1;
    let app = build_app(config);

    let response = app.handle(get("/API/V1/Tours/42")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["params"]["id"], "42");

    let response = app.handle(get("/Api/v1/tours")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_json_body_is_decoded_and_sanitized() {
    let app = build_app(test_config());
    let ctx = request(
        Method::POST,
        "/api/v1/tours",
        &[("content-type", "application/json")],
        r#"{"name":"<b>Forest Hiker</b>","email":{"$gt":""}}"#,
    );

    let body = body_json(app.handle(ctx).await).await;
    assert_eq!(body["body"]["name"], "&lt;b&gt;Forest Hiker&lt;/b&gt;");
    assert_eq!(body["body"]["email"], json!({}));
}

#[tokio::test]
async fn test_form_body_last_value_wins() {
    let app = build_app(test_config());
    let ctx = request(
        Method::POST,
        "/api/v1/tours",
        &[("content-type", "application/x-www-form-urlencoded")],
        "name=first&name=second",
    );

    let body = body_json(app.handle(ctx).await).await;
    assert_eq!(body["body"]["name"], "second");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = build_app(test_config());
    let response = app.handle(get("/nope?x=1")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["status"], "fail");
    assert_eq!(body["message"], "Route /nope?x=1 not found on this server");
}

#[tokio::test]
async fn test_rate_limit_rejects_101st_request() {
    let app = build_app(test_config());

    for i in 0..100 {
        let response = app.handle(get("/api/v1/tours")).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
    }

    let response = app.handle(get("/api/v1/tours")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

    let body = body_json(response).await;
    assert_eq!(
        body["message"],
        "Too many requests from this IP, please try again in an hour"
    );

    let other = get("/api/v1/tours").with_remote_addr("198.51.100.1:4000".parse().unwrap());
    assert_eq!(app.handle(other).await.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_rate_limit_holds_under_concurrent_burst() {
    let app = build_app(test_config());

    let tasks: Vec<_> = (0..150)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { app.handle(get("/api/v1/tours")).await.status() })
        })
        .collect();

    let mut ok = 0;
    let mut limited = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::TOO_MANY_REQUESTS => limited += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(ok, 100);
    assert_eq!(limited, 50);
}

#[tokio::test]
async fn test_rate_limit_ignores_non_api_paths() {
    let mut config = test_config();
    config.rate_limit.max_requests = 1;
    let app = build_app(config);

    for _ in 0..3 {
        assert_eq!(app.handle(get("/about")).await.status(), StatusCode::NOT_FOUND);
    }
    assert_eq!(app.handle(get("/api/v1/tours")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_oversized_json_is_413() {
    let reached = Arc::new(AtomicBool::new(false));
    let mut registry = HandlerRegistry::new();
    let flag = Arc::clone(&reached);
    registry.register(
        "inspect",
        handler_fn(move |_ctx: RequestContext| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(Response::empty(StatusCode::OK))
            }
        }),
    );
    let app = App::builder(test_config())
        .group(RouteGroup::Tours, group_router(), registry)
        .build();
    let payload = format!(r#"{{"description":"{}"}}"#, "x".repeat(200 * 1024));
    let ctx = request(
        Method::POST,
        "/api/v1/tours",
        &[("content-type", "application/json")],
        payload,
    );

    let response = app.handle(ctx).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(response.headers().get("content-encoding").is_none());
    assert_eq!(body_json(response).await["status"], "fail");
    assert!(!reached.load(Ordering::SeqCst), "handler ran after the body was rejected");
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let app = build_app(test_config());
    let ctx = request(
        Method::PATCH,
        "/api/v1/tours/1",
        &[("content-type", "application/json")],
        "{not json",
    );

    assert_eq!(app.handle(ctx).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unexpected_failure_is_masked_in_production() {
    let mut registry = HandlerRegistry::new();
    registry.register(
        "inspect",
        handler_fn(|_ctx: RequestContext| async {
            Err(AppError::unexpected(anyhow::anyhow!("connection refused")))
        }),
    );
    let app = App::builder(test_config())
        .group(RouteGroup::Users, group_router(), registry)
        .build();

    let response = app.handle(get("/api/v1/users")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Something went very wrong!");
}

#[tokio::test]
async fn test_operational_failure_passes_through() {
    let mut registry = HandlerRegistry::new();
    registry.register(
        "inspect",
        handler_fn(|_ctx: RequestContext| async {
            Err(AppError::new("No tour found with that ID", StatusCode::NOT_FOUND))
        }),
    );
    let app = App::builder(test_config())
        .group(RouteGroup::Tours, group_router(), registry)
        .build();

    let response = app.handle(get("/api/v1/tours/missing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["message"], "No tour found with that ID");
}

#[tokio::test]
async fn test_large_response_is_compressed() {
    let mut registry = HandlerRegistry::new();
    registry.register(
        "inspect",
        handler_fn(|_ctx: RequestContext| async {
            Ok(Response::text(StatusCode::OK, "The Forest Hiker. ".repeat(200)))
        }),
    );
    let app = App::builder(test_config())
        .group(RouteGroup::Tours, group_router(), registry)
        .build();

    let ctx = request(
        Method::GET,
        "/api/v1/tours",
        &[("accept-encoding", "gzip, deflate")],
        Bytes::new(),
    );
    let response = app.handle(ctx).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-encoding"], "gzip");
    assert_eq!(response.headers()["vary"], "Accept-Encoding");

    let small = app.handle(get("/api/v1/tours")).await;
    assert!(!small.headers().contains_key("content-encoding"));
}

#[tokio::test]
async fn test_static_assets_served_before_routes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("css")).unwrap();
    std::fs::write(dir.path().join("css/style.css"), "body { color: #55c57a; }").unwrap();

    let mut config = test_config();
    config.static_files.enabled = true;
    config.static_files.root = dir.path().to_string_lossy().into_owned();
    let app = build_app(config);

    let response = app.handle(get("/css/style.css")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/css"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"body { color: #55c57a; }");

    // missing assets fall through to routing
    let response = app.handle(get("/api/v1/tours")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.handle(get("/img/missing.png")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_served_over_socket() {
    let config = test_config();
    let app = build_app(config.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = tokio::spawn(Server::new(app, config.server).serve(listener, shutdown.clone()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"GET /api/v1/tours/42?sort=price&sort=duration HTTP/1.1\r\n\
              Host: localhost\r\n\
              Connection: close\r\n\r\n",
        )
        .await
        .unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8(raw).unwrap();

    assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
    assert!(raw.contains(r#""sort":"duration""#), "{raw}");
    assert!(raw.contains(r#""id":"42""#), "{raw}");

    shutdown.trigger();
    server.await.unwrap().unwrap();
}
