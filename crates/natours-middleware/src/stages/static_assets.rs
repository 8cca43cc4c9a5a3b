//! Static asset stage.
//!
//! Serves GET and HEAD requests from the public root before any API logic
//! runs. Anything that is not a servable file falls through to the rest of
//! the chain.

use std::sync::Arc;

use http::Method;
use natours_config::StaticFilesConfig;
use natours_core::{AppError, AppResult, BoxFuture, RequestContext, Response};

use crate::middleware::{Middleware, Next};
use crate::pipeline::Stage;
use crate::static_files::StaticFiles;

/// Serves files from the public root.
#[derive(Debug, Clone)]
pub struct StaticAssetsMiddleware {
    files: Arc<StaticFiles>,
}

impl StaticAssetsMiddleware {
    /// Wraps a configured file server.
    #[must_use]
    pub fn new(files: StaticFiles) -> Self {
        Self {
            files: Arc::new(files),
        }
    }

    /// Creates the stage from the `static_files` section.
    #[must_use]
    pub fn from_config(config: &StaticFilesConfig) -> Self {
        Self::new(StaticFiles::from_config(config))
    }

    /// The file server.
    #[must_use]
    pub fn files(&self) -> &StaticFiles {
        &self.files
    }
}

impl Middleware for StaticAssetsMiddleware {
    fn name(&self) -> &'static str {
        Stage::StaticAssets.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, AppResult<Response>> {
        Box::pin(async move {
            let method = ctx.method().clone();
            if method != Method::GET && method != Method::HEAD {
                return next.run(ctx).await;
            }

            let files = Arc::clone(&self.files);
            let path = ctx.path().to_string();
            let headers = ctx.headers().clone();
            let served =
                tokio::task::spawn_blocking(move || files.handle(&path, &headers, &method))
                    .await
                    .map_err(AppError::unexpected)?;

            match served {
                Ok(response) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        path = ctx.path(),
                        status = response.status().as_u16(),
                        "served static file"
                    );
                    Ok(response)
                }
                Err(err) if err.falls_through() => next.run(ctx).await,
                Err(err) => Err(AppError::unexpected(err)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use natours_core::ResponseExt;
    use tempfile::TempDir;

    fn api(_: &mut RequestContext) -> BoxFuture<'static, AppResult<Response>> {
        Box::pin(async { Ok(Response::text(StatusCode::OK, "api")) })
    }

    fn stage() -> (TempDir, StaticAssetsMiddleware) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/bundle.js"), "console.log(1)").unwrap();
        let stage = StaticAssetsMiddleware::new(StaticFiles::new(dir.path()).index("index.html"));
        (dir, stage)
    }

    async fn run(stage: &StaticAssetsMiddleware, method: Method, uri: &str) -> Response {
        let mut ctx = RequestContext::new(method, uri.parse().unwrap());
        stage.process(&mut ctx, Next::terminal(api)).await.unwrap()
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        let (_dir, stage) = stage();
        let response = run(&stage, Method::GET, "/js/bundle.js").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            "application/javascript; charset=UTF-8"
        );
    }

    #[tokio::test]
    async fn test_root_serves_index() {
        let (_dir, stage) = stage();
        let response = run(&stage, Method::GET, "/").await;
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            "text/html; charset=UTF-8"
        );
    }

    #[tokio::test]
    async fn test_falls_through() {
        let (_dir, stage) = stage();
        for (method, uri) in [
            (Method::GET, "/api/v1/tours"),
            (Method::POST, "/js/bundle.js"),
            (Method::GET, "/../secret"),
            (Method::GET, "/.git/config"),
        ] {
            let response = run(&stage, method, uri).await;
            assert_eq!(response.headers()[http::header::CONTENT_TYPE], "text/plain; charset=utf-8");
        }
    }

    #[tokio::test]
    async fn test_missing_root_falls_through() {
        let stage = StaticAssetsMiddleware::new(StaticFiles::new("/nonexistent/natours/public"));
        let response = run(&stage, Method::GET, "/index.html").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(stage.files().root(), std::path::Path::new("/nonexistent/natours/public"));
    }
}
