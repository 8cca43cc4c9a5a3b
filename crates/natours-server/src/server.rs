//! HTTP server.
//!
//! One Tokio task per connection, served by Hyper's HTTP/1.1 connection
//! driver. Each request body is collected under the global
//! `max_body_bytes` ceiling and the request timeout, then handed to the
//! [`App`] pipeline together with the peer address.
//!
//! # Example
//!
//! ```rust,no_run
//! use natours_config::NatoursConfig;
//! use natours_server::{App, Server, ShutdownSignal};
//!
//! # async fn run() -> Result<(), natours_server::ServerError> {
//! let config = NatoursConfig::default();
//! let server = Server::new(App::builder(config.clone()).build(), config.server);
//!
//! let shutdown = ShutdownSignal::new();
//! let stop = shutdown.clone();
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     stop.trigger();
//! });
//! server.run_with_shutdown(shutdown).await
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use natours_config::ServerConfig;
use natours_core::{AppError, RequestContext, Response};
use tokio::net::{TcpListener, TcpStream};

use crate::app::App;
use crate::error::ServerError;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// The Natours HTTP server.
#[derive(Debug, Clone)]
pub struct Server {
    app: App,
    config: ServerConfig,
}

impl Server {
    /// Creates a server for `app` with the `server` configuration section.
    #[must_use]
    pub fn new(app: App, config: ServerConfig) -> Self {
        Self { app, config }
    }

    /// The application.
    #[must_use]
    pub fn app(&self) -> &App {
        &self.app
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }

    fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.config.shutdown_timeout_secs)
    }

    /// Runs until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds `server.http_addr` and runs until `shutdown` is triggered.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.http_addr.parse::<SocketAddr>().map_err(|e| {
            ServerError::InvalidAddress {
                addr: self.config.http_addr.clone(),
                reason: e.to_string(),
            }
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// is triggered, then waits for open connections up to the shutdown
    /// timeout.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            environment = self.app.config().environment.as_str(),
            "natours listening"
        );

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();
        server.spawn_rate_limit_pruner(&shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.serve_connection(stream, remote_addr, shutdown).await {
                                tracing::debug!(remote_addr = %remote_addr, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = server.shutdown_timeout();
        tracing::info!(
            connections = tracker.active_connections(),
            timeout_secs = timeout.as_secs(),
            "waiting for open connections"
        );
        tokio::select! {
            () = tracker.wait_for_shutdown() => tracing::info!("all connections closed"),
            () = tokio::time::sleep(timeout) => tracing::warn!(
                connections = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            ),
        }
        tracing::info!("server stopped");
        Ok(())
    }

    fn spawn_rate_limit_pruner(&self, shutdown: &ShutdownSignal) {
        let Some(limiter) = self.app.rate_limiter().cloned() else {
            return;
        };
        let every = Duration::from_secs(self.app.config().rate_limit.prune_interval_secs.max(1));
        let stop = shutdown.recv();
        tokio::spawn(async move {
            tokio::pin!(stop);
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.prune();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = limiter.store().len(), "pruned rate-limit windows");
                        }
                    }
                    () = &mut stop => break,
                }
            }
        });
    }

    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(req, remote_addr).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);
        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    /// Collects the body and runs the request through the app.
    async fn handle_request(&self, req: Request<Incoming>, remote_addr: SocketAddr) -> Response {
        let (parts, body) = req.into_parts();
        let collected = tokio::time::timeout(
            self.request_timeout(),
            Limited::new(body, self.config.max_body_bytes).collect(),
        )
        .await;

        let failure = match collected {
            Ok(Ok(collected)) => {
                let ctx = RequestContext::from_parts(parts, collected.to_bytes())
                    .with_remote_addr(remote_addr);
                return self.app.handle_with_timeout(ctx, self.request_timeout()).await;
            }
            Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
                AppError::payload_too_large()
            }
            Ok(Err(e)) => {
                tracing::debug!(remote_addr = %remote_addr, error = %e, "failed to read request body");
                AppError::bad_request("Failed to read request body")
            }
            Err(_) => AppError::new("Request body timed out", StatusCode::REQUEST_TIMEOUT),
        };

        let ctx = RequestContext::from_parts(parts, Bytes::new()).with_remote_addr(remote_addr);
        self.app.reject(&ctx, &failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use natours_config::NatoursConfig;

    fn server(http_addr: &str) -> Server {
        let mut config = NatoursConfig::production();
        config.server.http_addr = http_addr.to_string();
        config.server.shutdown_timeout_secs = 1;
        Server::new(App::builder(config.clone()).build(), config.server)
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let err = server("not-an-address")
            .run_with_shutdown(ShutdownSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn test_run_and_shutdown() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            server("127.0.0.1:0").run_with_shutdown(shutdown),
        )
        .await;
        assert!(result.expect("server should stop").is_ok());
    }

    #[test]
    fn test_timeouts_from_config() {
        let server = server("127.0.0.1:0");
        assert_eq!(server.request_timeout(), Duration::from_secs(30));
        assert_eq!(server.shutdown_timeout(), Duration::from_secs(1));
        assert_eq!(server.config().http_addr, "127.0.0.1:0");
        assert!(server.app().rate_limiter().is_some());
    }
}
