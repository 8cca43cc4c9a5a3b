//! # Natours
//!
//! The request pipeline in front of the Natours tours, users, reviews,
//! booking and view handlers.
//!
//! Every request passes through a fixed chain of stages before it reaches a
//! route group's handlers:
//!
//! ```text
//! Request → StaticAssets → RequestLogger → RateLimit → BodyDecoder
//!         → CookieParser → Sanitize → ParameterPollution → Compression
//!         → RouterDispatch → NotFound ─┐
//!                                      ↓
//! Response ←──────────────── ErrorNormalization
//! ```
//!
//! This crate re-exports the workspace crates and provides the
//! [`inspect`] handlers the `natours` binary mounts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use natours::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().with_node_env().load()?;
//!     let app = natours::inspect::mount_all(App::builder(config.clone())).build();
//!     Server::new(app, config.server).run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/natours/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use natours_config as config;
pub use natours_core as core;
pub use natours_middleware as middleware;
pub use natours_router as router;
pub use natours_server as server;
pub use natours_telemetry as telemetry;

pub mod inspect;

/// Common imports.
pub mod prelude {
    pub use natours_config::{ConfigLoader, Environment, NatoursConfig};
    pub use natours_core::{
        handler_fn, AppError, AppResult, Handler, HandlerRegistry, Payload, RequestContext,
        Response, ResponseExt,
    };
    pub use natours_router::{MethodRouter, Router};
    pub use natours_server::{App, AppBuilder, RouteGroup, Server, ShutdownSignal};
    pub use natours_telemetry::{init_logging, LogConfig};
}
