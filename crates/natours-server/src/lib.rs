//! # Natours Server
//!
//! HTTP/1.1 server for the Natours API, built on Hyper and Tokio.
//!
//! - [`App`] assembles the fixed-order pipeline from a
//!   [`NatoursConfig`](natours_config::NatoursConfig) and the route groups
//! - [`Server`] accepts connections, collects bodies under a global size
//!   ceiling and a request timeout, and hands each request to the app
//! - [`ShutdownSignal`] and [`ConnectionTracker`] drive graceful shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use natours_config::NatoursConfig;
//! use natours_server::{App, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), natours_server::ServerError> {
//!     let config = NatoursConfig::default();
//!     let app = App::builder(config.clone()).build();
//!     Server::new(app, config.server).run().await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/natours-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
mod error;
pub mod server;
pub mod shutdown;

pub use app::{App, AppBuilder, RouteGroup};
pub use error::ServerError;
pub use server::Server;
pub use shutdown::{ConnectionTracker, ShutdownSignal};
