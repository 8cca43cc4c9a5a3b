//! # Natours Middleware
//!
//! The fixed-order request pipeline of the Natours API server.
//!
//! Every request walks the same chain: static assets, request logging,
//! rate limiting, body decoding, cookie parsing, sanitization, parameter
//! pollution, compression and route dispatch. Unrouted requests end at the
//! not-found terminal and every failure, from any stage or handler, is
//! rendered by the [`ErrorNormalizer`](stages::ErrorNormalizer).
//!
//! ## Example
//!
//! ```
//! use natours_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 11);
//! assert_eq!(stages[0].name(), "static_assets");
//! assert_eq!(stages[10].name(), "error_normalization");
//! ```

#![doc(html_root_url = "https://docs.rs/natours-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod static_files;

pub use middleware::{Middleware, Next, Terminal};
pub use pipeline::{BoxedMiddleware, Pipeline, PipelineBuilder, Stage};
