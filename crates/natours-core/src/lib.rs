//! # Natours Core
//!
//! Core types shared by every crate of the Natours request pipeline:
//!
//! - [`RequestContext`] - Per-request state: method, URI, headers, cookies,
//!   parsed query, body [`Payload`] and route parameters
//! - [`RequestId`] - UUID v7 request identifier
//! - [`AppError`] - Structured failure with an operational flag
//! - [`Handler`] - Route handler trait, plus [`HandlerRegistry`]
//! - [`query`] - Extended (bracket-nesting) query string parsing

#![doc(html_root_url = "https://docs.rs/natours-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod cookies;
mod error;
mod handler;
pub mod query;
mod response;

pub use context::{Payload, RequestContext, RequestId};
pub use cookies::Cookies;
pub use error::{status_text, AppError, AppResult, GENERIC_ERROR_MESSAGE};
pub use handler::{handler_fn, FnHandler, Handler, HandlerRegistry};
pub use query::{QueryMap, QueryValue};
pub use response::{BoxFuture, Response, ResponseExt};

pub use natours_router::Params;
