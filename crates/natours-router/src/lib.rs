//! Route matching for the Natours request pipeline.
//!
//! Each route group (views, tours, users, reviews, booking) owns a
//! [`Router`]: a segment tree from path pattern and method to an operation
//! id. Groups are mounted under path prefixes in a [`MountTable`], which
//! dispatches a request to the first mount whose prefix covers the path
//! and whose router has a route for the remainder.
//!
//! # Example
//!
//! ```rust
//! use natours_router::{Router, MethodRouter};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.insert("/", MethodRouter::new().get("getAllUsers")).unwrap();
//! router.insert("/:id", MethodRouter::new().get("getUser").delete("deleteUser")).unwrap();
//!
//! let route_match = router.match_route(&Method::GET, "/123").unwrap();
//! assert_eq!(route_match.operation_id, "getUser");
//! assert_eq!(route_match.params.get("id"), Some("123"));
//! ```
//!
//! # Matching order
//!
//! ```text
//!                  (root)
//!                    │
//!        ┌───────────┼─────────────┐
//!        │           │             │
//!   "tour-stats"   ":id"        "*rest"
//!     [GET]      [GET,PATCH]     [GET]
//!                    │
//!                "reviews"
//!                 [GET,POST]
//! ```
//!
//! Static segments are tried first, then the parameter, then the
//! wildcard. A branch that fails deeper down backtracks.

#![doc(html_root_url = "https://docs.rs/natours-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod method_router;
mod mount;
mod node;
mod params;
mod router;

pub use method_router::MethodRouter;
pub use mount::{prefix_matches, Mount, MountMatch, MountTable};
pub use node::{Node, SegmentKind};
pub use params::Params;
pub use router::Router;

/// A matched route with its operation ID and extracted parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    /// The operation ID for the matched route
    pub operation_id: &'a str,
    /// Extracted path parameters
    pub params: Params,
}

impl<'a> RouteMatch<'a> {
    /// Creates a new route match.
    #[must_use]
    pub fn new(operation_id: &'a str, params: Params) -> Self {
        Self {
            operation_id,
            params,
        }
    }
}

/// Errors raised while building a route table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// A `*name` segment appeared before the end of the pattern.
    #[error("wildcard must be the last segment in `{0}`")]
    WildcardNotLast(String),

    /// Two patterns name the parameter at the same depth differently.
    #[error("parameter in `{pattern}` conflicts with existing `:{existing}`")]
    ParamConflict {
        /// Pattern being inserted.
        pattern: String,
        /// Name already registered at that depth.
        existing: String,
    },
}
