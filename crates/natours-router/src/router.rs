//! Route table for one route group.

use http::Method;

use crate::method_router::MethodRouter;
use crate::node::Node;
use crate::params::Params;
use crate::{RouteError, RouteMatch};

/// Pattern + method table for a single route group (tours, users, ...).
///
/// Patterns are relative to the group's mount prefix and use Express
/// syntax (`/:id`, `/:tourId/reviews`); `{id}` and `*rest` are also
/// accepted.
///
/// # Example
///
/// ```rust
/// use natours_router::{Router, MethodRouter};
/// use http::Method;
///
/// let mut tours = Router::new();
/// tours.insert("/", MethodRouter::new().get("getAllTours").post("createTour")).unwrap();
/// tours.insert("/:id", MethodRouter::new().get("getTour")).unwrap();
///
/// let found = tours.match_route(&Method::GET, "/5c88fa8cf4afda39709c2955").unwrap();
/// assert_eq!(found.operation_id, "getTour");
/// assert_eq!(found.params.get("id"), Some("5c88fa8cf4afda39709c2955"));
/// ```
#[derive(Debug, Clone)]
pub struct Router {
    root: Node,
    route_count: usize,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty route table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            route_count: 0,
        }
    }

    /// Registers `methods` under `pattern`.
    pub fn insert(&mut self, pattern: &str, methods: MethodRouter) -> Result<(), RouteError> {
        self.root.insert(pattern, methods)?;
        self.route_count += 1;
        Ok(())
    }

    /// Registers a single method for `pattern`.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        operation_id: impl Into<String>,
    ) -> Result<(), RouteError> {
        self.insert(pattern, MethodRouter::new().on(method, operation_id))
    }

    /// Finds the operation registered for `method` on `path`.
    ///
    /// A path that matches but has no entry for `method` is a miss, so the
    /// caller can try the next mount.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let (methods, params) = self.root.match_path(path)?;
        let operation_id = methods.operation_for(method)?;
        Some(RouteMatch::new(operation_id, params))
    }

    /// Finds the method table for `path`, ignoring the method.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&MethodRouter, Params)> {
        self.root.match_path(path)
    }

    /// Number of `insert` calls that succeeded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}
