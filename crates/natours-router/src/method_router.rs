//! Per-path method table.

use http::Method;
use smallvec::SmallVec;

/// Maps HTTP methods to operation ids for one path pattern.
///
/// A route group registers `router.route("/:id").get(getTour).patch(updateTour)`;
/// this type is the Rust side of that chain. `HEAD` falls back to the `GET`
/// operation when no explicit `HEAD` entry exists, and [`MethodRouter::all`]
/// registers an operation that answers every method.
///
/// # Example
///
/// ```rust
/// use natours_router::MethodRouter;
/// use http::Method;
///
/// let methods = MethodRouter::new()
///     .get("getAllTours")
///     .post("createTour");
///
/// assert_eq!(methods.operation_for(&Method::GET), Some("getAllTours"));
/// assert_eq!(methods.operation_for(&Method::HEAD), Some("getAllTours"));
/// assert_eq!(methods.operation_for(&Method::DELETE), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MethodRouter {
    entries: SmallVec<[(Method, String); 4]>,
    any: Option<String>,
}

impl MethodRouter {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `operation_id` for `method`. An existing entry is kept.
    #[must_use]
    pub fn on(mut self, method: Method, operation_id: impl Into<String>) -> Self {
        if !self.entries.iter().any(|(m, _)| *m == method) {
            self.entries.push((method, operation_id.into()));
        }
        self
    }

    /// Registers a `GET` operation.
    #[must_use]
    pub fn get(self, operation_id: impl Into<String>) -> Self {
        self.on(Method::GET, operation_id)
    }

    /// Registers a `POST` operation.
    #[must_use]
    pub fn post(self, operation_id: impl Into<String>) -> Self {
        self.on(Method::POST, operation_id)
    }

    /// Registers a `PUT` operation.
    #[must_use]
    pub fn put(self, operation_id: impl Into<String>) -> Self {
        self.on(Method::PUT, operation_id)
    }

    /// Registers a `PATCH` operation.
    #[must_use]
    pub fn patch(self, operation_id: impl Into<String>) -> Self {
        self.on(Method::PATCH, operation_id)
    }

    /// Registers a `DELETE` operation.
    #[must_use]
    pub fn delete(self, operation_id: impl Into<String>) -> Self {
        self.on(Method::DELETE, operation_id)
    }

    /// Registers an operation for every method without an explicit entry.
    #[must_use]
    pub fn all(mut self, operation_id: impl Into<String>) -> Self {
        if self.any.is_none() {
            self.any = Some(operation_id.into());
        }
        self
    }

    /// Resolves the operation for `method`.
    #[must_use]
    pub fn operation_for(&self, method: &Method) -> Option<&str> {
        let explicit = |m: &Method| {
            self.entries
                .iter()
                .find(|(registered, _)| registered == m)
                .map(|(_, op)| op.as_str())
        };

        explicit(method)
            .or_else(|| {
                if *method == Method::HEAD {
                    explicit(&Method::GET)
                } else {
                    None
                }
            })
            .or(self.any.as_deref())
    }

    /// Adds entries from `other` for methods not already present.
    pub fn merge(&mut self, other: MethodRouter) {
        for (method, op) in other.entries {
            if !self.entries.iter().any(|(m, _)| *m == method) {
                self.entries.push((method, op));
            }
        }
        if self.any.is_none() {
            self.any = other.any;
        }
    }

    /// Lists explicitly registered methods in registration order.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        self.entries.iter().map(|(m, _)| m.clone()).collect()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.any.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_methods() {
        let methods = MethodRouter::new()
            .get("getTour")
            .patch("updateTour")
            .delete("deleteTour");

        assert_eq!(methods.operation_for(&Method::GET), Some("getTour"));
        assert_eq!(methods.operation_for(&Method::PATCH), Some("updateTour"));
        assert_eq!(methods.operation_for(&Method::DELETE), Some("deleteTour"));
        assert_eq!(methods.operation_for(&Method::POST), None);
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let methods = MethodRouter::new().get("overview");
        assert_eq!(methods.operation_for(&Method::HEAD), Some("overview"));
    }

    #[test]
    fn test_explicit_head_wins() {
        let methods = MethodRouter::new().get("overview").on(Method::HEAD, "probe");
        assert_eq!(methods.operation_for(&Method::HEAD), Some("probe"));
    }

    #[test]
    fn test_all_matches_remaining_methods() {
        let methods = MethodRouter::new().get("getTour").all("fallback");
        assert_eq!(methods.operation_for(&Method::GET), Some("getTour"));
        assert_eq!(methods.operation_for(&Method::PUT), Some("fallback"));
        assert_eq!(
            methods.operation_for(&Method::from_bytes(b"PURGE").unwrap()),
            Some("fallback")
        );
    }

    #[test]
    fn test_first_registration_kept() {
        let methods = MethodRouter::new().get("first").get("second");
        assert_eq!(methods.operation_for(&Method::GET), Some("first"));
    }

    #[test]
    fn test_merge_does_not_overwrite() {
        let mut methods = MethodRouter::new().get("getAllTours");
        methods.merge(MethodRouter::new().get("other").post("createTour"));

        assert_eq!(methods.operation_for(&Method::GET), Some("getAllTours"));
        assert_eq!(methods.operation_for(&Method::POST), Some("createTour"));
        assert_eq!(methods.allowed_methods(), vec![Method::GET, Method::POST]);
    }

    #[test]
    fn test_is_empty() {
        assert!(MethodRouter::new().is_empty());
        assert!(!MethodRouter::new().all("x").is_empty());
    }
}
