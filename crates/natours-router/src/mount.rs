//! Ordered prefix mounts for route groups.

use http::Method;

use crate::params::Params;
use crate::router::Router;

/// Strips `prefix` from `path` when the path is inside the mount.
///
/// A path is inside a mount when it equals the prefix or continues with
/// `/` after it, so `/api` covers `/api/v1/tours` but not `/apis`. The
/// root prefix `/` (or an empty prefix) covers every path. Letters compare
/// ASCII case-insensitively, so `/API/v1` is inside `/api`.
///
/// # Example
///
/// ```rust
/// use natours_router::prefix_matches;
///
/// assert_eq!(prefix_matches("/api/v1/tours", "/api/v1/tours/42"), Some("/42"));
/// assert_eq!(prefix_matches("/api", "/api"), Some(""));
/// assert_eq!(prefix_matches("/api", "/apis"), None);
/// assert_eq!(prefix_matches("/", "/overview"), Some("/overview"));
/// assert_eq!(prefix_matches("/api", "/API/v1"), Some("/v1"));
/// ```
#[must_use]
pub fn prefix_matches<'p>(prefix: &str, path: &'p str) -> Option<&'p str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let head = path.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = path.get(prefix.len()..)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// One mounted route group.
#[derive(Debug, Clone)]
pub struct Mount<T> {
    prefix: String,
    router: Router,
    group: T,
}

impl<T> Mount<T> {
    /// The prefix this group is mounted under.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The group's route table.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The value attached at mount time.
    #[must_use]
    pub fn group(&self) -> &T {
        &self.group
    }
}

/// Result of a successful dispatch.
#[derive(Debug)]
pub struct MountMatch<'a, T> {
    /// Prefix of the mount that matched.
    pub prefix: &'a str,
    /// Value attached to that mount.
    pub group: &'a T,
    /// Operation registered for the method and remaining path.
    pub operation_id: &'a str,
    /// Parameters captured from the remaining path.
    pub params: Params,
}

/// Route groups in registration order.
///
/// Dispatch tries mounts in order; a mount whose prefix covers the path
/// but has no route for the remainder (or the method) is skipped and the
/// next mount is tried. The first full match wins.
///
/// # Example
///
/// ```rust
/// use natours_router::{MethodRouter, MountTable, Router};
/// use http::Method;
///
/// let mut tours = Router::new();
/// tours.insert("/:id", MethodRouter::new().get("getTour")).unwrap();
///
/// let mut views = Router::new();
/// views.insert("/", MethodRouter::new().get("getOverview")).unwrap();
///
/// let mut table = MountTable::new();
/// table.mount("/", views, "views");
/// table.mount("/api/v1/tours", tours, "tours");
///
/// let found = table.dispatch(&Method::GET, "/api/v1/tours/7").unwrap();
/// assert_eq!(*found.group, "tours");
/// assert_eq!(found.params.get("id"), Some("7"));
/// ```
#[derive(Debug, Clone)]
pub struct MountTable<T> {
    mounts: Vec<Mount<T>>,
}

impl<T> Default for MountTable<T> {
    fn default() -> Self {
        Self { mounts: Vec::new() }
    }
}

impl<T> MountTable<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route group under `prefix`.
    pub fn mount(&mut self, prefix: impl Into<String>, router: Router, group: T) -> &mut Self {
        self.mounts.push(Mount {
            prefix: prefix.into(),
            router,
            group,
        });
        self
    }

    /// Finds the first mount with a route for `method` and `path`.
    #[must_use]
    pub fn dispatch(&self, method: &Method, path: &str) -> Option<MountMatch<'_, T>> {
        self.mounts.iter().find_map(|mount| {
            let rest = prefix_matches(&mount.prefix, path)?;
            let found = mount.router.match_route(method, rest)?;
            Some(MountMatch {
                prefix: &mount.prefix,
                group: &mount.group,
                operation_id: found.operation_id,
                params: found.params,
            })
        })
    }

    /// Iterates over mounts in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Mount<T>> {
        self.mounts.iter()
    }

    /// Number of mounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Returns true if nothing is mounted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}
