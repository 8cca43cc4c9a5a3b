//! Segment tree backing [`Router`](crate::Router).

use crate::method_router::MethodRouter;
use crate::params::Params;
use crate::RouteError;

/// What a single pattern segment matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Literal text, e.g. `top-5-cheap`.
    Static,
    /// A named capture written `:name` or `{name}`.
    Param(String),
    /// A capture of every remaining segment, written `*name` (or bare `*`).
    Wildcard(String),
}

impl SegmentKind {
    /// Classifies one segment of a route pattern.
    fn classify(segment: &str) -> Self {
        if let Some(name) = segment.strip_prefix(':') {
            Self::Param(name.to_string())
        } else if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Self::Param(name.to_string())
        } else if let Some(name) = segment.strip_prefix('*') {
            let name = if name.is_empty() { "0" } else { name };
            Self::Wildcard(name.to_string())
        } else {
            Self::Static
        }
    }
}

/// A node in the segment tree.
///
/// Lookup priority at every level is static child, then the parameter
/// child, then the wildcard child. A failed deeper match backtracks to the
/// next alternative and rolls back any parameters it captured.
#[derive(Debug, Clone)]
pub struct Node {
    /// Pattern text of this segment.
    pub segment: String,
    /// What this segment matches.
    pub kind: SegmentKind,
    /// Operations registered for the path ending at this node.
    pub methods: Option<MethodRouter>,
    static_children: Vec<Node>,
    param_child: Option<Box<Node>>,
    wildcard_child: Option<Box<Node>>,
}

impl Node {
    fn new(segment: &str, kind: SegmentKind) -> Self {
        Self {
            segment: segment.to_string(),
            kind,
            methods: None,
            static_children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    /// Creates the root of an empty tree.
    #[must_use]
    pub fn root() -> Self {
        Self::new("", SegmentKind::Static)
    }

    /// Registers `methods` under `pattern`.
    ///
    /// Registering the same pattern twice merges the method tables.
    pub fn insert(&mut self, pattern: &str, methods: MethodRouter) -> Result<(), RouteError> {
        let segments: Vec<&str> = split_path(pattern).collect();
        if let Some(pos) = segments
            .iter()
            .position(|s| matches!(SegmentKind::classify(s), SegmentKind::Wildcard(_)))
        {
            if pos + 1 != segments.len() {
                return Err(RouteError::WildcardNotLast(pattern.to_string()));
            }
        }
        if let Some(conflict) = self.param_conflict(&segments) {
            return Err(RouteError::ParamConflict {
                pattern: pattern.to_string(),
                existing: conflict,
            });
        }
        self.insert_segments(&segments, methods);
        Ok(())
    }

    /// Detects `:id` vs `:slug` at the same depth, which would make one
    /// of the two names unreachable.
    fn param_conflict(&self, segments: &[&str]) -> Option<String> {
        let Some((first, rest)) = segments.split_first() else {
            return None;
        };
        match SegmentKind::classify(first) {
            SegmentKind::Static => self
                .find_static_child(first)
                .and_then(|child| child.param_conflict(rest)),
            SegmentKind::Param(name) => match &self.param_child {
                Some(child) => match &child.kind {
                    SegmentKind::Param(existing) if *existing != name => {
                        Some(existing.clone())
                    }
                    _ => child.param_conflict(rest),
                },
                None => None,
            },
            SegmentKind::Wildcard(_) => None,
        }
    }

    fn insert_segments(&mut self, segments: &[&str], methods: MethodRouter) {
        let Some((first, rest)) = segments.split_first() else {
            match &mut self.methods {
                Some(existing) => existing.merge(methods),
                None => self.methods = Some(methods),
            }
            return;
        };

        let kind = SegmentKind::classify(first);
        let child = match &kind {
            SegmentKind::Static => {
                let index = match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(first))
                {
                    Ok(i) => i,
                    Err(i) => {
                        self.static_children
                            .insert(i, Node::new(first, SegmentKind::Static));
                        i
                    }
                };
                &mut self.static_children[index]
            }
            SegmentKind::Param(_) => &mut **self
                .param_child
                .get_or_insert_with(|| Box::new(Node::new(first, kind.clone()))),
            SegmentKind::Wildcard(_) => &mut **self
                .wildcard_child
                .get_or_insert_with(|| Box::new(Node::new(first, kind.clone()))),
        };
        child.insert_segments(rest, methods);
    }

    /// Finds the method table for a concrete request path.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&MethodRouter, Params)> {
        let segments: Vec<&str> = split_path(path).collect();
        let mut params = Params::new();
        let methods = self.match_segments(&segments, &mut params)?;
        Some((methods, params))
    }

    fn match_segments<'a>(&'a self, segments: &[&str], params: &mut Params) -> Option<&'a MethodRouter> {
        let Some((first, rest)) = segments.split_first() else {
            return self.methods.as_ref();
        };

        if let Some(child) = self.find_static_child(first) {
            if let Some(found) = child.match_segments(rest, params) {
                return Some(found);
            }
        }

        if let Some(child) = &self.param_child {
            if let SegmentKind::Param(name) = &child.kind {
                let mark = params.len();
                params.push_segment(name, first);
                if let Some(found) = child.match_segments(rest, params) {
                    return Some(found);
                }
                params.truncate(mark);
            }
        }

        if let Some(child) = &self.wildcard_child {
            if let (SegmentKind::Wildcard(name), Some(methods)) = (&child.kind, &child.methods) {
                params.push_segment(name, &segments.join("/"));
                return Some(methods);
            }
        }

        None
    }

    fn find_static_child(&self, segment: &str) -> Option<&Node> {
        self.static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
            .ok()
            .map(|i| &self.static_children[i])
    }
}

/// Splits a path into non-empty segments, so `/tours/` and `/tours` match alike.
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn op<'a>(root: &'a Node, path: &str) -> Option<(&'a str, Params)> {
        let (methods, params) = root.match_path(path)?;
        Some((methods.operation_for(&Method::GET)?, params))
    }

    #[test]
    fn test_classify_segments() {
        assert_eq!(SegmentKind::classify("tours"), SegmentKind::Static);
        assert_eq!(SegmentKind::classify(":id"), SegmentKind::Param("id".into()));
        assert_eq!(SegmentKind::classify("{id}"), SegmentKind::Param("id".into()));
        assert_eq!(SegmentKind::classify("*rest"), SegmentKind::Wildcard("rest".into()));
        assert_eq!(SegmentKind::classify("*"), SegmentKind::Wildcard("0".into()));
    }

    #[test]
    fn test_static_and_param() {
        let mut root = Node::root();
        root.insert("/", MethodRouter::new().get("getAllTours")).unwrap();
        root.insert("/:id", MethodRouter::new().get("getTour")).unwrap();

        let (name, params) = op(&root, "/").unwrap();
        assert_eq!(name, "getAllTours");
        assert!(params.is_empty());

        let (name, params) = op(&root, "/5c88fa8cf4afda39709c2951").unwrap();
        assert_eq!(name, "getTour");
        assert_eq!(params.get("id"), Some("5c88fa8cf4afda39709c2951"));
    }

    #[test]
    fn test_static_beats_param() {
        let mut root = Node::root();
        root.insert("/tour-stats", MethodRouter::new().get("getTourStats")).unwrap();
        root.insert("/:id", MethodRouter::new().get("getTour")).unwrap();

        assert_eq!(op(&root, "/tour-stats").unwrap().0, "getTourStats");
        assert_eq!(op(&root, "/abc").unwrap().0, "getTour");
    }

    #[test]
    fn test_backtrack_rolls_back_params() {
        let mut root = Node::root();
        root.insert("/:tourId/reviews", MethodRouter::new().get("getReviews")).unwrap();
        root.insert("/*rest", MethodRouter::new().get("catchAll")).unwrap();

        let (name, params) = op(&root, "/abc/bookings").unwrap();
        assert_eq!(name, "catchAll");
        assert_eq!(params.get("tourId"), None);
        assert_eq!(params.get("rest"), Some("abc/bookings"));
    }

    #[test]
    fn test_static_dead_end_falls_back_to_param() {
        let mut root = Node::root();
        root.insert("/me/photo", MethodRouter::new().get("photo")).unwrap();
        root.insert("/:id", MethodRouter::new().get("getUser")).unwrap();

        let (name, params) = op(&root, "/me").unwrap();
        assert_eq!(name, "getUser");
        assert_eq!(params.get("id"), Some("me"));
    }

    #[test]
    fn test_nested_params() {
        let mut root = Node::root();
        root.insert("/tours-within/:distance/center/:latlng/unit/:unit", MethodRouter::new().get("getToursWithin"))
            .unwrap();

        let (name, params) = op(&root, "/tours-within/400/center/34.1,-118.1/unit/mi").unwrap();
        assert_eq!(name, "getToursWithin");
        assert_eq!(params.get("distance"), Some("400"));
        assert_eq!(params.get("latlng"), Some("34.1,-118.1"));
        assert_eq!(params.get("unit"), Some("mi"));
    }

    #[test]
    fn test_wildcard_must_be_last() {
        let mut root = Node::root();
        let err = root.insert("/*rest/more", MethodRouter::new().get("x")).unwrap_err();
        assert!(matches!(err, RouteError::WildcardNotLast(_)));
    }

    #[test]
    fn test_conflicting_param_names() {
        let mut root = Node::root();
        root.insert("/:id", MethodRouter::new().get("getTour")).unwrap();
        let err = root.insert("/:slug/edit", MethodRouter::new().get("edit")).unwrap_err();
        assert!(matches!(err, RouteError::ParamConflict { ref existing, .. } if existing == "id"));
    }

    #[test]
    fn test_insert_merges_methods() {
        let mut root = Node::root();
        root.insert("/:id", MethodRouter::new().get("getTour")).unwrap();
        root.insert("/:id", MethodRouter::new().delete("deleteTour")).unwrap();

        let (methods, _) = root.match_path("/1").unwrap();
        assert_eq!(methods.operation_for(&Method::GET), Some("getTour"));
        assert_eq!(methods.operation_for(&Method::DELETE), Some("deleteTour"));
    }

    #[test]
    fn test_no_match() {
        let mut root = Node::root();
        root.insert("/tours", MethodRouter::new().get("x")).unwrap();
        assert!(root.match_path("/users").is_none());
        assert!(root.match_path("/tours/1").is_none());
    }
}
