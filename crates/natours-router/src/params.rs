//! Route parameters captured while matching a path.

use smallvec::SmallVec;

/// Most Natours routes capture at most two parameters (`/:tourId/reviews/:id`).
const INLINE_PARAMS: usize = 4;

/// Named values captured from `:name`, `{name}` and `*name` segments.
///
/// Values are percent-decoded when captured, so `/tours/caf%C3%A9` yields
/// `café`. A segment that is not valid percent-encoding is kept verbatim.
///
/// # Example
///
/// ```rust
/// use natours_router::Params;
///
/// let mut params = Params::new();
/// params.push("tourId", "5c88fa8cf4afda39709c2955");
///
/// assert_eq!(params.get("tourId"), Some("5c88fa8cf4afda39709c2955"));
/// assert_eq!(params.get("id"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    entries: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a captured value as-is.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Appends a raw path segment, percent-decoding it first.
    pub fn push_segment(&mut self, name: &str, raw: &str) {
        let value = urlencoding::decode(raw)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        self.entries.push((name.to_string(), value));
    }

    /// Drops captures past `len`; used when a branch fails to match.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// Returns the value captured for `name`.
    ///
    /// When a pattern repeats a name the last capture wins.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of captures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over `(name, value)` pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl IntoIterator for Params {
    type Item = (String, String);
    type IntoIter = smallvec::IntoIter<[(String, String); INLINE_PARAMS]>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
