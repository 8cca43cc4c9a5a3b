//! Request cookies.

use indexmap::IndexMap;
use serde::Serialize;

/// Cookies sent by the client, in header order.
///
/// # Example
///
/// ```
/// use natours_core::Cookies;
///
/// let cookies = Cookies::parse("jwt=abc.def; theme=\"dark\"; jwt=ignored");
/// assert_eq!(cookies.get("jwt"), Some("abc.def"));
/// assert_eq!(cookies.get("theme"), Some("dark"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Cookies {
    cookies: IndexMap<String, String>,
}

impl Cookies {
    /// Creates an empty cookie map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `Cookie` header value.
    ///
    /// Pairs without `=` or with an empty name are skipped, the first
    /// occurrence of a name wins, surrounding double quotes are removed and
    /// values are percent-decoded (kept raw if that fails).
    #[must_use]
    pub fn parse(header_value: &str) -> Self {
        let mut cookies = IndexMap::new();

        for pair in header_value.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() || cookies.contains_key(name) {
                continue;
            }
            let mut value = value.trim();
            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                value = &value[1..value.len() - 1];
            }
            cookies.insert(name.to_string(), decode_value(value));
        }

        Self { cookies }
    }

    /// Get a cookie value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Check if a cookie exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    /// Inserts a cookie unless one with the same name exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.entry(name.into()).or_insert_with(|| value.into());
    }

    /// Get an iterator over all cookies.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Returns true if no cookies were sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

fn decode_value(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}
