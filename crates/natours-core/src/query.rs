//! Extended query-string parsing.
//!
//! Query strings and URL-encoded form bodies are parsed with bracket
//! nesting, the way Express' extended parser does it:
//!
//! | Input | Result |
//! |---|---|
//! | `sort=price` | `{sort: "price"}` |
//! | `sort=a&sort=b` | `{sort: ["a", "b"]}` |
//! | `tags[]=a&tags[]=b` | `{tags: ["a", "b"]}` |
//! | `price[gte]=500` | `{price: {gte: "500"}}` |
//! | `ids[1]=b&ids[0]=a` | `{ids: ["a", "b"]}` |
//!
//! Numeric indices above the array limit become map keys. Nesting
//! deeper than the depth limit is kept as one literal key.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

/// Parsed query or form data, in first-seen key order.
pub type QueryMap = IndexMap<String, QueryValue>;

/// One value in a [`QueryMap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    /// A single string.
    Str(String),
    /// Repeated keys, `key[]` or indexed keys.
    List(Vec<QueryValue>),
    /// Bracket-nested keys.
    Map(QueryMap),
}

impl QueryValue {
    /// Returns the string if this is a single value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[QueryValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the nested map if this is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&QueryMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Map(_) => f.write_str("[object]"),
        }
    }
}

/// Limits applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Highest numeric index still treated as an array position.
    pub array_limit: usize,
    /// Maximum bracket nesting depth.
    pub depth: usize,
    /// Maximum number of `&`-separated pairs.
    pub parameter_limit: usize,
    /// Fail instead of truncating when `parameter_limit` is exceeded.
    pub strict_parameter_limit: bool,
}

impl ParseOptions {
    /// Limits for URL query strings. Extra pairs are dropped.
    #[must_use]
    pub const fn query() -> Self {
        Self {
            array_limit: 20,
            depth: 5,
            parameter_limit: 1000,
            strict_parameter_limit: false,
        }
    }

    /// Limits for URL-encoded request bodies. Extra pairs are an error.
    #[must_use]
    pub const fn form() -> Self {
        Self {
            array_limit: 100,
            depth: usize::MAX,
            parameter_limit: 1000,
            strict_parameter_limit: true,
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::query()
    }
}

/// Errors from strict parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// More pairs than the parameter limit allows.
    #[error("too many parameters")]
    TooManyParameters,
}

/// Parses a URL query string (without the leading `?`).
///
/// # Example
///
/// ```
/// use natours_core::query::{parse_query, QueryValue};
///
/// let query = parse_query("duration[gte]=5&sort=price&sort=-ratingsAverage");
/// assert_eq!(
///     query["duration"].as_map().unwrap()["gte"],
///     QueryValue::from("5")
/// );
/// assert_eq!(query["sort"].as_list().unwrap().len(), 2);
/// ```
#[must_use]
pub fn parse_query(input: &str) -> QueryMap {
    parse_with(input, ParseOptions::query()).unwrap_or_default()
}

/// Parses a URL-encoded form body.
pub fn parse_form(input: &str) -> Result<QueryMap, QueryError> {
    parse_form_with_limit(input, ParseOptions::form().parameter_limit)
}

/// Parses a URL-encoded form body, failing past `parameter_limit` pairs.
pub fn parse_form_with_limit(
    input: &str,
    parameter_limit: usize,
) -> Result<QueryMap, QueryError> {
    let pairs = split_pairs(input).count();
    let options = ParseOptions {
        array_limit: ParseOptions::form().array_limit.max(pairs),
        parameter_limit,
        ..ParseOptions::form()
    };
    parse_with(input, options)
}

/// Parses `input` with explicit limits.
pub fn parse_with(input: &str, options: ParseOptions) -> Result<QueryMap, QueryError> {
    let input = input.strip_prefix('?').unwrap_or(input);

    // Same raw key seen twice combines into a list before nesting.
    let mut flat: IndexMap<String, Draft> = IndexMap::new();
    for (count, part) in split_pairs(input).enumerate() {
        if count >= options.parameter_limit {
            if options.strict_parameter_limit {
                return Err(QueryError::TooManyParameters);
            }
            break;
        }
        let (key, value) = split_pair(part);
        if key.is_empty() {
            continue;
        }
        match flat.get_mut(&key) {
            Some(existing) => {
                let old = std::mem::replace(existing, Draft::List(Vec::new()));
                *existing = combine(old, Draft::Str(value));
            }
            None => {
                flat.insert(key, Draft::Str(value));
            }
        }
    }

    let mut root = Draft::Map(IndexMap::new());
    for (key, value) in flat {
        let nested = nest(&key, value, &options);
        root = merge(root, nested);
    }

    Ok(match root.finish() {
        QueryValue::Map(map) => map,
        _ => QueryMap::new(),
    })
}

fn split_pairs(input: &str) -> impl Iterator<Item = &str> {
    input.split('&').filter(|part| !part.is_empty())
}

/// Splits `key=value`, preferring `]=` so `a[b=c]=d` keeps its bracket.
fn split_pair(part: &str) -> (String, String) {
    let pos = match part.find("]=") {
        Some(bracket) => Some(bracket + 1),
        None => part.find('='),
    };
    match pos {
        Some(pos) => (decode(&part[..pos]), decode(&part[pos + 1..])),
        None => (decode(part), String::new()),
    }
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced).map(|d| d.into_owned());
    decoded.unwrap_or(spaced)
}

/// Intermediate tree; `Indexed` keeps sparse array positions until the
/// whole input has been merged.
#[derive(Debug, Clone)]
enum Draft {
    Str(String),
    List(Vec<Draft>),
    Indexed(BTreeMap<usize, Draft>),
    Map(IndexMap<String, Draft>),
}

impl Draft {
    fn finish(self) -> QueryValue {
        match self {
            Self::Str(s) => QueryValue::Str(s),
            Self::List(items) => QueryValue::List(items.into_iter().map(Self::finish).collect()),
            Self::Indexed(items) => {
                QueryValue::List(items.into_values().map(Self::finish).collect())
            }
            Self::Map(map) => {
                QueryValue::Map(map.into_iter().map(|(k, v)| (k, v.finish())).collect())
            }
        }
    }

    const fn is_str(&self) -> bool {
        matches!(self, Self::Str(_))
    }

    fn into_indexed(self) -> BTreeMap<usize, Draft> {
        match self {
            Self::Indexed(items) => items,
            Self::List(items) => items.into_iter().enumerate().collect(),
            other => BTreeMap::from([(0, other)]),
        }
    }

    fn into_map(self) -> IndexMap<String, Draft> {
        match self {
            Self::Map(map) => map,
            Self::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            Self::Indexed(items) => items
                .into_iter()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            Self::Str(s) => IndexMap::from([(s, Self::Str("true".to_string()))]),
        }
    }
}

/// Joins a repeated raw key's values.
fn combine(existing: Draft, value: Draft) -> Draft {
    match existing {
        Draft::List(mut items) => {
            items.push(value);
            Draft::List(items)
        }
        other => Draft::List(vec![other, value]),
    }
}

/// Splits `a[b][c]` into the parent `a` and bracket segments `[b]`, `[c]`.
///
/// Segments past `depth` are wrapped into one literal segment.
fn key_segments(key: &str, depth: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let Some(first) = next_bracket(key, 0) else {
        segments.push(key.to_string());
        return segments;
    };
    if first.0 > 0 {
        segments.push(key[..first.0].to_string());
    }

    let mut cursor = Some(first);
    let mut taken = 0;
    while let Some((start, end)) = cursor {
        if taken == depth {
            segments.push(format!("[{}]", &key[start..]));
            return segments;
        }
        segments.push(key[start..end].to_string());
        taken += 1;
        cursor = next_bracket(key, end);
    }
    segments
}

/// Finds the next `[...]` with no `[` or `]` inside, starting at `from`.
fn next_bracket(key: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = key.as_bytes();
    let mut open = None;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match b {
            b'[' => open = Some(i),
            b']' => {
                if let Some(start) = open {
                    return Some((start, i + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// Builds the nested draft for one flat key, innermost segment first.
fn nest(key: &str, value: Draft, options: &ParseOptions) -> Draft {
    let segments = key_segments(key, options.depth);
    let mut leaf = value;
    for segment in segments.into_iter().rev() {
        leaf = if segment == "[]" {
            match leaf {
                Draft::List(items) => Draft::List(items),
                other => Draft::List(vec![other]),
            }
        } else {
            let (clean, bracketed) = match segment
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
            {
                Some(inner) => (inner, true),
                None => (segment.as_str(), false),
            };
            match array_index(clean, options.array_limit) {
                Some(index) if bracketed => Draft::Indexed(BTreeMap::from([(index, leaf)])),
                _ => Draft::Map(IndexMap::from([(clean.to_string(), leaf)])),
            }
        };
    }
    leaf
}

/// A canonical decimal index within the array limit.
fn array_index(segment: &str, limit: usize) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if segment.len() > 1 && segment.starts_with('0') {
        return None;
    }
    segment.parse::<usize>().ok().filter(|&i| i <= limit)
}

/// Deep-merges `source` into `target`.
fn merge(target: Draft, source: Draft) -> Draft {
    match (target, source) {
        (Draft::Map(mut target), Draft::Map(source)) => {
            for (key, value) in source {
                merge_entry(&mut target, key, value);
            }
            Draft::Map(target)
        }
        (Draft::Map(mut target), Draft::Str(s)) => {
            target.entry(s).or_insert_with(|| Draft::Str("true".to_string()));
            Draft::Map(target)
        }
        (Draft::Map(mut target), source @ (Draft::List(_) | Draft::Indexed(_))) => {
            for (key, value) in source.into_map() {
                merge_entry(&mut target, key, value);
            }
            Draft::Map(target)
        }
        (Draft::Str(a), Draft::Str(b)) => Draft::List(vec![Draft::Str(a), Draft::Str(b)]),
        (Draft::Str(a), Draft::List(items)) => {
            let mut out = vec![Draft::Str(a)];
            out.extend(items);
            Draft::List(out)
        }
        (Draft::Str(a), Draft::Indexed(items)) => {
            let mut out = vec![Draft::Str(a)];
            out.extend(items.into_values());
            Draft::List(out)
        }
        (Draft::Str(a), map @ Draft::Map(_)) => Draft::List(vec![Draft::Str(a), map]),
        (Draft::List(mut items), Draft::Str(s)) => {
            items.push(Draft::Str(s));
            Draft::List(items)
        }
        (Draft::Indexed(mut items), Draft::Str(s)) => {
            let next = items.keys().next_back().map_or(0, |last| last + 1);
            items.insert(next, Draft::Str(s));
            Draft::Indexed(items)
        }
        (target @ (Draft::List(_) | Draft::Indexed(_)), Draft::Map(source)) => {
            let mut map = target.into_map();
            for (key, value) in source {
                merge_entry(&mut map, key, value);
            }
            Draft::Map(map)
        }
        (target, source) => {
            let mut items = target.into_indexed();
            for (index, item) in source.into_indexed() {
                match items.remove(&index) {
                    Some(existing) if !existing.is_str() && !item.is_str() => {
                        items.insert(index, merge(existing, item));
                    }
                    Some(existing) => {
                        items.insert(index, existing);
                        let next = items.keys().next_back().map_or(0, |last| last + 1);
                        items.insert(next, item);
                    }
                    None => {
                        items.insert(index, item);
                    }
                }
            }
            Draft::Indexed(items)
        }
    }
}

fn merge_entry(map: &mut IndexMap<String, Draft>, key: String, value: Draft) {
    match map.get_mut(&key) {
        Some(existing) => {
            let old = std::mem::replace(existing, Draft::List(Vec::new()));
            *existing = merge(old, value);
        }
        None => {
            map.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn s(value: &str) -> QueryValue {
        QueryValue::from(value)
    }

    fn list(values: &[&str]) -> QueryValue {
        QueryValue::List(values.iter().map(|v| s(v)).collect())
    }

    #[test]
    fn test_flat_pairs() {
        let q = parse_query("sort=price&limit=10");
        assert_eq!(q["sort"], s("price"));
        assert_eq!(q["limit"], s("10"));
        assert_eq!(q.keys().collect::<Vec<_>>(), vec!["sort", "limit"]);
    }

    #[test]
    fn test_repeated_keys_become_list() {
        let q = parse_query("sort=a&sort=b&sort=c");
        assert_eq!(q["sort"], list(&["a", "b", "c"]));
    }

    #[test]
    fn test_empty_brackets_append() {
        let q = parse_query("tags[]=a&tags[]=b");
        assert_eq!(q["tags"], list(&["a", "b"]));

        let q = parse_query("tags[]=only");
        assert_eq!(q["tags"], list(&["only"]));
    }

    #[test]
    fn test_nested_operators() {
        let q = parse_query("duration[gte]=5&difficulty=easy&price[lt]=1500");
        let duration = q["duration"].as_map().unwrap();
        assert_eq!(duration["gte"], s("5"));
        assert_eq!(q["price"].as_map().unwrap()["lt"], s("1500"));
    }

    #[test]
    fn test_indexed_keys_sorted() {
        let q = parse_query("ids[1]=b&ids[0]=a");
        assert_eq!(q["ids"], list(&["a", "b"]));
    }

    #[test]
    fn test_index_over_limit_becomes_key() {
        let q = parse_query("ids[21]=x");
        assert_eq!(q["ids"].as_map().unwrap()["21"], s("x"));
    }

    #[test]
    fn test_leading_zero_index_is_key() {
        let q = parse_query("ids[01]=x");
        assert_eq!(q["ids"].as_map().unwrap()["01"], s("x"));
    }

    #[test]
    fn test_plus_and_percent_decoding() {
        let q = parse_query("name=The+Forest%20Hiker&price%5Bgte%5D=5");
        assert_eq!(q["name"], s("The Forest Hiker"));
        assert_eq!(q["price"].as_map().unwrap()["gte"], s("5"));
    }

    #[test]
    fn test_invalid_percent_kept() {
        let q = parse_query("name=%E0%A4%A");
        assert_eq!(q["name"], s("%E0%A4%A"));
    }

    #[test]
    fn test_missing_value_and_empty_key() {
        let q = parse_query("flag&=orphan&&x=");
        assert_eq!(q["flag"], s(""));
        assert_eq!(q["x"], s(""));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_depth_limit_keeps_literal_rest() {
        let q = parse_query("a[b][c][d][e][f][g]=x");
        let mut current = &q["a"];
        for key in ["b", "c", "d", "e", "f"] {
            current = &current.as_map().unwrap()[key];
        }
        assert_eq!(current.as_map().unwrap()["[g]"], s("x"));
    }

    #[test]
    fn test_unclosed_bracket_is_plain_key() {
        let q = parse_query("a[b=c");
        assert_eq!(q["a[b"], s("c"));
    }

    #[test]
    fn test_plain_and_nested_same_name() {
        let q = parse_query("price=5&price[gte]=1");
        let items = q["price"].as_list().unwrap();
        assert_eq!(items[0], s("5"));
        assert_eq!(items[1].as_map().unwrap()["gte"], s("1"));
    }

    #[test]
    fn test_mongo_operator_keys_survive_parsing() {
        let q = parse_query("email[$gt]=&password=x");
        assert!(q["email"].as_map().unwrap().contains_key("$gt"));
    }

    #[test]
    fn test_query_parameter_limit_truncates() {
        let input: Vec<String> = (0..1005).map(|i| format!("k{i}=v")).collect();
        let q = parse_query(&input.join("&"));
        assert_eq!(q.len(), 1000);
    }

    #[test]
    fn test_form_parameter_limit_errors() {
        let input: Vec<String> = (0..1001).map(|i| format!("k{i}=v")).collect();
        assert_eq!(parse_form(&input.join("&")), Err(QueryError::TooManyParameters));
    }

    #[test]
    fn test_form_unlimited_depth() {
        let q = parse_form("a[b][c][d][e][f][g]=x").unwrap();
        let mut current = &q["a"];
        for key in ["b", "c", "d", "e", "f", "g"] {
            current = &current.as_map().unwrap()[key];
        }
        assert_eq!(*current, s("x"));
    }

    #[test]
    fn test_leading_question_mark_stripped() {
        let q = parse_query("?page=2");
        assert_eq!(q["page"], s("2"));
    }

    #[test]
    fn test_display() {
        assert_eq!(list(&["a", "b"]).to_string(), "a,b");
    }

    proptest! {
        #[test]
        fn prop_repeated_key_keeps_value_order(values in prop::collection::vec("[a-z0-9]{0,8}", 1..40)) {
            let input: Vec<String> = values.iter().map(|v| format!("sort={v}")).collect();
            let q = parse_query(&input.join("&"));

            let expected = match values.as_slice() {
                [single] => s(single),
                _ => QueryValue::List(values.iter().map(|v| s(v)).collect()),
            };
            prop_assert_eq!(&q["sort"], &expected);
        }

        #[test]
        fn prop_encoded_value_decodes_back(value in ".{0,24}") {
            let q = parse_query(&format!("name={}", urlencoding::encode(&value)));
            prop_assert_eq!(&q["name"], &s(&value));
        }

        #[test]
        fn prop_distinct_keys_keep_first_seen_order(keys in prop::collection::hash_set("[a-z]{1,8}", 0..30)) {
            let keys: Vec<String> = keys.into_iter().collect();
            let input: Vec<String> = keys.iter().map(|k| format!("{k}=1")).collect();
            let q = parse_query(&input.join("&"));
            prop_assert_eq!(q.keys().cloned().collect::<Vec<_>>(), keys);
        }

        #[test]
        fn prop_arbitrary_input_respects_parameter_limit(input in "[a-z\\[\\]=&%+0-9]{0,200}") {
            let q = parse_query(&input);
            prop_assert!(q.len() <= ParseOptions::query().parameter_limit);
        }
    }
}
