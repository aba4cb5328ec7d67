//! Filter to query-string conversion
//!
//! Filters yield their pairs in field declaration order. Absent values and
//! empty strings are dropped, everything else is rendered with `to_string`
//! and form-urlencoded.

use std::fmt::Display;
use url::form_urlencoded;

/// Ordered collection of query parameters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryPairs {
    pairs: Vec<(&'static str, String)>,
}

impl QueryPairs {
    /// Create an empty set of pairs
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key=value` when a value is present and not empty
    #[must_use]
    pub fn push<V: Display>(mut self, key: &'static str, value: Option<V>) -> Self {
        if let Some(value) = value {
            let rendered = value.to_string();
            if !rendered.is_empty() {
                self.pairs.push((key, rendered));
            }
        }
        self
    }

    /// Whether no pair survived filtering
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Render as `?k=v&...`, or an empty string when there are no pairs
    #[must_use]
    pub fn to_query_string(&self) -> String {
        if self.pairs.is_empty() {
            return String::new();
        }

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.pairs {
            serializer.append_pair(key, value);
        }
        format!("?{}", serializer.finish())
    }
}

/// Types that can be turned into a list endpoint query string
pub trait ToQuery {
    /// Ordered query pairs for this filter
    fn query_pairs(&self) -> QueryPairs;

    /// Rendered query string including the leading `?`
    fn to_query_string(&self) -> String {
        self.query_pairs().to_query_string()
    }
}
