//! Path and query-string construction.
//!
//! CouchDB distinguishes an absent parameter from an explicit empty or false
//! one, so every setter here skips zero values instead of sending them.

use serde_json::Value;
use url::form_urlencoded;

use crate::error::ApiError;

/// Percent-escape a single path segment (`/` becomes `%2F`).
pub(crate) fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

#[derive(Debug, Default)]
pub(crate) struct QueryString {
    pairs: Vec<(&'static str, String)>,
}

impl QueryString {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, key: &'static str, value: impl Into<String>) -> &mut Self {
        self.pairs.push((key, value.into()));
        self
    }

    /// `key=true` when `on`, nothing otherwise.
    pub(crate) fn flag(&mut self, key: &'static str, on: bool) -> &mut Self {
        if on {
            self.push(key, "true");
        }
        self
    }

    /// Absent, `key=true` or `key=false`.
    pub(crate) fn tri_state(&mut self, key: &'static str, value: Option<bool>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, if value { "true" } else { "false" });
        }
        self
    }

    pub(crate) fn text(&mut self, key: &'static str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.push(key, value);
        }
        self
    }

    pub(crate) fn number(&mut self, key: &'static str, value: Option<u64>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, value.to_string());
        }
        self
    }

    /// JSON-encode `value`: strings gain quotes, numbers and arrays stay bare.
    pub(crate) fn json(&mut self, key: &'static str, value: Option<&Value>) -> Result<&mut Self, ApiError> {
        if let Some(value) = value {
            let encoded = serde_json::to_string(value).map_err(ApiError::SerializationError)?;
            self.push(key, encoded);
        }
        Ok(self)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `path` followed by `?query` when any parameter was set.
    pub(crate) fn append_to(&self, path: String) -> String {
        if self.is_empty() {
            return path;
        }
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.pairs {
            serializer.append_pair(key, value);
        }
        format!("{path}?{}", serializer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_query_leaves_path_untouched() {
        let mut q = QueryString::new();
        q.flag("descending", false).text("stale", Some("")).number("limit", None);
        assert_eq!(q.append_to("/db/_all_docs".to_string()), "/db/_all_docs");
    }

    #[test]
    fn tri_state_sends_explicit_false() {
        let mut q = QueryString::new();
        q.tri_state("reduce", Some(false)).tri_state("group", None);
        assert_eq!(q.append_to("/v".to_string()), "/v?reduce=false");
    }

    #[test]
    fn string_keys_are_quoted_numbers_are_not() {
        let mut q = QueryString::new();
        q.json("key", Some(&json!("abc"))).unwrap();
        q.json("startkey", Some(&json!(5))).unwrap();
        q.json("endkey", Some(&json!(["a", 1]))).unwrap();
        let url = q.append_to("/v".to_string());
        let pairs: Vec<(String, String)> = form_urlencoded::parse(url.split_once('?').unwrap().1.as_bytes())
            .into_owned()
            .collect();
        assert_eq!(pairs[0], ("key".to_string(), "\"abc\"".to_string()));
        assert_eq!(pairs[1], ("startkey".to_string(), "5".to_string()));
        assert_eq!(pairs[2], ("endkey".to_string(), "[\"a\",1]".to_string()));
    }

    #[test]
    fn segments_escape_slashes_and_colons() {
        assert_eq!(segment("a/b"), "a%2Fb");
        assert_eq!(segment("org.couchdb.user:jan"), "org.couchdb.user%3Ajan");
        assert_eq!(segment("_design"), "_design");
    }
}
