//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5984";

/// Settings for building a `CouchClient` with the default transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, e.g. `http://localhost:5984`.
    pub base_url: String,
    /// Upper bound on a whole request/response exchange. `None` or `0` waits
    /// forever.
    pub timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Read `COUCHDB_URL` and `COUCHDB_TIMEOUT_SECS`, falling back to defaults.
    /// An unparsable timeout is ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup("COUCHDB_URL")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.base_url),
            timeout_secs: lookup("COUCHDB_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_node() {
        let config = ClientConfig::from_lookup(|_| None);
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = ClientConfig::from_lookup(|key| match key {
            "COUCHDB_URL" => Some("http://couch:5984".to_string()),
            "COUCHDB_TIMEOUT_SECS" => Some("30".to_string()),
            _ => None,
        });
        assert_eq!(config.base_url, "http://couch:5984");
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_timeout_means_no_timeout() {
        let config = ClientConfig::from_lookup(|key| match key {
            "COUCHDB_TIMEOUT_SECS" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(config.timeout_secs, Some(0));
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let config: ClientConfig = serde_json::from_str(r#"{"timeout_secs":5}"#).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout_secs, Some(5));
    }
}
