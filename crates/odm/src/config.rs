//! Store configuration.
//!
//! [`ElasticsearchConfig`] is built once at startup, either deserialised or read from a
//! flat settings dictionary with [`ElasticsearchConfig::from_settings`], and passed to
//! [`Database::new`](crate::database::Database::new) and the store client constructor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::params::{parse_bool_str, split_strip};

/// Prefix of the store keys in a flat settings dictionary.
pub const SETTINGS_PREFIX: &str = "elasticsearch.";

/// Authentication configuration for Elasticsearch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElasticsearchAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Configuration for the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Node URLs (e.g., `["http://localhost:9200"]`).
    /// The HTTP client connects to the first one.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    /// Index name prefix (default: `"helios"`).
    /// Indices are named `{prefix}_{class_name_lowercase}` unless a class names its own.
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Maximum number of actions per bulk request (default: 500).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Whether the client should discover cluster nodes (default: false).
    #[serde(default)]
    pub sniff: bool,

    /// Whether a request's `_refresh_index` parameter may force an index refresh on bulk
    /// writes (default: false).
    #[serde(default)]
    pub enable_refresh_query: bool,

    /// Whether serving layers expose multi-class queries (default: false).
    #[serde(default)]
    pub enable_polymorphic_query: bool,

    /// Whether single-document writes wait for an index refresh (default: true).
    #[serde(default = "default_refresh_on_save")]
    pub refresh_on_save: bool,

    /// Request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<ElasticsearchAuth>,

    /// Whether to disable certificate validation (default: false).
    /// Only use for development/testing.
    #[serde(default)]
    pub disable_certificate_validation: bool,
}

fn default_hosts() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_index_prefix() -> String {
    "helios".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_refresh_on_save() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    30000
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            index_prefix: default_index_prefix(),
            chunk_size: default_chunk_size(),
            sniff: false,
            enable_refresh_query: false,
            enable_polymorphic_query: false,
            refresh_on_save: default_refresh_on_save(),
            request_timeout_ms: default_request_timeout_ms(),
            auth: None,
            disable_certificate_validation: false,
        }
    }
}

impl ElasticsearchConfig {
    /// Reads the `elasticsearch.*` entries of a flat settings dictionary.
    ///
    /// `elasticsearch.hosts` is required and holds comma-separated `host:port` pairs.
    /// Booleans accept `true/false`, `yes/no`, `on/off` and `1/0`. Unknown keys are
    /// ignored.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| settings.get(&format!("{}{}", SETTINGS_PREFIX, name));
        let mut config = Self::default();

        let hosts = get("hosts").ok_or_else(|| ConfigError::Missing {
            key: format!("{}hosts", SETTINGS_PREFIX),
        })?;
        config.hosts = split_strip(hosts).into_iter().map(host_url).collect();
        if config.hosts.is_empty() {
            return Err(ConfigError::Invalid {
                key: format!("{}hosts", SETTINGS_PREFIX),
                message: "no host given".to_string(),
            });
        }

        if let Some(prefix) = get("index_prefix").or_else(|| get("index_name")) {
            config.index_prefix = prefix.trim().to_string();
        }
        if let Some(value) = get("chunk_size") {
            config.chunk_size = parse_number("chunk_size", value)?;
            if config.chunk_size == 0 {
                return Err(ConfigError::Invalid {
                    key: format!("{}chunk_size", SETTINGS_PREFIX),
                    message: "must be positive".to_string(),
                });
            }
        }
        if let Some(value) = get("request_timeout_ms") {
            config.request_timeout_ms = parse_number("request_timeout_ms", value)?;
        }

        for (name, target) in [
            ("sniff", &mut config.sniff),
            ("enable_refresh_query", &mut config.enable_refresh_query),
            ("enable_polymorphic_query", &mut config.enable_polymorphic_query),
            ("refresh_on_save", &mut config.refresh_on_save),
            (
                "disable_certificate_validation",
                &mut config.disable_certificate_validation,
            ),
        ] {
            if let Some(value) = get(name) {
                *target = parse_bool_str(value).ok_or_else(|| ConfigError::Invalid {
                    key: format!("{}{}", SETTINGS_PREFIX, name),
                    message: format!("'{}' is not a boolean", value),
                })?;
            }
        }

        config.auth = match (get("username"), get("password"), get("token")) {
            (Some(username), Some(password), _) => Some(ElasticsearchAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            (None, None, Some(token)) => Some(ElasticsearchAuth::Bearer {
                token: token.clone(),
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    key: format!("{}username", SETTINGS_PREFIX),
                    message: "username and password must be given together".to_string(),
                });
            }
        };

        Ok(config)
    }

    /// Index name for a document class.
    pub fn index_name(&self, class_name: &str) -> String {
        format!("{}_{}", self.index_prefix, class_name.to_lowercase())
    }
}

fn host_url(host: String) -> String {
    if host.contains("://") {
        host
    } else {
        format!("http://{}", host)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: format!("{}{}", SETTINGS_PREFIX, name),
        message: format!("'{}' is not a number", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ElasticsearchConfig::default();
        assert_eq!(config.chunk_size, 500);
        assert!(config.refresh_on_save);
        assert!(!config.enable_refresh_query);
        assert_eq!(config.index_name("Story"), "helios_story");
    }

    #[test]
    fn test_from_settings() {
        let config = ElasticsearchConfig::from_settings(&settings(&[
            ("elasticsearch.hosts", "localhost:9200, search.local:9201"),
            ("elasticsearch.index_name", "blog"),
            ("elasticsearch.chunk_size", "100"),
            ("elasticsearch.sniff", "yes"),
            ("elasticsearch.enable_refresh_query", "true"),
            ("other.setting", "ignored"),
        ]))
        .unwrap();
        assert_eq!(
            config.hosts,
            vec!["http://localhost:9200", "http://search.local:9201"]
        );
        assert_eq!(config.index_prefix, "blog");
        assert_eq!(config.chunk_size, 100);
        assert!(config.sniff);
        assert!(config.enable_refresh_query);
        assert!(!config.enable_polymorphic_query);
        assert_eq!(config.auth, None);
    }

    #[test]
    fn test_hosts_required() {
        let err = ElasticsearchConfig::from_settings(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn test_invalid_values() {
        let err = ElasticsearchConfig::from_settings(&settings(&[
            ("elasticsearch.hosts", "localhost:9200"),
            ("elasticsearch.sniff", "maybe"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("elasticsearch.sniff"));

        let err = ElasticsearchConfig::from_settings(&settings(&[
            ("elasticsearch.hosts", "localhost:9200"),
            ("elasticsearch.chunk_size", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_basic_auth() {
        let config = ElasticsearchConfig::from_settings(&settings(&[
            ("elasticsearch.hosts", "https://es.example:9200"),
            ("elasticsearch.username", "elastic"),
            ("elasticsearch.password", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.hosts, vec!["https://es.example:9200"]);
        assert!(matches!(config.auth, Some(ElasticsearchAuth::Basic { .. })));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ElasticsearchConfig =
            serde_json::from_str(r#"{"hosts": ["http://es:9200"], "chunk_size": 10}"#).unwrap();
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.index_prefix, "helios");
        assert!(config.refresh_on_save);
    }
}
