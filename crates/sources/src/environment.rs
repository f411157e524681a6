//! Environment-variable source.
//!
//! Variables matching one of the configured prefixes are stripped,
//! split on the separator into a nested path, and optionally parsed
//! into richer types (JSON first, then numeric, then the boolean
//! vocabulary, with list splitting on the configured separator).

use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use strata_core::{
    canonical_hash, parse_bool_str, set_path, ConfigSource, Fingerprint, MetadataHandle,
    SourceMetadata,
};
use tracing::debug;

pub struct EnvironmentSource {
    prefixes: Vec<String>,
    separator: String,
    nested: bool,
    case_sensitive: bool,
    strip_prefix: bool,
    parse_values: bool,
    list_separator: String,
    handle: MetadataHandle,
}

impl EnvironmentSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefixes = if prefix.is_empty() {
            Vec::new()
        } else {
            vec![prefix]
        };
        Self::with_prefixes(prefixes)
    }

    /// An empty prefix list matches every variable.
    pub fn with_prefixes(prefixes: Vec<String>) -> Self {
        let origin = if prefixes.is_empty() {
            "env:*".to_string()
        } else {
            format!("env:{}", prefixes.join(","))
        };
        Self {
            prefixes,
            separator: "_".to_string(),
            nested: true,
            case_sensitive: false,
            strip_prefix: true,
            parse_values: true,
            list_separator: ",".to_string(),
            handle: MetadataHandle::new("environment", origin),
        }
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Keep matched keys flat instead of splitting into nested paths.
    pub fn flat(mut self) -> Self {
        self.nested = false;
        self
    }

    /// Match prefixes case-sensitively and keep key casing.
    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn keep_prefix(mut self) -> Self {
        self.strip_prefix = false;
        self
    }

    /// Leave every value as a raw string.
    pub fn raw_values(mut self) -> Self {
        self.parse_values = false;
        self
    }

    pub fn list_separator(mut self, separator: impl Into<String>) -> Self {
        self.list_separator = separator.into();
        self
    }

    fn matching_prefix(&self, key: &str) -> Option<usize> {
        if self.prefixes.is_empty() {
            return Some(0);
        }
        self.prefixes.iter().position(|prefix| {
            if self.case_sensitive {
                key.starts_with(prefix.as_str())
            } else {
                key.to_lowercase().starts_with(&prefix.to_lowercase())
            }
        })
    }

    fn parse_value(&self, raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::String(String::new());
        }
        // JSON first: numbers, quoted strings, objects, arrays,
        // true/false/null all come through faithfully.
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return value;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::from(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
        if let Some(b) = parse_bool_str(trimmed) {
            return Value::Bool(b);
        }
        if trimmed.contains(self.list_separator.as_str()) {
            let items: Vec<Value> = trimmed
                .split(self.list_separator.as_str())
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| self.parse_value(item))
                .collect();
            return Value::Array(items);
        }
        Value::String(raw.to_string())
    }

    fn insert(&self, map: &mut Map<String, Value>, key: &str, value: Value) {
        if self.nested && key.contains(self.separator.as_str()) {
            let path = key
                .split(self.separator.as_str())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(".");
            if path.is_empty() {
                return;
            }
            set_path(map, &path, value);
        } else {
            map.insert(key.to_string(), value);
        }
    }

    fn collect(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let mut matched = 0usize;
        // Sorted iteration makes collisions between a scalar variable
        // and its nested children deterministic.
        let mut vars: Vec<(String, String)> = std::env::vars().collect();
        vars.sort();
        for (env_key, env_value) in vars {
            let Some(index) = self.matching_prefix(&env_key) else {
                continue;
            };
            let prefix_len = self.prefixes.get(index).map(|p| p.len()).unwrap_or(0);
            let stripped = if self.strip_prefix {
                &env_key[prefix_len..]
            } else {
                env_key.as_str()
            };
            if stripped.is_empty() {
                continue;
            }
            let key = if self.case_sensitive {
                stripped.to_string()
            } else {
                stripped.to_lowercase()
            };
            let value = if self.parse_values {
                self.parse_value(&env_value)
            } else {
                Value::String(env_value)
            };
            self.insert(&mut map, &key, value);
            matched += 1;
        }
        debug!(origin = %self.origin(), matched, "collected environment variables");
        map
    }
}

#[async_trait]
impl ConfigSource for EnvironmentSource {
    fn kind(&self) -> &'static str {
        "environment"
    }

    fn origin(&self) -> String {
        self.handle.snapshot().origin
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn load(&self) -> Map<String, Value> {
        let map = self.collect();
        let fingerprint = Fingerprint::ContentHash(canonical_hash(&Value::Object(map.clone())));
        self.handle.record_success(Some(&fingerprint), None);
        map
    }

    async fn fingerprint(&self) -> Fingerprint {
        Fingerprint::ContentHash(canonical_hash(&Value::Object(self.collect())))
    }

    fn metadata(&self) -> SourceMetadata {
        self.handle.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Each test uses its own unique prefix: the process environment is
    // global and tests run concurrently.

    #[tokio::test]
    async fn nested_keys_split_on_separator() {
        std::env::set_var("STRATA_T1_DB_HOST", "h2");
        std::env::set_var("STRATA_T1_DB_PORT", "5432");
        let source = EnvironmentSource::new("STRATA_T1_");
        let map = source.load().await;
        assert_eq!(map["db"]["host"], json!("h2"));
        assert_eq!(map["db"]["port"], json!(5432));
    }

    #[tokio::test]
    async fn value_parsing_precedence() {
        std::env::set_var("STRATA_T2_JSONVAL", r#"{"a": 1}"#);
        std::env::set_var("STRATA_T2_NUM", "2.5");
        std::env::set_var("STRATA_T2_FLAG", "yes");
        std::env::set_var("STRATA_T2_LIST", "a, b, c");
        std::env::set_var("STRATA_T2_PLAIN", "hello world");
        let source = EnvironmentSource::new("STRATA_T2_");
        let map = source.load().await;

        assert_eq!(map["jsonval"], json!({"a": 1}));
        assert_eq!(map["num"], json!(2.5));
        assert_eq!(map["flag"], json!(true));
        assert_eq!(map["list"], json!(["a", "b", "c"]));
        assert_eq!(map["plain"], json!("hello world"));
    }

    #[tokio::test]
    async fn raw_mode_keeps_strings() {
        std::env::set_var("STRATA_T3_NUM", "42");
        let source = EnvironmentSource::new("STRATA_T3_").raw_values();
        let map = source.load().await;
        assert_eq!(map["num"], json!("42"));
    }

    #[tokio::test]
    async fn flat_mode_keeps_underscores() {
        std::env::set_var("STRATA_T4_DB_HOST", "x");
        let source = EnvironmentSource::new("STRATA_T4_").flat();
        let map = source.load().await;
        assert_eq!(map["db_host"], json!("x"));
    }

    #[tokio::test]
    async fn scalar_collision_preserves_value_under_reserved_key() {
        std::env::set_var("STRATA_T5_DB", "sqlite");
        std::env::set_var("STRATA_T5_DB_HOST", "h");
        let source = EnvironmentSource::new("STRATA_T5_");
        let map = source.load().await;
        // Sorted processing puts the scalar first; set_path then
        // displaces it under the reserved key.
        assert_eq!(map["db"]["_value"], json!("sqlite"));
        assert_eq!(map["db"]["host"], json!("h"));
    }

    #[tokio::test]
    async fn fingerprint_tracks_content() {
        std::env::set_var("STRATA_T6_A", "1");
        let source = EnvironmentSource::new("STRATA_T6_");
        let first = source.fingerprint().await;
        std::env::set_var("STRATA_T6_A", "2");
        let second = source.fingerprint().await;
        assert_ne!(first, second);
        std::env::set_var("STRATA_T6_A", "1");
        assert_eq!(source.fingerprint().await, first);
    }
}
