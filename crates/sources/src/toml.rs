//! TOML file source.
//!
//! Tables become mappings, arrays of tables become sequences of
//! mappings, and datetimes are carried as their string rendition since
//! the composed tree has no dedicated time kind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use strata_core::{
    mtime_fingerprint, ConfigSource, Fingerprint, MetadataHandle, SourceMetadata,
};
use tracing::{debug, warn};

use crate::text::{file_available, file_size, read_utf8};

pub struct TomlSource {
    path: PathBuf,
    handle: MetadataHandle,
}

impl TomlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let handle = MetadataHandle::new("toml", path.display().to_string());
        Self { path, handle }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn toml_to_json(value: ::toml::Value) -> Value {
    match value {
        ::toml::Value::String(s) => Value::String(s),
        ::toml::Value::Integer(i) => Value::from(i),
        ::toml::Value::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ::toml::Value::Boolean(b) => Value::Bool(b),
        ::toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        ::toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        ::toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

#[async_trait]
impl ConfigSource for TomlSource {
    fn kind(&self) -> &'static str {
        "toml"
    }

    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn is_available(&self) -> bool {
        file_available(&self.path)
    }

    async fn load(&self) -> Map<String, Value> {
        let Some(text) = read_utf8(&self.path, &["toml"], &self.handle) else {
            return Map::new();
        };
        if text.trim().is_empty() {
            self.handle
                .record_success(Some(&self.fingerprint().await), Some(0));
            return Map::new();
        }

        let table: ::toml::Table = match ::toml::from_str(&text) {
            Ok(table) => table,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to parse TOML source");
                self.handle.record_failure(format!("TOML parse error: {err}"));
                return Map::new();
            }
        };

        // A TOML document root is a table by construction, so the
        // mapping-root rule holds without a separate check.
        let map = match toml_to_json(::toml::Value::Table(table)) {
            Value::Object(map) => map,
            _ => unreachable!("TOML root is always a table"),
        };
        debug!(path = %self.path.display(), keys = map.len(), "loaded TOML source");
        self.handle
            .record_success(Some(&self.fingerprint().await), file_size(&self.path));
        map
    }

    async fn fingerprint(&self) -> Fingerprint {
        mtime_fingerprint(&self.path)
    }

    fn metadata(&self) -> SourceMetadata {
        self.handle.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn source_with(content: &str) -> (tempfile::NamedTempFile, TomlSource) {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let source = TomlSource::new(file.path());
        (file, source)
    }

    #[tokio::test]
    async fn tables_become_nested_mappings() {
        let (_f, source) = source_with("[database]\nhost = \"localhost\"\nport = 5432\n");
        let map = source.load().await;
        assert_eq!(map["database"], json!({"host": "localhost", "port": 5432}));
    }

    #[tokio::test]
    async fn arrays_of_tables_become_sequences_of_mappings() {
        let (_f, source) = source_with("[[servers]]\nname = \"a\"\n\n[[servers]]\nname = \"b\"\n");
        let map = source.load().await;
        assert_eq!(map["servers"], json!([{"name": "a"}, {"name": "b"}]));
    }

    #[tokio::test]
    async fn malformed_toml_records_error() {
        let (_f, source) = source_with("this is not = = toml");
        assert!(source.load().await.is_empty());
        assert!(source
            .metadata()
            .last_error
            .unwrap()
            .contains("TOML parse error"));
    }

    #[tokio::test]
    async fn scalar_kinds_survive_conversion() {
        let (_f, source) = source_with("flag = true\nratio = 0.5\ncount = 3\nname = \"x\"\n");
        let map = source.load().await;
        assert_eq!(map["flag"], json!(true));
        assert_eq!(map["ratio"], json!(0.5));
        assert_eq!(map["count"], json!(3));
        assert_eq!(map["name"], json!("x"));
    }
}
