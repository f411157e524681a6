//! JSON file source.
//!
//! Duplicate sibling keys are resolved last-wins, but each duplicate is
//! reported as a warning and counted on the source's metadata, since a
//! duplicated key in a config file is almost always a merge accident.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::{DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value};
use strata_core::{
    mtime_fingerprint, require_mapping_root, ConfigSource, Fingerprint, MetadataHandle,
    SourceMetadata,
};
use tracing::{debug, warn};

use crate::text::{file_available, file_size, read_utf8};

pub struct JsonSource {
    path: PathBuf,
    handle: MetadataHandle,
}

impl JsonSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let handle = MetadataHandle::new("json", path.display().to_string());
        Self { path, handle }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cheap syntax probe that does not touch metadata.
    pub fn validate_syntax(&self) -> bool {
        std::fs::read_to_string(&self.path)
            .ok()
            .map(|text| serde_json::from_str::<Value>(&text).is_ok())
            .unwrap_or(false)
    }
}

#[async_trait]
impl ConfigSource for JsonSource {
    fn kind(&self) -> &'static str {
        "json"
    }

    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn is_available(&self) -> bool {
        file_available(&self.path)
    }

    async fn load(&self) -> Map<String, Value> {
        let Some(text) = read_utf8(&self.path, &["json"], &self.handle) else {
            return Map::new();
        };
        if text.trim().is_empty() {
            self.handle
                .record_success(Some(&self.fingerprint().await), Some(0));
            return Map::new();
        }

        let mut duplicates = Vec::new();
        let mut de = serde_json::Deserializer::from_str(&text);
        let parsed = DupAwareSeed {
            duplicates: &mut duplicates,
            path: String::new(),
        }
        .deserialize(&mut de)
        .and_then(|value| de.end().map(|_| value));

        let value = match parsed {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to parse JSON source");
                self.handle.record_failure(format!("JSON parse error: {err}"));
                return Map::new();
            }
        };

        for path in &duplicates {
            warn!(
                path = %self.path.display(),
                key = %path,
                "duplicate key in JSON source, last occurrence wins"
            );
        }

        match require_mapping_root(value, &self.handle, &self.origin()) {
            Some(map) => {
                debug!(path = %self.path.display(), keys = map.len(), "loaded JSON source");
                self.handle
                    .record_success(Some(&self.fingerprint().await), file_size(&self.path));
                map
            }
            None => Map::new(),
        }
    }

    async fn fingerprint(&self) -> Fingerprint {
        mtime_fingerprint(&self.path)
    }

    fn metadata(&self) -> SourceMetadata {
        self.handle.snapshot()
    }
}

/// `DeserializeSeed` producing a `serde_json::Value` while recording
/// the dotted path of every duplicated object key.
struct DupAwareSeed<'a> {
    duplicates: &'a mut Vec<String>,
    path: String,
}

impl<'de, 'a> DeserializeSeed<'de> for DupAwareSeed<'a> {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de, 'a> Visitor<'de> for DupAwareSeed<'a> {
    type Value = Value;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("any JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null))
    }

    fn visit_str<E>(self, v: &str) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::String(v))
    }

    fn visit_unit<E>(self) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_seq<A>(mut self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        let mut index = 0usize;
        while let Some(item) = seq.next_element_seed(DupAwareSeed {
            duplicates: &mut *self.duplicates,
            path: format!("{}[{index}]", self.path),
        })? {
            items.push(item);
            index += 1;
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(mut self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut object = Map::new();
        while let Some(key) = map.next_key::<String>()? {
            let child_path = if self.path.is_empty() {
                key.clone()
            } else {
                format!("{}.{key}", self.path)
            };
            let value = map.next_value_seed(DupAwareSeed {
                duplicates: &mut *self.duplicates,
                path: child_path.clone(),
            })?;
            if object.insert(key, value).is_some() {
                self.duplicates.push(child_path);
            }
        }
        Ok(Value::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn source_with(content: &str, ext: &str) -> (NamedTempFile, JsonSource) {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let source = JsonSource::new(file.path());
        (file, source)
    }

    #[tokio::test]
    async fn loads_mapping_root() {
        let (_file, source) = source_with(r#"{"db": {"host": "h1", "port": 1}}"#, "json");
        assert!(source.is_available());
        let map = source.load().await;
        assert_eq!(map["db"], json!({"host": "h1", "port": 1}));

        let meta = source.metadata();
        assert_eq!(meta.load_count, 1);
        assert_eq!(meta.error_count, 0);
        assert!(meta.last_fingerprint.unwrap().starts_with("mtime-"));
    }

    #[tokio::test]
    async fn sequence_root_yields_empty_with_error() {
        let (_file, source) = source_with(r#"[1, 2, 3]"#, "json");
        assert!(source.load().await.is_empty());
        let meta = source.metadata();
        assert_eq!(meta.error_count, 1);
        assert!(meta.last_error.unwrap().contains("mapping"));
    }

    #[tokio::test]
    async fn empty_file_is_an_empty_mapping_without_error() {
        let (_file, source) = source_with("  \n", "json");
        assert!(source.load().await.is_empty());
        assert_eq!(source.metadata().error_count, 0);
    }

    #[tokio::test]
    async fn malformed_json_records_parse_error() {
        let (_file, source) = source_with(r#"{"a": }"#, "json");
        assert!(source.load().await.is_empty());
        assert!(source
            .metadata()
            .last_error
            .unwrap()
            .contains("JSON parse error"));
    }

    #[tokio::test]
    async fn duplicate_keys_are_last_wins() {
        let (_file, source) = source_with(r#"{"a": 1, "a": 2}"#, "json");
        let map = source.load().await;
        assert_eq!(map["a"], json!(2));
        assert_eq!(source.metadata().error_count, 0);
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let source = JsonSource::new("/no/such/file.json");
        assert!(!source.is_available());
        assert!(source.load().await.is_empty());
        assert_eq!(source.fingerprint().await, Fingerprint::Unknown);
    }

    #[test]
    fn syntax_probe() {
        let (_file, source) = source_with(r#"{"ok": true}"#, "json");
        assert!(source.validate_syntax());
        let (_file, source) = source_with(r#"{"#, "json");
        assert!(!source.validate_syntax());
    }
}
