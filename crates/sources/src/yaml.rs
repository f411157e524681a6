//! YAML file source.
//!
//! Parsed through `serde_yaml` into plain JSON values, which rules out
//! language-specific tag constructors while keeping anchors and
//! aliases. Multi-document streams are deep-merged in order, later
//! documents winning.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use strata_core::{
    deep_merge, mtime_fingerprint, require_mapping_root, ConfigSource, Fingerprint,
    MetadataHandle, SourceMetadata,
};
use tracing::{debug, warn};

use crate::text::{file_available, file_size, read_utf8};

pub struct YamlSource {
    path: PathBuf,
    handle: MetadataHandle,
}

impl YamlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let handle = MetadataHandle::new("yaml", path.display().to_string());
        Self { path, handle }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn validate_syntax(&self) -> bool {
        std::fs::read_to_string(&self.path)
            .ok()
            .map(|text| serde_yaml::from_str::<Value>(&text).is_ok())
            .unwrap_or(false)
    }

    fn parse_documents(&self, text: &str) -> Result<Value, String> {
        let mut merged = Value::Object(Map::new());
        let mut seen_any = false;
        for document in serde_yaml::Deserializer::from_str(text) {
            let value = Value::deserialize(document).map_err(|e| e.to_string())?;
            // An empty document parses as null; it contributes nothing.
            if value.is_null() {
                continue;
            }
            if !value.is_object() {
                return Err(format!(
                    "document root must be a mapping, got {}",
                    kind_name(&value)
                ));
            }
            merged = deep_merge(merged, value);
            seen_any = true;
        }
        if !seen_any {
            return Ok(Value::Object(Map::new()));
        }
        Ok(merged)
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Array(_) => "sequence",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
        Value::Object(_) => "mapping",
    }
}

#[async_trait]
impl ConfigSource for YamlSource {
    fn kind(&self) -> &'static str {
        "yaml"
    }

    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn is_available(&self) -> bool {
        file_available(&self.path)
    }

    async fn load(&self) -> Map<String, Value> {
        let Some(text) = read_utf8(&self.path, &["yaml", "yml"], &self.handle) else {
            return Map::new();
        };
        if text.trim().is_empty() {
            self.handle
                .record_success(Some(&self.fingerprint().await), Some(0));
            return Map::new();
        }

        let value = match self.parse_documents(&text) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to parse YAML source");
                self.handle.record_failure(format!("YAML parse error: {err}"));
                return Map::new();
            }
        };

        match require_mapping_root(value, &self.handle, &self.origin()) {
            Some(map) => {
                debug!(path = %self.path.display(), keys = map.len(), "loaded YAML source");
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
