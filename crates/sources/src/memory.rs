//! In-memory source for defaults, tests and programmatic overrides.

use async_trait::async_trait;
use serde_json::{Map, Value};
use strata_core::{
    canonical_hash, ConfigSource, Fingerprint, MetadataHandle, SourceMetadata,
};

pub struct MemorySource {
    data: Map<String, Value>,
    origin: String,
    handle: MetadataHandle,
}

impl MemorySource {
    /// A non-mapping value is treated as empty; composition only
    /// accepts mapping roots.
    pub fn new(data: Value) -> Self {
        Self::labeled("memory", data)
    }

    /// A named instance, so several memory sources on one stack can be
    /// told apart (and removed) by origin.
    pub fn labeled(label: &str, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let origin = if label == "memory" {
            "memory".to_string()
        } else {
            format!("memory:{label}")
        };
        Self {
            data,
            handle: MetadataHandle::new("memory", origin.clone()),
            origin,
        }
    }
}

#[async_trait]
impl ConfigSource for MemorySource {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn load(&self) -> Map<String, Value> {
        let fingerprint = self.fingerprint().await;
        self.handle.record_success(Some(&fingerprint), None);
        self.data.clone()
    }

    async fn fingerprint(&self) -> Fingerprint {
        Fingerprint::ContentHash(canonical_hash(&Value::Object(self.data.clone())))
    }

    fn metadata(&self) -> SourceMetadata {
        self.handle.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn returns_its_data() {
        let source = MemorySource::new(json!({"app": {"name": "demo"}}));
        assert!(source.is_available());
        let map = source.load().await;
        assert_eq!(map["app"]["name"], json!("demo"));
        assert_eq!(source.metadata().load_count, 1);
    }

    #[tokio::test]
    async fn non_mapping_data_is_empty() {
        let source = MemorySource::new(json!([1, 2, 3]));
        assert!(source.load().await.is_empty());
    }
}
