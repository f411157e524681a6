//! Secret-backed source.
//!
//! Declared mappings of config dot-path → secret name are resolved
//! through the read-only secrets accessor at load time. Missing secrets
//! are omitted with a warning; the composition must keep working when a
//! secret back-end is degraded.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use strata_core::{
    canonical_hash, set_path, ConfigSource, Fingerprint, MetadataHandle, SecretStore,
    SourceMetadata,
};
use tracing::{debug, warn};

pub struct SecretBackedSource {
    store: Arc<dyn SecretStore>,
    mappings: Vec<(String, String)>,
    handle: MetadataHandle,
}

impl SecretBackedSource {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            mappings: Vec::new(),
            handle: MetadataHandle::new("secrets", "secrets:0"),
        }
    }

    /// Map a config path (e.g. `database.password`) to a named secret.
    pub fn map_secret(mut self, config_path: impl Into<String>, secret_name: impl Into<String>) -> Self {
        self.mappings.push((config_path.into(), secret_name.into()));
        self.handle = MetadataHandle::new("secrets", format!("secrets:{}", self.mappings.len()));
        self
    }

    fn resolve(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (config_path, secret_name) in &self.mappings {
            match self.store.get(secret_name) {
                Some(secret) => {
                    set_path(&mut map, config_path, secret.reveal().clone());
                }
                None => {
                    warn!(
                        secret = %secret_name,
                        path = %config_path,
                        "secret not found, omitting from configuration"
                    );
                }
            }
        }
        map
    }

    /// The resolved mapping with every leaf masked, for display and
    /// logging surfaces.
    pub fn display_data(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (config_path, _) in &self.mappings {
            set_path(&mut map, config_path, Value::String("[MASKED]".to_string()));
        }
        map
    }
}

#[async_trait]
impl ConfigSource for SecretBackedSource {
    fn kind(&self) -> &'static str {
        "secrets"
    }

    fn origin(&self) -> String {
        format!("secrets:{}", self.mappings.len())
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn load(&self) -> Map<String, Value> {
        let map = self.resolve();
        debug!(resolved = map.len(), declared = self.mappings.len(), "loaded secret-backed source");
        let fingerprint = Fingerprint::ContentHash(canonical_hash(&Value::Object(map.clone())));
        self.handle.record_success(Some(&fingerprint), None);
        map
    }

    async fn fingerprint(&self) -> Fingerprint {
        Fingerprint::ContentHash(canonical_hash(&Value::Object(self.resolve())))
    }

    fn metadata(&self) -> SourceMetadata {
        self.handle.snapshot()
    }
}
