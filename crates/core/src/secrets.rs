//! Read-only secrets accessor contract.
//!
//! The resolver never merges secrets into the composed tree; they are
//! looked up on demand and overlaid at read time. Storage back-ends
//! live outside this workspace — the in-memory store here exists for
//! embedding and tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A named secret with its bookkeeping. The payload never appears in
/// `Display`/`Debug` output.
#[derive(Clone)]
pub struct SecretValue {
    pub name: String,
    value: Value,
    pub created_at: DateTime<Utc>,
    pub access_count: u64,
    pub metadata: Map<String, Value>,
}

impl SecretValue {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            created_at: Utc::now(),
            access_count: 0,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// The actual secret payload. Callers are expected to keep it out
    /// of logs; display surfaces always mask.
    pub fn reveal(&self) -> &Value {
        &self.value
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[MASKED_SECRET]")
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("name", &self.name)
            .field("value", &"[MASKED]")
            .field("access_count", &self.access_count)
            .finish()
    }
}

/// What the resolver needs from a secret back-end. Implementations
/// must not panic; back-end failures are treated as "not found".
pub trait SecretStore: Send + Sync {
    /// Retrieve a secret. Implementations update the access counter.
    fn get(&self, name: &str) -> Option<SecretValue>;

    fn names(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool {
        self.names().iter().any(|n| n == name)
    }
}

struct StoredSecret {
    value: Value,
    created_at: DateTime<Utc>,
    access_count: u64,
    metadata: Map<String, Value>,
}

/// In-memory secret store for tests and simple embeddings.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, StoredSecret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, value: Value) {
        self.insert_with_metadata(name, value, Map::new());
    }

    pub fn insert_with_metadata(
        &self,
        name: impl Into<String>,
        value: Value,
        metadata: Map<String, Value>,
    ) {
        if let Ok(mut secrets) = self.secrets.write() {
            secrets.insert(
                name.into(),
                StoredSecret {
                    value,
                    created_at: Utc::now(),
                    access_count: 0,
                    metadata,
                },
            );
        }
    }

    /// Replace a secret's payload, resetting its creation time. The
    /// access counter survives rotation.
    pub fn rotate(&self, name: &str, value: Value) -> bool {
        if let Ok(mut secrets) = self.secrets.write() {
            if let Some(stored) = secrets.get_mut(name) {
                stored.value = value;
                stored.created_at = Utc::now();
                return true;
            }
        }
        false
    }

    pub fn remove(&self, name: &str) -> bool {
        self.secrets
            .write()
            .map(|mut s| s.remove(name).is_some())
            .unwrap_or(false)
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, name: &str) -> Option<SecretValue> {
        let mut secrets = self.secrets.write().ok()?;
        let stored = secrets.get_mut(name)?;
        stored.access_count += 1;
        Some(SecretValue {
            name: name.to_string(),
            value: stored.value.clone(),
            created_at: stored.created_at,
            access_count: stored.access_count,
            metadata: stored.metadata.clone(),
        })
    }

    fn names(&self) -> Vec<String> {
        self.secrets
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn contains(&self, name: &str) -> bool {
        self.secrets
            .read()
            .map(|s| s.contains_key(name))
            .unwrap_or(false)
    }
}
