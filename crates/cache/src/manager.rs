//! High-level cache manager: wraps a backend with hit/miss metrics, a
//! tag index for bulk invalidation, and an enable/disable switch.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::{BackendStats, CacheBackend};
use crate::memory::MemoryBackend;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheManagerStats {
    pub enabled: bool,
    pub backend_kind: String,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub hit_ratio: f64,
    pub backend: BackendStats,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    sets: u64,
    deletes: u64,
}

pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    enabled: AtomicBool,
    default_ttl: Option<Duration>,
    counters: RwLock<Counters>,
    tags: RwLock<HashMap<String, HashSet<String>>>,
}

impl CacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Option<Duration>) -> Self {
        Self {
            backend,
            enabled: AtomicBool::new(true),
            default_ttl,
            counters: RwLock::new(Counters::default()),
            tags: RwLock::new(HashMap::new()),
        }
    }

    /// Memory-backed manager with the conventional defaults.
    pub fn in_memory(max_entries: usize, default_ttl: Option<Duration>) -> Self {
        Self::new(
            Arc::new(MemoryBackend::new(max_entries, default_ttl)),
            default_ttl,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Disabling keeps the metrics flowing but makes every read a miss
    /// and every write a no-op, matching null-backend semantics.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        if !self.is_enabled() {
            self.counters.write().await.misses += 1;
            return None;
        }
        let value = self.backend.get(key).await;
        let mut counters = self.counters.write().await;
        match value {
            Some(value) => {
                counters.hits += 1;
                Some(value)
            }
            None => {
                counters.misses += 1;
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        self.set_tagged(key, value, ttl, &[]).await;
    }

    /// Store a value and register it under the given tags; deleting a
    /// tag later removes every key registered under it.
    pub async fn set_tagged(&self, key: &str, value: Value, ttl: Option<Duration>, tags: &[&str]) {
        if !self.is_enabled() {
            return;
        }
        self.backend
            .set(key, value, ttl.or(self.default_ttl))
            .await;
        self.counters.write().await.sets += 1;
        if !tags.is_empty() {
            let mut index = self.tags.write().await;
            for tag in tags {
                index
                    .entry(tag.to_string())
                    .or_default()
                    .insert(key.to_string());
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let deleted = self.backend.delete(key).await;
        if deleted {
            self.counters.write().await.deletes += 1;
        }
        deleted
    }

    /// Remove every entry registered under the tag. Returns how many
    /// keys were deleted.
    pub async fn invalidate_tag(&self, tag: &str) -> usize {
        let keys = match self.tags.write().await.remove(tag) {
            Some(keys) => keys,
            None => return 0,
        };
        debug!(tag, count = keys.len(), "invalidating tagged cache entries");
        let mut deleted = 0;
        for key in keys {
            if self.delete(&key).await {
                deleted += 1;
            }
        }
        deleted
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.is_enabled() && self.backend.exists(key).await
    }

    pub async fn clear(&self) {
        self.backend.clear().await;
        self.tags.write().await.clear();
    }

    pub async fn stats(&self) -> CacheManagerStats {
        let counters = self.counters.read().await;
        let requests = counters.hits + counters.misses;
        CacheManagerStats {
            enabled: self.is_enabled(),
            backend_kind: self.backend.kind().to_string(),
            hits: counters.hits,
            misses: counters.misses,
            sets: counters.sets,
            deletes: counters.deletes,
            hit_ratio: if requests == 0 {
                0.0
            } else {
                counters.hits as f64 / requests as f64
            },
            backend: self.backend.stats().await,
        }
    }
}
