//! Bounded in-memory backend with TTL and LRU eviction.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::{BackendStats, CacheBackend, CacheEntry};

pub struct MemoryBackend {
    max_entries: usize,
    default_ttl: Option<Duration>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    evictions: RwLock<u64>,
}

impl MemoryBackend {
    pub fn new(max_entries: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            max_entries: max_entries.max(1),
            default_ttl,
            entries: RwLock::new(HashMap::new()),
            evictions: RwLock::new(0),
        }
    }

    /// Drop expired entries, then the least recently used one if the
    /// map is still full.
    async fn make_room(&self, entries: &mut HashMap<String, CacheEntry>) {
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        let mut evicted = expired.len() as u64;
        for key in expired {
            entries.remove(&key);
        }

        if entries.len() >= self.max_entries {
            if let Some(lru_key) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            {
                debug!(key = %lru_key, "evicting least recently used cache entry");
                entries.remove(&lru_key);
                evicted += 1;
            }
        }

        if evicted > 0 {
            *self.evictions.write().await += evicted;
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(1000, None)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.access()),
            None => None,
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.or(self.default_ttl);
        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            self.make_room(&mut entries).await;
        }
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    async fn clear(&self) {
        self.entries.write().await.clear();
    }

    async fn exists(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    async fn stats(&self) -> BackendStats {
        let entries = self.entries.read().await;
        BackendStats {
            entries: entries.len(),
            evictions: *self.evictions.read().await,
            approx_bytes: entries.values().map(|e| e.approx_bytes).sum(),
        }
    }
}
