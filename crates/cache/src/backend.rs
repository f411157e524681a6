//! The backend contract and the shared cache-entry bookkeeping.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A cached value with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: Instant,
    /// `None` or zero means the entry never expires.
    pub ttl: Option<Duration>,
    pub access_count: u64,
    pub last_accessed: Instant,
    pub approx_bytes: u64,
}

impl CacheEntry {
    pub fn new(value: Value, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        let approx_bytes = value.to_string().len() as u64;
        Self {
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed: now,
            approx_bytes,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) if !ttl.is_zero() => self.created_at.elapsed() > ttl,
            _ => false,
        }
    }

    /// Read the value, bumping access statistics.
    pub fn access(&mut self) -> Value {
        self.access_count += 1;
        self.last_accessed = Instant::now();
        self.value.clone()
    }
}

/// Counters a backend exposes for diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendStats {
    pub entries: usize,
    pub evictions: u64,
    pub approx_bytes: u64,
}

/// Storage contract for cached source loads.
///
/// Expired entries behave as absent on read and are deleted lazily; no
/// backend runs a background sweeper.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend kind tag for diagnostics, e.g. `"memory"`.
    fn kind(&self) -> &'static str;

    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>);

    async fn delete(&self, key: &str) -> bool;

    async fn clear(&self);

    async fn exists(&self, key: &str) -> bool;

    async fn stats(&self) -> BackendStats;
}
