//! No-op backend: every read is a miss, every write is dropped.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{BackendStats, CacheBackend};

#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

#[async_trait]
impl CacheBackend for NullBackend {
    fn kind(&self) -> &'static str {
        "null"
    }

    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Option<Duration>) {}

    async fn delete(&self, _key: &str) -> bool {
        false
    }

    async fn clear(&self) {}

    async fn exists(&self, _key: &str) -> bool {
        false
    }

    async fn stats(&self) -> BackendStats {
        BackendStats::default()
    }
}
