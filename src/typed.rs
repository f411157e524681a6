//! Typed views over a configuration path.
//!
//! A [`TypedKey`] binds a dot path to a `Deserialize` target once, so
//! call sites read `key.get(&config)` instead of repeating the path
//! and the turbofish everywhere.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::manager::ConfigManager;

pub struct TypedKey<T> {
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedKey<T>
where
    T: DeserializeOwned,
{
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The deserialized value at this key, or `None` when the path is
    /// missing or the shape does not fit.
    pub async fn get(&self, config: &ConfigManager) -> Option<T> {
        config.get_as(&self.path).await
    }

    pub async fn get_or(&self, config: &ConfigManager, default: T) -> T {
        self.get(config).await.unwrap_or(default)
    }
}

impl<T> Clone for TypedKey<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use strata_sources::MemorySource;

    #[derive(Debug, Clone, Deserialize, PartialEq)]
    struct PoolSettings {
        size: u32,
        timeout_secs: u64,
    }

    #[tokio::test]
    async fn typed_keys_deserialize_sections() {
        let manager = ConfigManager::builder()
            .add_source(Arc::new(MemorySource::new(json!({
                "db": {"pool": {"size": 8, "timeout_secs": 30}},
            }))))
            .build()
            .await
            .unwrap();

        let pool: TypedKey<PoolSettings> = TypedKey::new("db.pool");
        assert_eq!(
            pool.get(&manager).await,
            Some(PoolSettings {
                size: 8,
                timeout_secs: 30
            })
        );

        let missing: TypedKey<PoolSettings> = TypedKey::new("db.replica");
        let fallback = PoolSettings {
            size: 1,
            timeout_secs: 5,
        };
        assert_eq!(
            missing.get_or(&manager, fallback.clone()).await,
            fallback
        );
    }

    #[tokio::test]
    async fn shape_mismatch_reads_as_none() {
        let manager = ConfigManager::builder()
            .add_source(Arc::new(MemorySource::new(json!({"db": {"pool": "nope"}}))))
            .build()
            .await
            .unwrap();

        let pool: TypedKey<PoolSettings> = TypedKey::new("db.pool");
        assert_eq!(pool.get(&manager).await, None);
    }
}
