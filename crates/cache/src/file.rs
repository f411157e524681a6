//! Persistent file-per-key backend.
//!
//! Each entry is a regular file under the root directory named by the
//! SHA-256 of its key. The content is a fixed-size binary header
//! (magic, version, creation time, TTL) followed by the JSON-encoded
//! value. Writes go through a temp file and a rename so a crash never
//! leaves a partially written entry.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::{BackendStats, CacheBackend};

const MAGIC: &[u8; 4] = b"STRC";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 8;
const ENTRY_EXT: &str = "cache";

pub struct FileBackend {
    root: PathBuf,
    default_ttl: Option<Duration>,
    // Serializes writers; per-key granularity is not worth the ceremony
    // for a directory of small files.
    write_lock: Mutex<()>,
    evictions: Mutex<u64>,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>, default_ttl: Option<Duration>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            default_ttl,
            write_lock: Mutex::new(()),
            evictions: Mutex::new(0),
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root.join(format!("{digest}.{ENTRY_EXT}"))
    }

    fn encode(value: &Value, ttl: Option<Duration>) -> Vec<u8> {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let ttl_secs = ttl.map(|t| t.as_secs()).unwrap_or(0);
        let body = value.to_string().into_bytes();

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&created.to_le_bytes());
        out.extend_from_slice(&ttl_secs.to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Decode an entry file. `None` means corrupted or expired.
    fn decode(bytes: &[u8]) -> Option<(Value, bool)> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
            return None;
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().ok()?);
        if version != VERSION {
            return None;
        }
        let created = u64::from_le_bytes(bytes[8..16].try_into().ok()?);
        let ttl_secs = u64::from_le_bytes(bytes[16..24].try_into().ok()?);
        let value: Value = serde_json::from_slice(&bytes[HEADER_LEN..]).ok()?;

        let expired = if ttl_secs == 0 {
            false
        } else {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            now.saturating_sub(created) > ttl_secs
        };
        Some((value, expired))
    }

    async fn read_entry(&self, path: &Path) -> Option<Value> {
        let bytes = std::fs::read(path).ok()?;
        match Self::decode(&bytes) {
            Some((value, false)) => Some(value),
            Some((_, true)) => {
                debug!(path = %path.display(), "removing expired cache entry");
                let _ = std::fs::remove_file(path);
                *self.evictions.lock().await += 1;
                None
            }
            None => {
                warn!(path = %path.display(), "removing corrupted cache entry");
                let _ = std::fs::remove_file(path);
                None
            }
        }
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.read_entry(&self.entry_path(key)).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.or(self.default_ttl);
        let path = self.entry_path(key);
        let bytes = Self::encode(&value, ttl);

        let _guard = self.write_lock.lock().await;
        let tmp = path.with_extension("tmp");
        let written = std::fs::write(&tmp, &bytes).and_then(|_| std::fs::rename(&tmp, &path));
        if let Err(err) = written {
            warn!(key, error = %err, "failed to persist cache entry");
            let _ = std::fs::remove_file(&tmp);
        }
    }

    async fn delete(&self, key: &str) -> bool {
        std::fs::remove_file(self.entry_path(key)).is_ok()
    }

    async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        if let Ok(entries) = std::fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXT) {
                    let _ = std::fs::remove_file(path);
                }
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        self.read_entry(&self.entry_path(key)).await.is_some()
    }

    async fn stats(&self) -> BackendStats {
        let mut entries = 0usize;
        let mut approx_bytes = 0u64;
        if let Ok(dir) = std::fs::read_dir(&self.root) {
            for entry in dir.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXT) {
                    entries += 1;
                    if let Ok(meta) = entry.metadata() {
                        approx_bytes += meta.len().saturating_sub(HEADER_LEN as u64);
                    }
                }
            }
        }
        BackendStats {
            entries,
            evictions: *self.evictions.lock().await,
            approx_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn persists_across_backend_instances() {
        let dir = TempDir::new().unwrap();
        {
            let backend = FileBackend::new(dir.path(), None).unwrap();
            backend.set("k", json!({"v": 1}), None).await;
        }
        let backend = FileBackend::new(dir.path(), None).unwrap();
        assert_eq!(backend.get("k").await, Some(json!({"v": 1})));
    }

    #[tokio::test]
    async fn ttl_is_honored_on_read() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path(), None).unwrap();
        backend.set("k", json!(1), Some(Duration::from_secs(1))).await;
        assert_eq!(backend.get("k").await, Some(json!(1)));

        // Rewrite the entry with a creation time far in the past.
        let path = backend.entry_path("k");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[8..16].copy_from_slice(&0u64.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(backend.get("k").await, None);
        assert!(!path.exists(), "expired entry should be lazily deleted");
    }

    #[tokio::test]
    async fn corrupted_entries_are_removed() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path(), None).unwrap();
        backend.set("k", json!(1), None).await;

        let path = backend.entry_path("k");
        std::fs::write(&path, b"garbage").unwrap();
        assert_eq!(backend.get("k").await, None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn clear_removes_only_cache_entries() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path(), None).unwrap();
        backend.set("a", json!(1), None).await;
        backend.set("b", json!(2), None).await;
        std::fs::write(dir.path().join("unrelated.txt"), b"keep me").unwrap();

        backend.clear().await;
        assert_eq!(backend.stats().await.entries, 0);
        assert!(dir.path().join("unrelated.txt").exists());
    }
}
