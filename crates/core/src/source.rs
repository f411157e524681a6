//! The uniform contract every configuration origin implements.
//!
//! A source is anything that can produce a mapping: a file on disk, the
//! process environment, a remote endpoint, a secret store. The contract
//! is deliberately total — `load` returns an empty mapping on any
//! failure and the failure detail lands on the source's metadata, so a
//! single broken source can never take down composition.

use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Stable identity of a source's current content, used to derive cache
/// keys. Rotating the fingerprint invalidates prior cache entries for
/// the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    /// File modification time rendered as a string.
    Mtime(String),
    /// SHA-256 over the canonical form of the loaded mapping.
    ContentHash(String),
    /// The source could not produce a stable identity.
    Unknown,
}

impl Fingerprint {
    pub fn token(&self) -> String {
        match self {
            Fingerprint::Mtime(t) => format!("mtime-{t}"),
            Fingerprint::ContentHash(h) => format!("hash-{h}"),
            Fingerprint::Unknown => "unknown".to_string(),
        }
    }
}

/// Cache key for a source load: `{kind}:{origin}:{fingerprint}`.
pub fn source_cache_key(kind: &str, origin: &str, fingerprint: &Fingerprint) -> String {
    format!("{kind}:{origin}:{}", fingerprint.token())
}

/// Best-effort mtime of a file as a fingerprint token.
pub fn mtime_fingerprint(path: &Path) -> Fingerprint {
    let modified = std::fs::metadata(path).and_then(|m| m.modified());
    match modified {
        Ok(mtime) => match mtime.duration_since(std::time::UNIX_EPOCH) {
            Ok(since) => Fingerprint::Mtime(format!("{}.{:09}", since.as_secs(), since.subsec_nanos())),
            Err(_) => Fingerprint::Unknown,
        },
        Err(_) => Fingerprint::Unknown,
    }
}

/// Observable load statistics for a single source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMetadata {
    pub kind: String,
    pub origin: String,
    pub load_count: u64,
    pub error_count: u64,
    pub last_loaded: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub file_size: Option<u64>,
    pub last_fingerprint: Option<String>,
}

impl SourceMetadata {
    pub fn new(kind: &str, origin: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            origin: origin.into(),
            load_count: 0,
            error_count: 0,
            last_loaded: None,
            last_error: None,
            file_size: None,
            last_fingerprint: None,
        }
    }
}

/// Shared, thread-safe handle to a source's metadata.
///
/// Sources keep one of these internally and mutate it on load
/// completion; the composer takes snapshots for `stats()`.
#[derive(Debug, Clone)]
pub struct MetadataHandle {
    inner: Arc<RwLock<SourceMetadata>>,
}

impl MetadataHandle {
    pub fn new(kind: &str, origin: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SourceMetadata::new(kind, origin))),
        }
    }

    pub fn snapshot(&self) -> SourceMetadata {
        match self.inner.read() {
            Ok(meta) => meta.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn record_success(&self, fingerprint: Option<&Fingerprint>, size: Option<u64>) {
        if let Ok(mut meta) = self.inner.write() {
            meta.load_count += 1;
            meta.last_loaded = Some(Utc::now());
            meta.file_size = size;
            meta.last_fingerprint = fingerprint.map(Fingerprint::token);
        }
    }

    pub fn record_failure(&self, error: impl Into<String>) {
        if let Ok(mut meta) = self.inner.write() {
            meta.load_count += 1;
            meta.error_count += 1;
            meta.last_error = Some(error.into());
        }
    }
}

/// The uniform surface for any configuration origin.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Stable kind tag, e.g. `"json"`, `"environment"`, `"remote"`.
    fn kind(&self) -> &'static str;

    /// Origin identifier: a path, a URL, or a synthetic form such as
    /// `env:APP_`.
    fn origin(&self) -> String;

    /// Cheap availability probe. Must not panic; any unexpected
    /// condition reports as unavailable.
    fn is_available(&self) -> bool;

    /// Produce the source's mapping. Total: parse, I/O and decode
    /// failures are logged, recorded on metadata, and surface as an
    /// empty mapping.
    async fn load(&self) -> Map<String, Value>;

    /// Identity of the current content for cache-key derivation. For
    /// dynamic sources this may load and hash lazily.
    async fn fingerprint(&self) -> Fingerprint;

    /// Snapshot of the source's load statistics.
    fn metadata(&self) -> SourceMetadata;
}

/// Reject non-mapping roots, recording a diagnostic on the way out.
///
/// Shared by every structured-text source: a root that parses but is
/// not an object contributes nothing to composition.
pub fn require_mapping_root(
    value: Value,
    handle: &MetadataHandle,
    origin: &str,
) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        other => {
            let kind = match other {
                Value::Array(_) => "sequence",
                Value::String(_) => "string",
                Value::Number(_) => "number",
                Value::Bool(_) => "boolean",
                Value::Null => "null",
                Value::Object(_) => unreachable!(),
            };
            tracing::error!(origin, root_kind = kind, "config root must be a mapping");
            handle.record_failure(format!("root must be a mapping, got {kind}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_key_embeds_kind_origin_and_fingerprint() {
        let key = source_cache_key(
            "json",
            "/etc/app.json",
            &Fingerprint::Mtime("12345.000000000".into()),
        );
        assert_eq!(key, "json:/etc/app.json:mtime-12345.000000000");
    }

    #[test]
    fn metadata_records_successes_and_failures() {
        let handle = MetadataHandle::new("json", "/tmp/a.json");
        handle.record_success(Some(&Fingerprint::ContentHash("abc".into())), Some(10));
        handle.record_failure("boom");

        let meta = handle.snapshot();
        assert_eq!(meta.load_count, 2);
        assert_eq!(meta.error_count, 1);
        assert_eq!(meta.last_error.as_deref(), Some("boom"));
        assert_eq!(meta.last_fingerprint.as_deref(), Some("hash-abc"));
        assert!(meta.last_loaded.is_some());
    }

    #[test]
    fn non_mapping_root_is_rejected_with_diagnostic() {
        let handle = MetadataHandle::new("yaml", "x.yaml");
        assert!(require_mapping_root(json!([1, 2]), &handle, "x.yaml").is_none());
        let meta = handle.snapshot();
        assert_eq!(meta.error_count, 1);
        assert!(meta.last_error.unwrap().contains("sequence"));

        let handle = MetadataHandle::new("yaml", "y.yaml");
        let map = require_mapping_root(json!({"a": 1}), &handle, "y.yaml").unwrap();
        assert_eq!(map.get("a"), Some(&json!(1)));
    }

    #[test]
    fn missing_file_yields_unknown_fingerprint() {
        assert_eq!(
            mtime_fingerprint(Path::new("/definitely/not/here")),
            Fingerprint::Unknown
        );
    }
}
