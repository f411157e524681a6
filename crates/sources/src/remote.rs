//! Remote HTTP(S) configuration source.
//!
//! A GET against a caller-supplied URL that must answer with a JSON
//! object. Auth is plain request headers: bearer, basic, or an
//! arbitrary API-key header. Timeouts and certificate verification are
//! per-source settings.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Value};
use strata_core::{
    canonical_hash, ConfigSource, Fingerprint, MetadataHandle, SourceMetadata,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

pub struct RemoteSource {
    url: String,
    timeout: Duration,
    headers: Vec<(String, String)>,
    verify_tls: bool,
    handle: MetadataHandle,
    // Fingerprinting a dynamic source means loading it; the body is
    // parked here so the load that follows does not refetch.
    prefetched: Mutex<Option<Map<String, Value>>>,
}

impl RemoteSource {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let handle = MetadataHandle::new("remote", url.clone());
        Self {
            url,
            timeout: Duration::from_secs(30),
            headers: Vec::new(),
            verify_tls: true,
            handle,
            prefetched: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    pub fn with_basic_auth(self, user: &str, password: &str) -> Self {
        let encoded = BASE64.encode(format!("{user}:{password}"));
        self.with_header("Authorization", format!("Basic {encoded}"))
    }

    pub fn with_api_key(self, key: &str, header_name: &str) -> Self {
        self.with_header(header_name, key)
    }

    /// Disable TLS certificate verification. Only sensible against
    /// self-signed internal endpoints.
    pub fn danger_accept_invalid_certs(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    async fn fetch(&self) -> Result<Map<String, Value>, String> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!self.verify_tls)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;

        let mut request = client.get(&self.url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| format!("request failed: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("unexpected status {status}"));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| format!("response is not valid JSON: {e}"))?;
        match value {
            Value::Object(map) => Ok(map),
            Value::Array(_) => Err("response root is an array, expected an object".to_string()),
            other => Err(format!(
                "response root must be an object, got {}",
                match other {
                    Value::String(_) => "string",
                    Value::Number(_) => "number",
                    Value::Bool(_) => "boolean",
                    _ => "null",
                }
            )),
        }
    }
}

#[async_trait]
impl ConfigSource for RemoteSource {
    fn kind(&self) -> &'static str {
        "remote"
    }

    fn origin(&self) -> String {
        self.url.clone()
    }

    fn is_available(&self) -> bool {
        Url::parse(&self.url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    async fn load(&self) -> Map<String, Value> {
        if let Some(map) = self.prefetched.lock().await.take() {
            return map;
        }
        match self.fetch().await {
            Ok(map) => {
                debug!(url = %self.url, keys = map.len(), "loaded remote source");
                let fingerprint =
                    Fingerprint::ContentHash(canonical_hash(&Value::Object(map.clone())));
                self.handle.record_success(Some(&fingerprint), None);
                map
            }
            Err(err) => {
                warn!(url = %self.url, error = %err, "remote source load failed");
                self.handle.record_failure(err);
                Map::new()
            }
        }
    }

    async fn fingerprint(&self) -> Fingerprint {
        match self.fetch().await {
            Ok(map) => {
                let hash = canonical_hash(&Value::Object(map.clone()));
                *self.prefetched.lock().await = Some(map);
                Fingerprint::ContentHash(hash)
            }
            Err(_) => Fingerprint::Unknown,
        }
    }

    fn metadata(&self) -> SourceMetadata {
        self.handle.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_is_url_well_formedness() {
        assert!(RemoteSource::new("https://config.example.com/app.json").is_available());
        assert!(RemoteSource::new("http://10.0.0.1:8500/v1/kv/app").is_available());
        assert!(!RemoteSource::new("not a url").is_available());
        assert!(!RemoteSource::new("ftp://example.com/app.json").is_available());
    }

    #[test]
    fn auth_helpers_set_headers() {
        let source = RemoteSource::new("https://example.com")
            .with_bearer_token("tok")
            .with_api_key("k", "X-API-Key");
        assert!(source
            .headers
            .contains(&("Authorization".to_string(), "Bearer tok".to_string())));
        assert!(source
            .headers
            .contains(&("X-API-Key".to_string(), "k".to_string())));

        let basic = RemoteSource::new("https://example.com").with_basic_auth("user", "pass");
        let expected = format!("Basic {}", BASE64.encode("user:pass"));
        assert!(basic
            .headers
            .contains(&("Authorization".to_string(), expected)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_empty_mapping() {
        // Port 9 (discard) on localhost: connection refused, no
        // external network involved.
        let source = RemoteSource::new("http://127.0.0.1:9/config")
            .with_timeout(Duration::from_millis(200));
        assert!(source.load().await.is_empty());

        let meta = source.metadata();
        assert_eq!(meta.error_count, 1);
        assert!(meta.last_error.is_some());
        assert_eq!(source.fingerprint().await, Fingerprint::Unknown);
    }
}
