//! The composer: owns the ordered source stack, the current immutable
//! tree, the cache, the optional schema, and the reload machinery.
//!
//! Readers share the tree through an `Arc` swapped under a short write
//! lock; traversal happens entirely outside the lock, so a reload can
//! never expose a partially merged tree.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use strata_cache::{CacheManager, CacheManagerStats, NullBackend};
use strata_core::{
    as_bool_lenient, as_float_lenient, as_int_lenient, as_list_lenient, deep_merge, get_path,
    merge_all, source_cache_key, ConfigSource, Fingerprint, SecretStore, SecretValue,
    SourceMetadata,
};
use strata_errors::{StrataError, StrataResult};
use strata_sources::{IniSource, JsonSource, TomlSource, YamlSource};
use strata_validation::{
    Diagnostic, Schema, ValidationContext, ValidationLevel, ValidationOutcome,
};

use crate::profiles::{profile_source_path, ProfileManager};
use crate::secrets::mask_sensitive;
use crate::watcher::{self, WatcherHandle};

/// Source kinds whose fingerprint is a file mtime; these drive the
/// automatic reload modes.
pub(crate) const FILE_SOURCE_KINDS: &[&str] = &["json", "yaml", "toml", "ini"];

/// How the composer notices source changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStrategy {
    /// Only explicit `reload()` calls.
    Manual,
    /// File-system notifications with the given debounce window.
    Watch { debounce: Duration },
    /// Fingerprint polling at the given interval.
    Poll { interval: Duration },
}

impl Default for ReloadStrategy {
    fn default() -> Self {
        ReloadStrategy::Manual
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ManagerState {
    Empty,
    Configured,
    Loaded,
    Reloading,
    Disposed,
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ManagerState::Empty => "empty",
            ManagerState::Configured => "configured",
            ManagerState::Loaded => "loaded",
            ManagerState::Reloading => "reloading",
            ManagerState::Disposed => "disposed",
        };
        f.write_str(label)
    }
}

/// Handle returned by [`ConfigManager::on_reload`], used to
/// de-register the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackId(u64);

type ReloadCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Counters surfaced by [`ConfigManager::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub state: String,
    pub tree_version: u64,
    pub reload_count: u64,
    pub callback_panics: u64,
    pub last_reload_ms: Option<u64>,
    pub last_validation_ms: Option<u64>,
    pub active_profile: String,
    pub sources: Vec<SourceMetadata>,
    pub cache: CacheManagerStats,
}

struct Inner {
    sources: RwLock<Vec<Arc<dyn ConfigSource>>>,
    tree: RwLock<Arc<Value>>,
    tree_version: AtomicU64,
    state: StdRwLock<ManagerState>,
    cache: CacheManager,
    schema: StdRwLock<Option<Schema>>,
    validation_level: ValidationLevel,
    validation_cache: RwLock<Option<(u64, Arc<ValidationOutcome>)>>,
    last_validation: StdRwLock<Option<Duration>>,
    callbacks: StdRwLock<Vec<(u64, ReloadCallback)>>,
    next_callback_id: AtomicU64,
    callback_panics: AtomicU64,
    profiles: StdRwLock<ProfileManager>,
    secret_store: Option<Arc<dyn SecretStore>>,
    reload_count: AtomicU64,
    last_reload: StdRwLock<Option<Duration>>,
    // Serializes the write surface (add/remove/reload) and the
    // callbacks that follow a swap, which gives the per-swap callback
    // ordering guarantee.
    write_lock: Mutex<()>,
    watcher: StdMutex<Option<WatcherHandle>>,
}

/// Layered configuration composer.
///
/// Cloning is cheap and shares all state; every clone observes the
/// same tree and the same source stack.
#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<Inner>,
}

impl ConfigManager {
    pub fn builder() -> ConfigManagerBuilder {
        ConfigManagerBuilder::new()
    }

    /// An empty manual-reload manager with an in-memory cache.
    pub fn new() -> Self {
        Self::from_parts(
            CacheManager::in_memory(256, None),
            None,
            ValidationLevel::default(),
            ProfileManager::new(),
            None,
        )
    }

    fn from_parts(
        cache: CacheManager,
        schema: Option<Schema>,
        validation_level: ValidationLevel,
        profiles: ProfileManager,
        secret_store: Option<Arc<dyn SecretStore>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sources: RwLock::new(Vec::new()),
                tree: RwLock::new(Arc::new(Value::Object(Map::new()))),
                tree_version: AtomicU64::new(0),
                state: StdRwLock::new(ManagerState::Empty),
                cache,
                schema: StdRwLock::new(schema),
                validation_level,
                validation_cache: RwLock::new(None),
                last_validation: StdRwLock::new(None),
                callbacks: StdRwLock::new(Vec::new()),
                next_callback_id: AtomicU64::new(1),
                callback_panics: AtomicU64::new(0),
                profiles: StdRwLock::new(profiles),
                secret_store,
                reload_count: AtomicU64::new(0),
                last_reload: StdRwLock::new(None),
                write_lock: Mutex::new(()),
                watcher: StdMutex::new(None),
            }),
        }
    }

    // ---- state ----

    pub fn state(&self) -> ManagerState {
        match self.inner.state.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, new: ManagerState) {
        if let Ok(mut state) = self.inner.state.write() {
            // Disposal is terminal.
            if *state != ManagerState::Disposed {
                *state = new;
            }
        }
    }

    fn ensure_live(&self) -> StrataResult<()> {
        if self.state() == ManagerState::Disposed {
            Err(StrataError::Disposed)
        } else {
            Ok(())
        }
    }

    // ---- source stack ----

    /// Append a source; it becomes the highest-precedence layer. The
    /// new source is loaded and merged over the current tree without
    /// re-loading the others.
    pub async fn add_source(&self, source: Arc<dyn ConfigSource>) -> StrataResult<()> {
        self.ensure_live()?;
        let _guard = self.inner.write_lock.lock().await;
        if self.state() == ManagerState::Empty {
            self.set_state(ManagerState::Configured);
        }
        info!(kind = source.kind(), origin = %source.origin(), "adding configuration source");
        self.inner.sources.write().await.push(source.clone());
        *self.inner.validation_cache.write().await = None;

        let layer = self.load_source_via_cache(&source).await;
        let current = self.snapshot().await;
        let merged = deep_merge((*current).clone(), Value::Object(layer));
        self.swap_if_changed(merged).await;
        self.set_state(ManagerState::Loaded);
        Ok(())
    }

    /// Remove the first source whose origin matches; the tree is
    /// rebuilt from the remaining sources.
    pub async fn remove_source(&self, origin: &str) -> StrataResult<bool> {
        self.ensure_live()?;
        let _guard = self.inner.write_lock.lock().await;
        let removed = {
            let mut sources = self.inner.sources.write().await;
            let before = sources.len();
            sources.retain({
                let mut dropped = false;
                move |s| {
                    if !dropped && s.origin() == origin {
                        dropped = true;
                        false
                    } else {
                        true
                    }
                }
            });
            before != sources.len()
        };
        if removed {
            info!(origin, "removed configuration source");
            self.rebuild_and_swap().await?;
        }
        Ok(removed)
    }

    pub async fn source_count(&self) -> usize {
        self.inner.sources.read().await.len()
    }

    // ---- loading & reload ----

    async fn load_source_via_cache(&self, source: &Arc<dyn ConfigSource>) -> Map<String, Value> {
        let fingerprint = source.fingerprint().await;
        if fingerprint == Fingerprint::Unknown {
            return source.load().await;
        }
        let key = source_cache_key(source.kind(), &source.origin(), &fingerprint);
        if let Some(Value::Object(map)) = self.inner.cache.get(&key).await {
            debug!(origin = %source.origin(), "source load served from cache");
            return map;
        }
        let map = source.load().await;
        self.inner
            .cache
            .set_tagged(&key, Value::Object(map.clone()), None, &[source.kind()])
            .await;
        map
    }

    /// Re-load every source through the cache and atomically swap the
    /// composed tree when it differs from the current one. Reload
    /// callbacks fire after the swap becomes visible.
    pub async fn reload(&self) -> StrataResult<()> {
        self.ensure_live()?;
        let _guard = self.inner.write_lock.lock().await;
        self.rebuild_and_swap().await
    }

    /// The reload body; callers must hold `write_lock`.
    async fn rebuild_and_swap(&self) -> StrataResult<()> {
        let started = Instant::now();
        self.set_state(ManagerState::Reloading);

        let sources = self.inner.sources.read().await.clone();
        let mut layers = Vec::with_capacity(sources.len());
        for source in &sources {
            layers.push(self.load_source_via_cache(source).await);
        }
        let merged = merge_all(layers);

        let swapped = self.swap_if_changed(merged).await;
        self.inner.reload_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.inner.last_reload.write() {
            *last = Some(started.elapsed());
        }
        self.set_state(ManagerState::Loaded);
        debug!(swapped, sources = sources.len(), "reload complete");
        Ok(())
    }

    /// Swap in a new tree if it structurally differs. Returns whether
    /// a swap happened; callbacks fire on every swap.
    async fn swap_if_changed(&self, new_tree: Value) -> bool {
        {
            let current = self.inner.tree.read().await;
            if **current == new_tree {
                return false;
            }
        }
        let shared = Arc::new(new_tree);
        {
            let mut tree = self.inner.tree.write().await;
            *tree = shared.clone();
        }
        self.inner.tree_version.fetch_add(1, Ordering::SeqCst);
        *self.inner.validation_cache.write().await = None;
        self.fire_callbacks(&shared);
        true
    }

    fn fire_callbacks(&self, tree: &Arc<Value>) {
        let callbacks: Vec<(u64, ReloadCallback)> = match self.inner.callbacks.read() {
            Ok(callbacks) => callbacks.clone(),
            Err(_) => return,
        };
        for (id, callback) in callbacks {
            let result = catch_unwind(AssertUnwindSafe(|| callback(tree)));
            if result.is_err() {
                self.inner.callback_panics.fetch_add(1, Ordering::SeqCst);
                error!(callback = id, "reload callback panicked");
            }
        }
    }

    /// Register a reload callback; callbacks run in registration order
    /// on the worker that performed the swap, so they should be small.
    pub fn on_reload<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.inner.next_callback_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut callbacks) = self.inner.callbacks.write() {
            callbacks.push((id, Arc::new(callback)));
        }
        CallbackId(id)
    }

    pub fn off_reload(&self, id: CallbackId) -> bool {
        if let Ok(mut callbacks) = self.inner.callbacks.write() {
            let before = callbacks.len();
            callbacks.retain(|(cb_id, _)| *cb_id != id.0);
            before != callbacks.len()
        } else {
            false
        }
    }

    // ---- read surface ----

    /// Shared handle to the current immutable tree.
    pub async fn snapshot(&self) -> Arc<Value> {
        self.inner.tree.read().await.clone()
    }

    /// The current tree with sensitive keys redacted; always a copy.
    pub async fn masked_snapshot(&self) -> Value {
        mask_sensitive(self.snapshot().await.as_ref())
    }

    pub fn tree_version(&self) -> u64 {
        self.inner.tree_version.load(Ordering::SeqCst)
    }

    pub async fn get(&self, path: &str) -> Option<Value> {
        let tree = self.snapshot().await;
        get_path(&tree, path).cloned()
    }

    pub async fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).await.unwrap_or(default)
    }

    pub async fn get_int(&self, path: &str, default: i64) -> i64 {
        match self.get(path).await {
            Some(value) => as_int_lenient(&value).unwrap_or(default),
            None => default,
        }
    }

    pub async fn get_float(&self, path: &str, default: f64) -> f64 {
        match self.get(path).await {
            Some(value) => as_float_lenient(&value).unwrap_or(default),
            None => default,
        }
    }

    pub async fn get_bool(&self, path: &str, default: bool) -> bool {
        match self.get(path).await {
            Some(value) => as_bool_lenient(&value).unwrap_or(default),
            None => default,
        }
    }

    pub async fn get_list(&self, path: &str, default: Vec<Value>) -> Vec<Value> {
        match self.get(path).await {
            Some(value) => as_list_lenient(&value).unwrap_or(default),
            None => default,
        }
    }

    pub async fn get_string(&self, path: &str, default: &str) -> String {
        match self.get(path).await {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    /// Deserialize the value at `path` into a typed struct.
    pub async fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        let value = self.get(path).await?;
        serde_json::from_value(value).ok()
    }

    /// Clone of the subtree under `prefix`.
    pub async fn subtree(&self, prefix: &str) -> Option<Value> {
        self.get(prefix).await
    }

    // ---- validation ----

    /// Bind (or replace) the schema; the cached validation result is
    /// dropped.
    pub async fn bind_schema(&self, schema: Schema) {
        if let Ok(mut slot) = self.inner.schema.write() {
            *slot = Some(schema);
        }
        *self.inner.validation_cache.write().await = None;
    }

    /// Validate the current tree against the bound schema.
    ///
    /// The result is cached per tree version; a swap during validation
    /// means the result is still returned to the caller but not
    /// cached.
    pub async fn validate(&self) -> Arc<ValidationOutcome> {
        let version = self.tree_version();
        if let Some((cached_version, outcome)) = &*self.inner.validation_cache.read().await {
            if *cached_version == version {
                return outcome.clone();
            }
        }

        let schema = match self.inner.schema.read() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        let tree = self.snapshot().await;
        let started = Instant::now();
        let outcome = match schema {
            Some(schema) => {
                let ctx = ValidationContext::root(self.inner.validation_level);
                match tree.as_ref() {
                    Value::Object(map) => schema.validate_map(map, &ctx),
                    other => ValidationOutcome::fail(
                        other.clone(),
                        Diagnostic::error("type", "configuration root must be a mapping", ""),
                    ),
                }
            }
            None => ValidationOutcome::ok((*tree).clone()),
        };
        if let Ok(mut last) = self.inner.last_validation.write() {
            *last = Some(started.elapsed());
        }

        let outcome = Arc::new(outcome);
        if self.tree_version() == version {
            *self.inner.validation_cache.write().await = Some((version, outcome.clone()));
        }
        outcome
    }

    pub async fn is_valid(&self) -> bool {
        self.validate().await.is_ok()
    }

    pub async fn errors(&self) -> Vec<Diagnostic> {
        self.validate()
            .await
            .errors()
            .into_iter()
            .cloned()
            .collect()
    }

    // ---- profiles ----

    /// Run a closure against the profile registry.
    pub fn with_profiles<R>(&self, f: impl FnOnce(&mut ProfileManager) -> R) -> R {
        let mut profiles = match self.inner.profiles.write() {
            Ok(profiles) => profiles,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut profiles)
    }

    pub fn set_active_profile(&self, name: &str) -> StrataResult<()> {
        self.with_profiles(|p| p.set_active(name))
    }

    pub fn active_profile(&self) -> String {
        self.with_profiles(|p| p.active_name())
    }

    pub fn profile_var(&self, key: &str) -> Option<Value> {
        self.with_profiles(|p| p.var(key, None))
    }

    /// Add every existing `dir/<profile>.<ext>` file for the active
    /// profile as a source, in extension order. Returns how many were
    /// added.
    pub async fn add_profile_sources(&self, dir: impl AsRef<Path>) -> StrataResult<usize> {
        let profile = self.active_profile();
        let mut added = 0usize;
        for ext in ["json", "yaml", "yml", "toml", "ini"] {
            let path = profile_source_path(dir.as_ref(), &profile, ext);
            if !path.is_file() {
                continue;
            }
            let source: Arc<dyn ConfigSource> = match ext {
                "json" => Arc::new(JsonSource::new(&path)),
                "yaml" | "yml" => Arc::new(YamlSource::new(&path)),
                "toml" => Arc::new(TomlSource::new(&path)),
                _ => Arc::new(IniSource::new(&path)),
            };
            self.add_source(source).await?;
            added += 1;
        }
        Ok(added)
    }

    // ---- secrets ----

    /// Look up a secret through the configured accessor. A missing
    /// accessor, a missing secret, and a panicking back-end all read
    /// as `None`.
    pub fn get_secret(&self, name: &str) -> Option<SecretValue> {
        let store = self.inner.secret_store.as_ref()?;
        match catch_unwind(AssertUnwindSafe(|| store.get(name))) {
            Ok(secret) => secret,
            Err(_) => {
                warn!(secret = name, "secret store panicked, treating as not found");
                None
            }
        }
    }

    // ---- diagnostics ----

    pub async fn stats(&self) -> ManagerStats {
        let sources = self.inner.sources.read().await;
        let source_meta: Vec<SourceMetadata> = sources.iter().map(|s| s.metadata()).collect();
        drop(sources);

        let last_reload_ms = match self.inner.last_reload.read() {
            Ok(last) => (*last).map(|d| d.as_millis() as u64),
            Err(_) => None,
        };
        let last_validation_ms = match self.inner.last_validation.read() {
            Ok(last) => (*last).map(|d| d.as_millis() as u64),
            Err(_) => None,
        };

        ManagerStats {
            state: self.state().to_string(),
            tree_version: self.tree_version(),
            reload_count: self.inner.reload_count.load(Ordering::SeqCst),
            callback_panics: self.inner.callback_panics.load(Ordering::SeqCst),
            last_reload_ms,
            last_validation_ms,
            active_profile: self.active_profile(),
            sources: source_meta,
            cache: self.inner.cache.stats().await,
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.inner.cache
    }

    // ---- lifecycle ----

    pub(crate) fn install_watcher(&self, handle: WatcherHandle) {
        if let Ok(mut slot) = self.inner.watcher.lock() {
            *slot = Some(handle);
        }
    }

    /// Stop watchers, release the cache, and refuse further work.
    pub async fn dispose(&self) {
        self.set_state(ManagerState::Disposed);
        let watcher = match self.inner.watcher.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(watcher) = watcher {
            watcher.stop();
        }
        self.inner.cache.clear().await;
        info!("configuration manager disposed");
    }

    // ---- watcher support ----

    /// Directories containing file-backed sources, for the notify
    /// watcher.
    pub(crate) async fn watched_directories(&self) -> Vec<PathBuf> {
        let sources = self.inner.sources.read().await;
        let mut dirs = Vec::new();
        for source in sources.iter() {
            if !FILE_SOURCE_KINDS.contains(&source.kind()) {
                continue;
            }
            let origin = source.origin();
            let path = PathBuf::from(origin.split('#').next().unwrap_or_default());
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }

    /// Current fingerprints of the file-backed sources, for polling.
    pub(crate) async fn file_fingerprints(&self) -> Vec<(String, Fingerprint)> {
        let sources = self.inner.sources.read().await.clone();
        let mut fingerprints = Vec::new();
        for source in sources {
            if FILE_SOURCE_KINDS.contains(&source.kind()) {
                fingerprints.push((source.origin(), source.fingerprint().await));
            }
        }
        fingerprints
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent construction for [`ConfigManager`].
pub struct ConfigManagerBuilder {
    sources: Vec<Arc<dyn ConfigSource>>,
    cache: Option<CacheManager>,
    cache_disabled: bool,
    schema: Option<Schema>,
    validation_level: ValidationLevel,
    profiles: ProfileManager,
    secret_store: Option<Arc<dyn SecretStore>>,
    reload_strategy: ReloadStrategy,
}

impl ConfigManagerBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            cache: None,
            cache_disabled: false,
            schema: None,
            validation_level: ValidationLevel::default(),
            profiles: ProfileManager::new(),
            secret_store: None,
            reload_strategy: ReloadStrategy::default(),
        }
    }

    pub fn add_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_cache(mut self, cache: CacheManager) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_disabled = true;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_validation_level(mut self, level: ValidationLevel) -> Self {
        self.validation_level = level;
        self
    }

    pub fn with_profiles(mut self, profiles: ProfileManager) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secret_store = Some(store);
        self
    }

    pub fn with_reload_strategy(mut self, strategy: ReloadStrategy) -> Self {
        self.reload_strategy = strategy;
        self
    }

    /// Build the manager, perform the initial load, and start the
    /// reload worker when an automatic strategy was selected.
    pub async fn build(self) -> StrataResult<ConfigManager> {
        let cache = if self.cache_disabled {
            CacheManager::new(Arc::new(NullBackend), None)
        } else {
            self.cache
                .unwrap_or_else(|| CacheManager::in_memory(256, None))
        };

        let manager = ConfigManager::from_parts(
            cache,
            self.schema,
            self.validation_level,
            self.profiles,
            self.secret_store,
        );

        if !self.sources.is_empty() {
            manager.set_state(ManagerState::Configured);
            *manager.inner.sources.write().await = self.sources;
            manager.reload().await?;
        }

        if self.reload_strategy != ReloadStrategy::Manual {
            let handle = watcher::spawn(manager.clone(), self.reload_strategy);
            manager.install_watcher(handle);
        }
        Ok(manager)
    }
}

impl Default for ConfigManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
