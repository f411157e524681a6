//! # strata
//!
//! A layered configuration resolver for long-running services.
//!
//! Configuration is composed from an ordered stack of sources — files
//! in several formats, environment variables, remote endpoints, secret
//! stores — deep-merged with last-source-wins precedence, validated
//! against a declarative schema, cached by source fingerprint, and
//! swapped atomically on reload so readers never block.
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata::{ConfigManager, EnvironmentSource, JsonSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), strata::StrataError> {
//!     let config = ConfigManager::builder()
//!         .add_source(Arc::new(JsonSource::new("config/app.json")))
//!         .add_source(Arc::new(EnvironmentSource::new("APP_")))
//!         .build()
//!         .await?;
//!
//!     let host = config.get_string("db.host", "localhost").await;
//!     let port = config.get_int("db.port", 5432).await;
//!     println!("connecting to {host}:{port}");
//!     Ok(())
//! }
//! ```

pub mod manager;
pub mod profiles;
pub mod secrets;
pub mod typed;
mod watcher;

pub use manager::{
    CallbackId, ConfigManager, ConfigManagerBuilder, ManagerState, ManagerStats, ReloadStrategy,
};
pub use typed::TypedKey;
pub use profiles::{
    canonical_profile_name, profile_source_exists, profile_source_path, ConfigProfile,
    ProfileManager, PROFILE_ENV_VARS,
};
pub use secrets::{
    default_mask_pattern, mask_sensitive, mask_with, MemorySecretStore, SecretStore, SecretValue,
    MASK_PLACEHOLDER, SENSITIVE_PATTERNS,
};

pub use strata_cache::{
    BackendStats, CacheBackend, CacheManager, CacheManagerStats, FileBackend, MemoryBackend,
    NullBackend,
};
pub use strata_core::{
    canonical_hash, deep_merge, get_path, source_cache_key, ConfigSource, Fingerprint,
    MetadataHandle, SourceMetadata,
};
pub use strata_errors::{StrataError, StrataResult};
pub use strata_sources::{
    EnvironmentSource, IniSource, JsonSource, MemorySource, RemoteSource, SecretBackedSource,
    TomlSource, YamlSource,
};
pub use strata_validation::{
    ChoicesValidator, CompositeValidator, Diagnostic, EmailValidator, LengthValidator,
    PatternValidator, RangeValidator, RequiredValidator, Schema, SchemaField, SchemaValidator,
    Severity, TypeValidator, UrlValidator, Validate, ValidationContext, ValidationLevel,
    ValidationOutcome, ValidatorRef, ValueKind,
};
