//! Core building blocks for the strata configuration resolver: the
//! value-tree helpers every layer shares, and the source protocol that
//! all concrete origins implement.

pub mod secrets;
pub mod source;
pub mod value;

pub use secrets::{MemorySecretStore, SecretStore, SecretValue};
pub use source::{
    mtime_fingerprint, require_mapping_root, source_cache_key, ConfigSource, Fingerprint,
    MetadataHandle, SourceMetadata,
};
pub use value::{
    as_bool_lenient, as_float_lenient, as_int_lenient, as_list_lenient, canonical_hash,
    deep_merge, get_path, merge_all, parse_bool_str, set_path,
};
