//! Secrets access and read-time masking.
//!
//! The accessor contract itself lives in `strata_core`; this module
//! adds the display-side masking pass the composer applies before any
//! tree leaves the process in logs or diagnostics.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

pub use strata_core::{MemorySecretStore, SecretStore, SecretValue};

/// Key-name fragments treated as sensitive by default.
pub static SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "secret",
    "key",
    "token",
    "credential",
    "auth",
    "private",
    "certificate",
    "api_key",
    "apikey",
];

static DEFAULT_MASK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("(?i)({})", SENSITIVE_PATTERNS.join("|"))).expect("static mask pattern")
});

pub const MASK_PLACEHOLDER: &str = "[MASKED]";

/// The default sensitive-key matcher.
pub fn default_mask_pattern() -> &'static Regex {
    &DEFAULT_MASK_RE
}

/// Redact scalars whose key matches the default sensitive-name
/// pattern. Operates on a copy; the input tree is untouched.
pub fn mask_sensitive(tree: &Value) -> Value {
    mask_with(tree, &DEFAULT_MASK_RE)
}

/// Redact scalars whose key matches `pattern`.
///
/// Mappings and sequences recurse; a sequence under a matching key has
/// each of its scalar items masked. Non-matching scalars pass through
/// untouched.
pub fn mask_with(tree: &Value, pattern: &Regex) -> Value {
    match tree {
        Value::Object(map) => {
            let mut masked = Map::new();
            for (key, value) in map {
                masked.insert(key.clone(), mask_entry(key, value, pattern));
            }
            Value::Object(masked)
        }
        other => other.clone(),
    }
}

fn mask_entry(key: &str, value: &Value, pattern: &Regex) -> Value {
    match value {
        Value::Object(_) => mask_with(value, pattern),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(_) | Value::Array(_) => mask_entry(key, item, pattern),
                    scalar => {
                        if pattern.is_match(key) {
                            Value::String(MASK_PLACEHOLDER.to_string())
                        } else {
                            scalar.clone()
                        }
                    }
                })
                .collect(),
        ),
        scalar => {
            if pattern.is_match(key) {
                Value::String(MASK_PLACEHOLDER.to_string())
            } else {
                scalar.clone()
            }
        }
    }
}
