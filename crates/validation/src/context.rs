//! Per-invocation validation context.

use chrono::{DateTime, Utc};

/// Controls whether validators may coerce values.
///
/// In `Lenient` mode a type validator turns `"42"` into `42`; in
/// `Strict` mode any kind mismatch is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    Strict,
    #[default]
    Lenient,
}

/// Immutable context threaded through a validator pipeline.
///
/// Descending into a sub-value derives a new context via [`child`];
/// contexts are never mutated in place.
///
/// [`child`]: ValidationContext::child
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Dot path from the tree root to the value under validation.
    pub path: String,
    pub level: ValidationLevel,
    /// Kind tag of the source the value came from, when known.
    pub source_hint: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ValidationContext {
    pub fn root(level: ValidationLevel) -> Self {
        Self {
            path: String::new(),
            level,
            source_hint: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_source_hint(mut self, hint: impl Into<String>) -> Self {
        self.source_hint = Some(hint.into());
        self
    }

    /// Derive the context for a child key.
    pub fn child(&self, segment: &str) -> Self {
        let path = if self.path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{segment}", self.path)
        };
        Self {
            path,
            level: self.level,
            source_hint: self.source_hint.clone(),
            started_at: self.started_at,
        }
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::root(ValidationLevel::default())
    }
}
