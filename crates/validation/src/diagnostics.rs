//! Validation diagnostics and the per-value outcome record.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single finding produced by a validator.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable machine-readable code, e.g. `missing`, `type`, `range`.
    pub code: String,
    pub message: String,
    /// Full dotted path of the offending value.
    pub path: String,
    /// The offending value, when it helps the reader.
    pub value: Option<Value>,
}

impl Diagnostic {
    pub fn error(code: &str, message: impl Into<String>, path: &str) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            message: message.into(),
            path: path.to_string(),
            value: None,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>, path: &str) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.to_string(),
            message: message.into(),
            path: path.to_string(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// Result of running a validator (or a whole schema) over a value:
/// the possibly-coerced value plus everything found along the way.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub value: Value,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationOutcome {
    pub fn ok(value: Value) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
        }
    }

    pub fn fail(value: Value, diagnostic: Diagnostic) -> Self {
        Self {
            value,
            diagnostics: vec![diagnostic],
        }
    }

    /// `true` iff no diagnostic carries `Severity::Error`. Warnings do
    /// not fail an outcome.
    pub fn is_ok(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }
}
