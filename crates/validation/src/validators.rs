//! Built-in validators.
//!
//! A validator is a pure function from `(value, context)` to a
//! [`ValidationOutcome`]; the outcome is its only output channel. The
//! possibly-coerced value it returns feeds the next validator in a
//! composite pipeline.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use strata_core::value as tree;
use strata_errors::{StrataError, StrataResult};

use crate::context::{ValidationContext, ValidationLevel};
use crate::diagnostics::{Diagnostic, ValidationOutcome};

pub trait Validate: Send + Sync {
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome;
}

pub type ValidatorRef = Arc<dyn Validate>;

/// The kinds a configuration value can be checked or coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Boolean,
    Mapping,
    Sequence,
}

impl ValueKind {
    pub fn label(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::Mapping => "mapping",
            ValueKind::Sequence => "sequence",
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Confirms (strict) or coerces (lenient) a value to an expected kind.
pub struct TypeValidator {
    expected: ValueKind,
}

impl TypeValidator {
    pub fn new(expected: ValueKind) -> Self {
        Self { expected }
    }

    fn matches(&self, value: &Value) -> bool {
        match self.expected {
            ValueKind::String => value.is_string(),
            ValueKind::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            ValueKind::Float => value.is_number(),
            ValueKind::Boolean => value.is_boolean(),
            ValueKind::Mapping => value.is_object(),
            ValueKind::Sequence => value.is_array(),
        }
    }

    fn coerce(&self, value: &Value) -> Option<Value> {
        match self.expected {
            ValueKind::String => match value {
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                _ => None,
            },
            ValueKind::Integer => match value {
                // Floats only narrow when no fraction would be lost.
                Value::Number(n) => n
                    .as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| Value::from(f as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
                _ => None,
            },
            ValueKind::Float => match value {
                Value::String(s) => s.trim().parse::<f64>().ok().and_then(|f| {
                    serde_json::Number::from_f64(f).map(Value::Number)
                }),
                _ => None,
            },
            ValueKind::Boolean => tree::as_bool_lenient(value).map(Value::Bool),
            ValueKind::Sequence => match value {
                Value::String(_) => tree::as_list_lenient(value).map(Value::Array),
                _ => None,
            },
            ValueKind::Mapping => None,
        }
    }
}

impl Validate for TypeValidator {
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome {
        if value.is_null() || self.matches(value) {
            return ValidationOutcome::ok(value.clone());
        }
        if ctx.level == ValidationLevel::Lenient {
            if let Some(coerced) = self.coerce(value) {
                return ValidationOutcome::ok(coerced);
            }
        }
        ValidationOutcome::fail(
            value.clone(),
            Diagnostic::error(
                "type",
                format!("expected {}, got {}", self.expected.label(), describe(value)),
                &ctx.path,
            )
            .with_value(value.clone()),
        )
    }
}

/// Fails with code `missing` when the value is null or an empty string.
pub struct RequiredValidator;

impl Validate for RequiredValidator {
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome {
        let missing = match value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        if missing {
            ValidationOutcome::fail(
                value.clone(),
                Diagnostic::error("missing", "required value is missing", &ctx.path),
            )
        } else {
            ValidationOutcome::ok(value.clone())
        }
    }
}

/// Inclusive numeric bounds.
pub struct RangeValidator {
    min: Option<f64>,
    max: Option<f64>,
}

impl RangeValidator {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }
}

impl Validate for RangeValidator {
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome {
        if value.is_null() {
            return ValidationOutcome::ok(value.clone());
        }
        let Some(number) = value.as_f64() else {
            return ValidationOutcome::fail(
                value.clone(),
                Diagnostic::error(
                    "range",
                    format!("range check requires a number, got {}", describe(value)),
                    &ctx.path,
                ),
            );
        };
        if let Some(min) = self.min {
            if number < min {
                return ValidationOutcome::fail(
                    value.clone(),
                    Diagnostic::error(
                        "range",
                        format!("value {number} is below minimum {min}"),
                        &ctx.path,
                    )
                    .with_value(value.clone()),
                );
            }
        }
        if let Some(max) = self.max {
            if number > max {
                return ValidationOutcome::fail(
                    value.clone(),
                    Diagnostic::error(
                        "range",
                        format!("value {number} is above maximum {max}"),
                        &ctx.path,
                    )
                    .with_value(value.clone()),
                );
            }
        }
        ValidationOutcome::ok(value.clone())
    }
}

/// Length bounds for strings and sequences.
pub struct LengthValidator {
    min: Option<usize>,
    max: Option<usize>,
}

impl LengthValidator {
    pub fn new(min: Option<usize>, max: Option<usize>) -> Self {
        Self { min, max }
    }
}

impl Validate for LengthValidator {
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome {
        if value.is_null() {
            return ValidationOutcome::ok(value.clone());
        }
        let length = match value {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            other => {
                return ValidationOutcome::fail(
                    value.clone(),
                    Diagnostic::error(
                        "length",
                        format!(
                            "length check requires a string or sequence, got {}",
                            describe(other)
                        ),
                        &ctx.path,
                    ),
                )
            }
        };
        if let Some(min) = self.min {
            if length < min {
                return ValidationOutcome::fail(
                    value.clone(),
                    Diagnostic::error(
                        "length",
                        format!("length {length} is below minimum {min}"),
                        &ctx.path,
                    ),
                );
            }
        }
        if let Some(max) = self.max {
            if length > max {
                return ValidationOutcome::fail(
                    value.clone(),
                    Diagnostic::error(
                        "length",
                        format!("length {length} is above maximum {max}"),
                        &ctx.path,
                    ),
                );
            }
        }
        ValidationOutcome::ok(value.clone())
    }
}

/// Value must be one of a fixed set.
pub struct ChoicesValidator {
    choices: Vec<Value>,
}

impl ChoicesValidator {
    pub fn new(choices: Vec<Value>) -> Self {
        Self { choices }
    }
}

impl Validate for ChoicesValidator {
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome {
        if value.is_null() || self.choices.contains(value) {
            return ValidationOutcome::ok(value.clone());
        }
        let rendered: Vec<String> = self.choices.iter().map(|c| c.to_string()).collect();
        ValidationOutcome::fail(
            value.clone(),
            Diagnostic::error(
                "choices",
                format!("value not in allowed choices: [{}]", rendered.join(", ")),
                &ctx.path,
            )
            .with_value(value.clone()),
        )
    }
}

/// Anchored regular-expression match on strings.
pub struct PatternValidator {
    pattern: String,
    regex: Regex,
}

impl PatternValidator {
    /// Compiles the pattern with implicit anchoring. An invalid pattern
    /// is a programmer error and surfaces synchronously.
    pub fn new(pattern: &str) -> StrataResult<Self> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| StrataError::validation(format!("invalid pattern '{pattern}': {e}")))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }
}

impl Validate for PatternValidator {
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome {
        if value.is_null() {
            return ValidationOutcome::ok(value.clone());
        }
        let Value::String(s) = value else {
            return ValidationOutcome::fail(
                value.clone(),
                Diagnostic::error(
                    "pattern",
                    format!("pattern check requires a string, got {}", describe(value)),
                    &ctx.path,
                ),
            );
        };
        if self.regex.is_match(s) {
            ValidationOutcome::ok(value.clone())
        } else {
            ValidationOutcome::fail(
                value.clone(),
                Diagnostic::error(
                    "pattern",
                    format!("value does not match pattern '{}'", self.pattern),
                    &ctx.path,
                )
                .with_value(value.clone()),
            )
        }
    }
}

/// String must parse as an absolute URL.
pub struct UrlValidator;

impl Validate for UrlValidator {
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome {
        if value.is_null() {
            return ValidationOutcome::ok(value.clone());
        }
        match value {
            Value::String(s) if url::Url::parse(s).is_ok() => ValidationOutcome::ok(value.clone()),
            _ => ValidationOutcome::fail(
                value.clone(),
                Diagnostic::error("url", "value is not a valid URL", &ctx.path)
                    .with_value(value.clone()),
            ),
        }
    }
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("static email pattern")
});

/// Convenience email-shape check.
pub struct EmailValidator;

impl Validate for EmailValidator {
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome {
        if value.is_null() {
            return ValidationOutcome::ok(value.clone());
        }
        match value {
            Value::String(s) if EMAIL_RE.is_match(s) => ValidationOutcome::ok(value.clone()),
            _ => ValidationOutcome::fail(
                value.clone(),
                Diagnostic::error("email", "value is not a valid email address", &ctx.path)
                    .with_value(value.clone()),
            ),
        }
    }
}

/// Runs validators in order, threading the coerced value through.
///
/// Short-circuits on the first error but keeps every warning gathered
/// from the validators that did run.
pub struct CompositeValidator {
    validators: Vec<ValidatorRef>,
}

impl CompositeValidator {
    pub fn new(validators: Vec<ValidatorRef>) -> Self {
        Self { validators }
    }
}

impl Validate for CompositeValidator {
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome {
        let mut current = value.clone();
        let mut diagnostics = Vec::new();
        for validator in &self.validators {
            let outcome = validator.validate(&current, ctx);
            let failed = !outcome.is_ok();
            current = outcome.value;
            diagnostics.extend(outcome.diagnostics);
            if failed {
                break;
            }
        }
        ValidationOutcome {
            value: current,
            diagnostics,
        }
    }
}

/// Adapter for ad-hoc warning-producing checks used in tests and by
/// callers that only need a closure.
pub struct FnValidator<F>
where
    F: Fn(&Value, &ValidationContext) -> ValidationOutcome + Send + Sync,
{
    f: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&Value, &ValidationContext) -> ValidationOutcome + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Validate for FnValidator<F>
where
    F: Fn(&Value, &ValidationContext) -> ValidationOutcome + Send + Sync,
{
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome {
        (self.f)(value, ctx)
    }
}
