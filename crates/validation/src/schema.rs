//! Declarative schemas and their lowering to validators.
//!
//! A schema describes a mapping field by field. Lowering turns each
//! field into a composite pipeline — `required` first when the field is
//! marked required, then the kind check, then any user validators — and
//! the whole schema into a single mapping validator. Validation across
//! fields aggregates every field's diagnostics; only the pipeline
//! within one field short-circuits.

use serde_json::{Map, Value};

use crate::context::ValidationContext;
use crate::diagnostics::{Diagnostic, ValidationOutcome};
use crate::validators::{
    CompositeValidator, RequiredValidator, TypeValidator, Validate, ValidatorRef, ValueKind,
};
use std::sync::Arc;

/// A single declared key: expected kind, requiredness, default and any
/// extra validators, applied in that order.
#[derive(Clone)]
pub struct SchemaField {
    kind: Option<ValueKind>,
    required: bool,
    default: Option<Value>,
    validators: Vec<ValidatorRef>,
}

impl SchemaField {
    fn new(kind: Option<ValueKind>) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            validators: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::new(Some(ValueKind::String))
    }

    pub fn integer() -> Self {
        Self::new(Some(ValueKind::Integer))
    }

    pub fn float() -> Self {
        Self::new(Some(ValueKind::Float))
    }

    pub fn boolean() -> Self {
        Self::new(Some(ValueKind::Boolean))
    }

    pub fn list() -> Self {
        Self::new(Some(ValueKind::Sequence))
    }

    pub fn mapping() -> Self {
        Self::new(Some(ValueKind::Mapping))
    }

    /// A field that accepts any kind.
    pub fn any() -> Self {
        Self::new(None)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with(mut self, validator: ValidatorRef) -> Self {
        self.validators.push(validator);
        self
    }

    fn pipeline(&self) -> CompositeValidator {
        let mut stages: Vec<ValidatorRef> = Vec::new();
        if self.required {
            stages.push(Arc::new(RequiredValidator));
        }
        if let Some(kind) = self.kind {
            stages.push(Arc::new(TypeValidator::new(kind)));
        }
        stages.extend(self.validators.iter().cloned());
        CompositeValidator::new(stages)
    }
}

#[derive(Clone)]
enum SchemaNode {
    Field(SchemaField),
    Nested(Schema),
}

/// Declarative description of a mapping.
#[derive(Clone, Default)]
pub struct Schema {
    fields: Vec<(String, SchemaNode)>,
    strict_keys: bool,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject keys that are not declared in the schema.
    pub fn strict_keys(mut self) -> Self {
        self.strict_keys = true;
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: SchemaField) -> Self {
        self.fields.push((name.into(), SchemaNode::Field(field)));
        self
    }

    pub fn nested(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.fields.push((name.into(), SchemaNode::Nested(schema)));
        self
    }

    /// Validate a mapping. Diagnostics from every field are collected;
    /// the returned value is the input with defaults populated and
    /// coercions applied, unknown keys preserved.
    pub fn validate_map(
        &self,
        config: &Map<String, Value>,
        ctx: &ValidationContext,
    ) -> ValidationOutcome {
        let mut output = config.clone();
        let mut diagnostics = Vec::new();

        for (name, node) in &self.fields {
            let child_ctx = ctx.child(name);
            match node {
                SchemaNode::Field(field) => {
                    let present = config.contains_key(name.as_str());
                    let mut raw = config.get(name.as_str()).cloned().unwrap_or(Value::Null);
                    if raw.is_null() {
                        if let Some(default) = &field.default {
                            raw = default.clone();
                        }
                    }
                    let outcome = field.pipeline().validate(&raw, &child_ctx);
                    diagnostics.extend(outcome.diagnostics);
                    if present || !outcome.value.is_null() {
                        output.insert(name.clone(), outcome.value);
                    }
                }
                SchemaNode::Nested(schema) => {
                    let raw = config.get(name.as_str()).cloned().unwrap_or(Value::Null);
                    match raw {
                        Value::Object(map) => {
                            let outcome = schema.validate_map(&map, &child_ctx);
                            diagnostics.extend(outcome.diagnostics);
                            output.insert(name.clone(), outcome.value);
                        }
                        Value::Null => {
                            let outcome = schema.validate_map(&Map::new(), &child_ctx);
                            diagnostics.extend(outcome.diagnostics);
                            output.insert(name.clone(), outcome.value);
                        }
                        other => {
                            diagnostics.push(
                                Diagnostic::error(
                                    "type",
                                    "expected mapping for nested schema",
                                    &child_ctx.path,
                                )
                                .with_value(other),
                            );
                        }
                    }
                }
            }
        }

        if self.strict_keys {
            let declared: Vec<&str> = self.fields.iter().map(|(n, _)| n.as_str()).collect();
            for key in config.keys() {
                if !declared.contains(&key.as_str()) {
                    diagnostics.push(Diagnostic::error(
                        "unknown-key",
                        format!("key '{key}' is not declared in the schema"),
                        &ctx.child(key).path,
                    ));
                }
            }
        }

        ValidationOutcome {
            value: Value::Object(output),
            diagnostics,
        }
    }

    /// Lower the schema into a single validator over a mapping value.
    pub fn into_validator(self) -> SchemaValidator {
        SchemaValidator { schema: self }
    }
}

/// The compiled form of a [`Schema`].
pub struct SchemaValidator {
    schema: Schema,
}

impl Validate for SchemaValidator {
    fn validate(&self, value: &Value, ctx: &ValidationContext) -> ValidationOutcome {
        match value {
            Value::Object(map) => self.schema.validate_map(map, ctx),
            other => ValidationOutcome::fail(
                other.clone(),
                Diagnostic::error("type", "schema validation requires a mapping", &ctx.path),
            ),
        }
    }
}
