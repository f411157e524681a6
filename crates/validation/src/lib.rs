//! Validation engine for strata: composable validators with a threaded
//! value-and-context pipeline, and declarative schemas that lower to a
//! single mapping validator.

mod context;
mod diagnostics;
mod schema;
mod validators;

pub use context::{ValidationContext, ValidationLevel};
pub use diagnostics::{Diagnostic, Severity, ValidationOutcome};
pub use schema::{Schema, SchemaField, SchemaValidator};
pub use validators::{
    ChoicesValidator, CompositeValidator, EmailValidator, FnValidator, LengthValidator,
    PatternValidator, RangeValidator, RequiredValidator, TypeValidator, UrlValidator, Validate,
    ValidatorRef, ValueKind,
};
