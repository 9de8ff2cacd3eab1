//! Schema validation helpers.
//!
//! This module validates a configuration `serde_json::Value` against a [`Schema`]
//! and reports problems as diagnostics the host can show next to the
//! offending attribute.
//!
//! # Example
//!
//! ```
//! use overseerr_provider::schema::{Schema, Attribute};
//! use overseerr_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("application_title", Attribute::required_string())
//!     .with_attribute("trust_proxy", Attribute::optional_computed_bool());
//!
//! let diagnostics = validate(&schema, &json!({"application_title": "overseerr"}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"application_title": "overseerr", "trust_proxy": "yes"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("trust_proxy".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};
use serde_json::Value;

/// Validate a configuration value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - The configuration must be an object (or null for an empty configuration)
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes must not be configured
/// - Attribute types must match the schema
/// - Attributes missing from the schema are rejected
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => {
            // An absent configuration block still has to supply required attributes
            for (name, attr) in sorted_attributes(schema) {
                validate_attribute(name, attr, None, &mut diagnostics);
            }
            return diagnostics;
        }
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        }
    };

    for (name, attr) in sorted_attributes(schema) {
        validate_attribute(name, attr, obj.get(name), &mut diagnostics);
    }

    let mut extra: Vec<&String> = obj
        .keys()
        .filter(|name| schema.attribute(name).is_none())
        .collect();
    extra.sort();
    for name in extra {
        diagnostics.push(
            Diagnostic::error(format!("Unsupported argument '{}'", name))
                .with_detail("An argument with this name is not expected here")
                .with_attribute(name.as_str()),
        );
    }

    diagnostics
}

/// Validate a value against a schema, returning Ok if valid or Err with diagnostics.
///
/// This is a convenience wrapper around [`validate`] that returns a Result.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a value is valid against a schema.
///
/// Use [`validate`] to get detailed error information.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn sorted_attributes(schema: &Schema) -> Vec<(&String, &Attribute)> {
    let mut attrs: Vec<_> = schema.block.attributes.iter().collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    attrs
}

fn validate_attribute(
    path: &str,
    attr: &Attribute,
    value: Option<&Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        }
        Some(_) if attr.flags.is_read_only() => {
            diagnostics.push(
                Diagnostic::error(format!(
                    "Invalid configuration for read-only attribute '{}'",
                    path
                ))
                .with_detail("This attribute is computed by the provider and cannot be set")
                .with_attribute(path),
            );
        }
        Some(v) => {
            if !type_matches(attr.attr_type, v) {
                diagnostics.push(type_error(path, attr.attr_type, v));
            }
        }
    }
}

fn type_matches(attr_type: AttributeType, value: &Value) -> bool {
    match attr_type {
        AttributeType::String => value.is_string(),
        AttributeType::Float64 => value.is_number(),
        AttributeType::Bool => value.is_boolean(),
    }
}

/// Human-readable name of a JSON value's type.
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: AttributeType, got: &Value) -> Diagnostic {
    let expected = match expected {
        AttributeType::String => "string",
        AttributeType::Float64 => "float64",
        AttributeType::Bool => "bool",
    };
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}
