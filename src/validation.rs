//! Schema validation helpers.
//!
//! Configuration arrives as a `serde_json::Value` and is checked against a
//! [`Schema`] once, at the boundary, before it is deserialized into a typed
//! model.
//!
//! # Example
//!
//! ```
//! use minecraft_provider::schema::{Schema, Attribute};
//! use minecraft_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("schema_path", Attribute::required_string())
//!     .with_attribute("x", Attribute::required_int64());
//!
//! let diagnostics = validate(&schema, &json!({"schema_path": "castle.schem", "x": 10}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"schema_path": "castle.schem", "x": "ten"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("x".to_string()));
//! ```

use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (the provider sets these)
/// - Attribute types must match the schema
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let Some(obj) = root_object(value, &mut diagnostics) else {
        return diagnostics;
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(name, attr, obj.get(name), &mut diagnostics);
    }
    diagnostics
}

/// Validate user configuration against a schema.
///
/// Applies the rules of [`validate`], and additionally rejects values for
/// computed-only attributes and attributes the schema does not declare.
pub fn validate_config(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = validate(schema, value);
    let Some(obj) = value.as_object() else {
        return diagnostics;
    };

    for (name, val) in obj {
        match schema.attribute(name) {
            Some(attr) if attr.flags.is_computed_only() && !val.is_null() => {
                diagnostics.push(
                    Diagnostic::error(format!("Attribute '{}' cannot be configured", name))
                        .with_detail("This attribute is computed by the provider")
                        .with_attribute(name),
                );
            }
            Some(_) => {}
            None => {
                diagnostics.push(
                    Diagnostic::error(format!("Unsupported attribute '{}'", name))
                        .with_detail("The schema does not declare this attribute")
                        .with_attribute(name),
                );
            }
        }
    }
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

/// Turn error diagnostics into a single [`ProviderError::Validation`].
pub fn ensure_valid(diagnostics: Vec<Diagnostic>) -> Result<(), ProviderError> {
    let errors: Vec<String> = diagnostics
        .into_iter()
        .filter(Diagnostic::is_error)
        .map(|d| match d.detail {
            Some(detail) => format!("{}: {}", d.summary, detail),
            None => d.summary,
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::Validation(errors.join("; ")))
    }
}

fn root_object<'a>(
    value: &'a Value,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<&'a serde_json::Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        // An absent configuration has nothing to check beyond required attributes
        Value::Null => None,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            None
        }
    }
}

fn validate_attribute(
    name: &str,
    attr: &Attribute,
    value: Option<&Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", name))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(name),
                );
            }
        }
        Some(v) => {
            let matches = match attr.attr_type {
                AttributeType::String => v.is_string(),
                AttributeType::Int64 => v.as_i64().is_some(),
            };
            if !matches {
                diagnostics.push(type_error(name, attr.attr_type, v));
            }
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
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
        AttributeType::Int64 => "int64",
    };
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Schema};
    use serde_json::json;

    fn placement_schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("schema_path", Attribute::required_string())
            .with_attribute("schema_hash", Attribute::computed_string())
            .with_attribute("x", Attribute::required_int64())
    }

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "test"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        assert_eq!(validate(&schema, &json!({"name": null})).len(), 1);

        let diagnostics = validate(&schema, &json!({"name": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_optional_attribute() {
        let schema = Schema::v0().with_attribute("base_dir", Attribute::optional_string());

        assert!(validate(&schema, &json!({"base_dir": "/srv"})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"base_dir": null})).is_empty());
        assert_eq!(validate(&schema, &json!({"base_dir": false})).len(), 1);
    }

    #[test]
    fn test_validate_int64_rejects_fractions() {
        let schema = Schema::v0().with_attribute("x", Attribute::required_int64());

        assert!(validate(&schema, &json!({"x": -64})).is_empty());
        assert_eq!(validate(&schema, &json!({"x": 1.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"x": "10"})).len(), 1);
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = placement_schema();
        let state = json!({"id": "p-1", "schema_path": "a.schem", "schema_hash": "abc", "x": 1});
        assert!(validate(&schema, &state).is_empty());
    }

    #[test]
    fn test_validate_config_rejects_computed_values() {
        let schema = placement_schema();
        let config = json!({"schema_path": "a.schem", "schema_hash": "forged", "x": 1});

        let diagnostics = validate_config(&schema, &config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("schema_hash".to_string()));

        let config = json!({"schema_path": "a.schem", "schema_hash": null, "x": 1});
        assert!(validate_config(&schema, &config).is_empty());
    }

    #[test]
    fn test_validate_config_rejects_unknown_attributes() {
        let schema = placement_schema();
        let config = json!({"schema_path": "a.schem", "x": 1, "rotation": 90});

        let diagnostics = validate_config(&schema, &config);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("rotation"));
    }

    #[test]
    fn test_validate_multiple_errors() {
        let schema = placement_schema();
        let diagnostics = validate(&schema, &json!({"x": "far"}));
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = placement_schema();
        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Expected object");
    }

    #[test]
    fn test_result_helpers() {
        let schema = placement_schema();
        let good = json!({"schema_path": "a.schem", "x": 0});
        assert!(is_valid(&schema, &good));
        assert!(validate_result(&schema, &good).is_ok());

        let errors = validate_result(&schema, &json!({})).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_ensure_valid() {
        assert!(ensure_valid(vec![Diagnostic::warning("only a warning")]).is_ok());

        let err = ensure_valid(validate(&placement_schema(), &json!({"x": 1}))).unwrap_err();
        match err {
            ProviderError::Validation(msg) => {
                assert!(msg.contains("Missing required attribute 'schema_path'"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
