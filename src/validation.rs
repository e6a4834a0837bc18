//! Validation of configuration values against a [`Schema`].
//!
//! Used by `ValidateResourceConfig` and `ValidateDataSourceConfig` to reject
//! malformed configuration before any remote call is made. Returns
//! diagnostics rather than errors so several problems can be reported at once.

use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema,
};
use serde_json::Value;
use std::collections::HashMap;

/// Validate a JSON value against a schema.
///
/// An empty result means the value is valid. Rules:
/// - required attributes must be present and non-null
/// - optional attributes may be absent or null
/// - computed-only attributes are skipped (the provider sets those)
/// - values must match the declared attribute type
/// - nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Like [`validate`], but `Err` carries the diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        // Null is fine for an optional block; nothing further to check.
        Value::Null => return,
        _ => {
            let mut diag = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(value)));
            if !path.is_empty() {
                diag = diag.with_attribute(path);
            }
            diagnostics.push(diag);
            return;
        }
    };

    for (name, attr) in &block.attributes {
        validate_attribute(attr, obj.get(name), &join_path(path, name), diagnostics);
    }

    for (name, nested) in &block.blocks {
        validate_nested_block(nested, obj.get(name), &join_path(path, name), diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Computed-only attributes are filled in by the provider.
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_attribute(path),
                );
            }
        }
        Some(v) => validate_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        }
        AttributeType::Int64 => {
            if !value.is_i64() && !value.is_u64() {
                diagnostics.push(type_error(path, "int64", value));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::List(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    validate_type(element_type, elem, &format!("{path}.{i}"), diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "list", value));
            }
        }
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    validate_type(value_type, val, &format!("{path}.{key}"), diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        }
        AttributeType::Object(attrs) => {
            if let Some(obj) = value.as_object() {
                validate_object(attrs, obj, path, diagnostics);
            } else {
                diagnostics.push(type_error(path, "object", value));
            }
        }
        // Dynamic accepts any value.
        AttributeType::Dynamic => {}
    }
}

fn validate_object(
    attrs: &HashMap<String, AttributeType>,
    obj: &serde_json::Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Object member types carry no required/optional flags; only check types
    // of what is present.
    for (name, attr_type) in attrs {
        if let Some(value) = obj.get(name) {
            validate_type(attr_type, value, &join_path(path, name), diagnostics);
        }
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match nested.nesting_mode {
        BlockNestingMode::Single => match value {
            None | Some(Value::Null) => {
                if nested.min_items > 0 {
                    diagnostics.push(
                        Diagnostic::error(format!("Missing required block '{}'", path))
                            .with_attribute(path),
                    );
                }
            }
            Some(v) => validate_block(&nested.block, v, path, diagnostics),
        },
        BlockNestingMode::List => validate_list_block(nested, value, path, diagnostics),
    }
}

fn validate_list_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
        }
        Some(Value::Array(arr)) => {
            let len = arr.len() as u32;
            if len < nested.min_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s), got {}",
                        path, nested.min_items, len
                    ))
                    .with_attribute(path),
                );
            }
            if nested.max_items > 0 && len > nested.max_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' allows at most {} item(s), got {}",
                        path, nested.max_items, len
                    ))
                    .with_attribute(path),
                );
            }
            for (i, item) in arr.iter().enumerate() {
                validate_block(&nested.block, item, &format!("{path}.{i}"), diagnostics);
            }
        }
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
        }
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}.{name}")
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

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, Block, NestedBlock, Schema};
    use serde_json::json;

    #[test]
    fn required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "my-index"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        let diagnostics = validate(&schema, &json!({"name": null}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"name": 17}));
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn optional_and_computed() {
        let schema = Schema::v0()
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("id", Attribute::computed_string());

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"description": null})).is_empty());
        // Computed-only attributes are never validated against configuration.
        assert!(validate(&schema, &json!({"id": 42})).is_empty());

        let diagnostics = validate(&schema, &json!({"description": false}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn int64_rejects_fractions() {
        let schema = Schema::v0().with_attribute("priority", Attribute::optional_int64());

        assert!(validate(&schema, &json!({"priority": 50})).is_empty());
        assert_eq!(validate(&schema, &json!({"priority": 50.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"priority": "50"})).len(), 1);
    }

    #[test]
    fn list_and_map_element_types() {
        let schema = Schema::v0()
            .with_attribute(
                "disabled_features",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::optional(),
                ),
            )
            .with_attribute(
                "settings",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::optional(),
                ),
            );

        assert!(validate(&schema, &json!({"disabled_features": ["ml", "apm"]})).is_empty());

        let diagnostics = validate(&schema, &json!({"disabled_features": ["ml", 3]}));
        assert_eq!(diagnostics[0].attribute, Some("disabled_features.1".to_string()));

        let diagnostics =
            validate(&schema, &json!({"settings": {"index.number_of_shards": 1}}));
        assert_eq!(
            diagnostics[0].attribute,
            Some("settings.index.number_of_shards".to_string())
        );
    }

    #[test]
    fn nested_single_block() {
        let schema = Schema::v0().with_block(
            "hot",
            NestedBlock::single(Block::new().with_attribute("min_age", Attribute::optional_string())),
        );

        assert!(validate(&schema, &json!({"hot": {"min_age": "0ms"}})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());

        let diagnostics = validate(&schema, &json!({"hot": {"min_age": 0}}));
        assert_eq!(diagnostics[0].attribute, Some("hot.min_age".to_string()));
    }

    #[test]
    fn nested_list_block_constraints() {
        let schema = Schema::v0().with_block(
            "rule",
            NestedBlock::list(Block::new().with_attribute("name", Attribute::required_string()))
                .with_min_items(1)
                .with_max_items(2),
        );

        assert!(validate(&schema, &json!({"rule": [{"name": "a"}]})).is_empty());

        let diagnostics = validate(&schema, &json!({"rule": []}));
        assert!(diagnostics[0].summary.contains("at least 1"));

        let diagnostics = validate(
            &schema,
            &json!({"rule": [{"name": "a"}, {"name": "b"}, {"name": "c"}]}),
        );
        assert!(diagnostics[0].summary.contains("at most 2"));

        let diagnostics = validate(&schema, &json!({"rule": [{}]}));
        assert_eq!(diagnostics[0].attribute, Some("rule.0.name".to_string()));
    }

    #[test]
    fn dynamic_accepts_anything() {
        let schema = Schema::v0().with_attribute(
            "params",
            Attribute::new(AttributeType::Dynamic, AttributeFlags::optional()),
        );

        assert!(validate(&schema, &json!({"params": {"threshold": [200]}})).is_empty());
        assert!(validate(&schema, &json!({"params": "raw"})).is_empty());
    }

    #[test]
    fn root_must_be_object() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());
        let diagnostics = validate(&schema, &json!(["not", "an", "object"]));
        assert!(diagnostics[0].summary.contains("Expected object"));
    }

    #[test]
    fn validate_result_wraps_diagnostics() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());
        assert!(validate_result(&schema, &json!({"name": "x"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);
    }
}
