//! Validation of configuration documents against a [`Schema`].
//!
//! ```
//! use ec_provider::schema::{Attribute, Schema};
//! use ec_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("region", Attribute::required_string())
//!     .with_attribute("include_by_default", Attribute::optional_bool());
//!
//! assert!(validate(&schema, &json!({"region": "us-east-1"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"include_by_default": "yes"}));
//! assert_eq!(diagnostics.len(), 2);
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::schema::{
    has_errors, Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema,
};

/// Validate a document against a schema.
///
/// - required attributes must be present and non-null
/// - computed-only attributes are not checked; the provider owns them
/// - values must match their declared type
/// - attributes unknown to the schema are rejected
/// - deprecated attributes that are set produce a warning
/// - nested blocks are checked recursively, including item counts
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Like [`validate`], but fails only on error diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<Vec<Diagnostic>, Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if has_errors(&diagnostics) {
        Err(diagnostics)
    } else {
        Ok(diagnostics)
    }
}

/// `true` when validation yields no errors.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    !has_errors(&validate(schema, value))
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let mut diag = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(value)));
            if !path.is_empty() {
                diag = diag.with_attribute(path);
            }
            diagnostics.push(diag);
            return;
        },
    };

    for key in obj.keys() {
        if !block.attributes.contains_key(key) && !block.blocks.contains_key(key) {
            let attr_path = join_path(path, key);
            diagnostics.push(
                Diagnostic::error(format!("Unsupported argument '{}'", attr_path))
                    .with_detail("An argument with this name is not expected here")
                    .with_attribute(attr_path),
            );
        }
    }

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), &attr_path, diagnostics);
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested, obj.get(name), &block_path, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required argument '{}'", path))
                        .with_attribute(path),
                );
            }
        },
        Some(v) => {
            if let Some(message) = &attr.deprecation_message {
                diagnostics.push(
                    Diagnostic::warning(format!("Argument '{}' is deprecated", path))
                        .with_detail(message.clone())
                        .with_attribute(path),
                );
            }
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
        },
    }
}

fn validate_attribute_type(
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
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Float64 => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) | AttributeType::Set(element_type) => {
            let expected = if matches!(attr_type, AttributeType::Set(_)) {
                "set"
            } else {
                "list"
            };
            match value.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        let item_path = format!("{}.{}", path, i);
                        validate_attribute_type(element_type, item, &item_path, diagnostics);
                    }
                },
                None => diagnostics.push(type_error(path, expected, value)),
            }
        },
        AttributeType::Map(value_type) => match value.as_object() {
            Some(obj) => {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
        AttributeType::Object(attrs) => match value.as_object() {
            Some(obj) => validate_object_type(attrs, obj, path, diagnostics),
            None => diagnostics.push(type_error(path, "object", value)),
        },
        AttributeType::Dynamic => {},
    }
}

fn validate_object_type(
    attrs: &BTreeMap<String, AttributeType>,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, attr_type) in attrs {
        if let Some(value) = obj.get(name) {
            validate_attribute_type(attr_type, value, &join_path(path, name), diagnostics);
        }
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (nested.nesting_mode, value) {
        (_, None | Some(Value::Null)) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
        },
        (BlockNestingMode::Single, Some(v)) => {
            validate_block(&nested.block, v, path, diagnostics);
        },
        (BlockNestingMode::List | BlockNestingMode::Set, Some(Value::Array(items))) => {
            let len = items.len() as u32;
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
            for (i, item) in items.iter().enumerate() {
                validate_block(&nested.block, item, &format!("{}.{}", path, i), diagnostics);
            }
        },
        (_, Some(v)) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

pub(crate) fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
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

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() => true,
        Value::Number(n) => n
            .as_f64()
            .map(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
            .unwrap_or(false),
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for argument '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DiagnosticSeverity;
    use serde_json::json;

    fn ruleset_schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("include_by_default", Attribute::optional_bool())
            .with_attribute("tags", Attribute::optional_string_map())
            .with_block(
                "rule",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("id", Attribute::computed_string())
                        .with_attribute("source", Attribute::optional_string()),
                )
                .with_min_items(1),
            )
    }

    #[test]
    fn test_valid_document() {
        let diagnostics = validate(
            &ruleset_schema(),
            &json!({
                "name": "office",
                "include_by_default": false,
                "rule": [{"source": "1.1.1.1"}]
            }),
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_missing_required() {
        let diagnostics = validate(&ruleset_schema(), &json!({"rule": [{"source": "1.1.1.1"}]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("name"));
    }

    #[test]
    fn test_computed_attribute_not_checked() {
        let diagnostics = validate(
            &ruleset_schema(),
            &json!({"id": 12, "name": "office", "rule": [{"source": "1.1.1.1"}]}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_type_mismatch() {
        let diagnostics = validate(
            &ruleset_schema(),
            &json!({
                "name": "office",
                "include_by_default": "no",
                "tags": {"team": 1},
                "rule": [{"source": "1.1.1.1"}]
            }),
        );
        let paths: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(paths, vec!["include_by_default", "tags.team"]);
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let diagnostics = validate(
            &ruleset_schema(),
            &json!({"name": "office", "colour": "red", "rule": [{"source": "1.1.1.1", "port": 1}]}),
        );
        let paths: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(paths, vec!["colour", "rule.0.port"]);
    }

    #[test]
    fn test_block_min_items() {
        let diagnostics = validate(&ruleset_schema(), &json!({"name": "office", "rule": []}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));

        let diagnostics = validate(&ruleset_schema(), &json!({"name": "office"}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_single_block_max_items() {
        let schema = Schema::v0().with_block(
            "kibana",
            NestedBlock::list(Block::new().with_attribute("size", Attribute::optional_string()))
                .with_max_items(1),
        );
        let diagnostics = validate(&schema, &json!({"kibana": [{}, {}]}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 1"));
    }

    #[test]
    fn test_deprecated_attribute_warns() {
        let schema = Schema::v0().with_attribute(
            "legacy_name",
            Attribute::optional_string().with_deprecation("use `name`"),
        );
        let diagnostics = validate(&schema, &json!({"legacy_name": "x"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, DiagnosticSeverity::Warning);
        assert!(is_valid(&schema, &json!({"legacy_name": "x"})));
        assert!(validate_result(&schema, &json!({"legacy_name": "x"})).is_ok());
    }

    #[test]
    fn test_root_not_object() {
        let diagnostics = validate(&ruleset_schema(), &json!("nope"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].attribute.is_none());
        assert!(validate_result(&ruleset_schema(), &json!([])).is_err());
    }

    #[test]
    fn test_int64() {
        let schema = Schema::v0().with_attribute("zone_count", Attribute::optional_int64());
        assert!(is_valid(&schema, &json!({"zone_count": 2})));
        assert!(is_valid(&schema, &json!({"zone_count": 2.0})));
        assert!(!is_valid(&schema, &json!({"zone_count": 2.5})));
    }
}
