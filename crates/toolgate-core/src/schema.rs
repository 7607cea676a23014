//! Typed JSON-Schema subset for tool-argument validation.
//!
//! MCP servers describe tool inputs with JSON Schema, but schemas in the
//! wild are not guaranteed exhaustive or even well-formed. This module
//! parses a schema *leniently* into a tagged variant model (anything it
//! does not understand degrades to `Any`) and validates arguments
//! against it: declared types are enforced, required properties must be
//! present, and unknown extra properties are tolerated.

use std::collections::BTreeMap;

use serde_json::Value;

/// A parsed node of the JSON-Schema subset.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    String,
    Number,
    Integer,
    Boolean,
    Null,
    /// Fixed set of admissible values.
    Enum(Vec<Value>),
    Array {
        items: Option<Box<SchemaNode>>,
    },
    Object {
        properties: BTreeMap<String, SchemaNode>,
        required: Vec<String>,
    },
    /// anyOf / oneOf: at least one variant must accept the value.
    Union(Vec<SchemaNode>),
    /// No constraint (missing, unrecognized, or deliberately open).
    Any,
}

impl SchemaNode {
    /// Parse a raw schema value. Never fails: unrecognized constructs
    /// become `Any` so a sloppy server schema cannot break discovery.
    pub fn parse(raw: &Value) -> Self {
        let Some(obj) = raw.as_object() else {
            // `true` is a valid "accept everything" schema
            return Self::Any;
        };

        if let Some(values) = obj.get("enum").and_then(Value::as_array) {
            return Self::Enum(values.clone());
        }

        if let Some(variants) = obj
            .get("anyOf")
            .or_else(|| obj.get("oneOf"))
            .and_then(Value::as_array)
        {
            return Self::Union(variants.iter().map(Self::parse).collect());
        }

        match obj.get("type") {
            Some(Value::String(t)) => Self::parse_typed(t, obj),
            // "type": ["string", "null"] style unions
            Some(Value::Array(types)) => Self::Union(
                types
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|t| Self::parse_typed(t, obj))
                    .collect(),
            ),
            _ => Self::Any,
        }
    }

    fn parse_typed(type_name: &str, obj: &serde_json::Map<String, Value>) -> Self {
        match type_name {
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "null" => Self::Null,
            "array" => Self::Array {
                items: obj.get("items").map(|i| Box::new(Self::parse(i))),
            },
            "object" => {
                let properties = obj
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| {
                        props
                            .iter()
                            .map(|(k, v)| (k.clone(), Self::parse(v)))
                            .collect()
                    })
                    .unwrap_or_default();
                let required = obj
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|r| {
                        r.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                Self::Object {
                    properties,
                    required,
                }
            }
            _ => Self::Any,
        }
    }

    /// Validate a value against this node.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Any => Ok(()),
            Self::String => match value {
                Value::String(_) => Ok(()),
                other => Err(type_error("string", other)),
            },
            Self::Boolean => match value {
                Value::Bool(_) => Ok(()),
                other => Err(type_error("boolean", other)),
            },
            Self::Null => match value {
                Value::Null => Ok(()),
                other => Err(type_error("null", other)),
            },
            Self::Number => match value {
                Value::Number(_) => Ok(()),
                other => Err(type_error("number", other)),
            },
            Self::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
                other => Err(type_error("integer", other)),
            },
            Self::Enum(values) => {
                if values.contains(value) {
                    Ok(())
                } else {
                    Err(format!("value {value} is not one of the allowed values"))
                }
            }
            Self::Array { items } => {
                let Value::Array(elements) = value else {
                    return Err(type_error("array", value));
                };
                if let Some(item_schema) = items {
                    for (index, element) in elements.iter().enumerate() {
                        item_schema
                            .validate(element)
                            .map_err(|e| format!("item {index}: {e}"))?;
                    }
                }
                Ok(())
            }
            Self::Object {
                properties,
                required,
            } => {
                let Value::Object(fields) = value else {
                    return Err(type_error("object", value));
                };
                for name in required {
                    if !fields.contains_key(name) {
                        return Err(format!("missing required property '{name}'"));
                    }
                }
                // Declared properties are checked; undeclared extras are
                // tolerated because MCP schemas are not exhaustive.
                for (name, field_value) in fields {
                    if let Some(prop_schema) = properties.get(name) {
                        prop_schema
                            .validate(field_value)
                            .map_err(|e| format!("property '{name}': {e}"))?;
                    }
                }
                Ok(())
            }
            Self::Union(variants) => {
                if variants.is_empty() || variants.iter().any(|v| v.validate(value).is_ok()) {
                    Ok(())
                } else {
                    Err(format!("value {value} matches no schema variant"))
                }
            }
        }
    }
}

fn type_error(expected: &str, got: &Value) -> String {
    let got_name = match got {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    format!("expected {expected}, got {got_name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: Value) -> SchemaNode {
        SchemaNode::parse(&raw)
    }

    #[test]
    fn test_parse_object_with_required() {
        let schema = parse(json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "depth": {"type": "integer"}
            },
            "required": ["path"]
        }));

        assert!(schema.validate(&json!({"path": "/tmp"})).is_ok());
        assert!(schema.validate(&json!({"path": "/tmp", "depth": 2})).is_ok());
        assert!(schema.validate(&json!({"depth": 2})).is_err());
        assert!(schema.validate(&json!({"path": 42})).is_err());
    }

    #[test]
    fn test_unknown_extra_properties_tolerated() {
        let schema = parse(json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        }));
        assert!(schema
            .validate(&json!({"path": "/tmp", "surprise": true}))
            .is_ok());
    }

    #[test]
    fn test_integer_vs_number() {
        let integer = parse(json!({"type": "integer"}));
        assert!(integer.validate(&json!(3)).is_ok());
        assert!(integer.validate(&json!(3.5)).is_err());

        let number = parse(json!({"type": "number"}));
        assert!(number.validate(&json!(3.5)).is_ok());
    }

    #[test]
    fn test_enum() {
        let schema = parse(json!({"enum": ["a", "b", 3]}));
        assert!(schema.validate(&json!("a")).is_ok());
        assert!(schema.validate(&json!(3)).is_ok());
        assert!(schema.validate(&json!("c")).is_err());
    }

    #[test]
    fn test_array_items() {
        let schema = parse(json!({"type": "array", "items": {"type": "string"}}));
        assert!(schema.validate(&json!(["a", "b"])).is_ok());
        assert!(schema.validate(&json!(["a", 1])).is_err());
        assert!(schema.validate(&json!("a")).is_err());
    }

    #[test]
    fn test_union_any_of() {
        let schema = parse(json!({"anyOf": [{"type": "string"}, {"type": "null"}]}));
        assert!(schema.validate(&json!("x")).is_ok());
        assert!(schema.validate(&json!(null)).is_ok());
        assert!(schema.validate(&json!(1)).is_err());
    }

    #[test]
    fn test_type_array_union() {
        let schema = parse(json!({"type": ["string", "null"]}));
        assert!(schema.validate(&json!("x")).is_ok());
        assert!(schema.validate(&json!(null)).is_ok());
        assert!(schema.validate(&json!(true)).is_err());
    }

    #[test]
    fn test_unrecognized_degrades_to_any() {
        let schema = parse(json!({"$ref": "#/definitions/thing"}));
        assert_eq!(schema, SchemaNode::Any);
        assert!(schema.validate(&json!({"whatever": 1})).is_ok());

        // Non-object schema accepts everything
        assert!(parse(json!(true)).validate(&json!([1, 2])).is_ok());
    }

    #[test]
    fn test_nested_objects() {
        let schema = parse(json!({
            "type": "object",
            "properties": {
                "opts": {
                    "type": "object",
                    "properties": {"force": {"type": "boolean"}},
                    "required": ["force"]
                }
            },
            "required": ["opts"]
        }));
        assert!(schema.validate(&json!({"opts": {"force": true}})).is_ok());
        assert!(schema.validate(&json!({"opts": {}})).is_err());
    }
}
