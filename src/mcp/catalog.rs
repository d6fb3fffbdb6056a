use crate::errors::ToolError;
use crate::utils::suggest::suggest;
use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

static TOOL_CATALOG: Lazy<Vec<ToolDef>> = Lazy::new(|| {
    let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tool_catalog.json"));
    serde_json::from_str(raw).expect("tool_catalog.json must be valid JSON")
});

static TOOL_MAP: Lazy<HashMap<String, ToolDef>> = Lazy::new(|| {
    TOOL_CATALOG
        .iter()
        .cloned()
        .map(|tool| (tool.name.clone(), tool))
        .collect()
});

static TOOL_VALIDATORS: Lazy<HashMap<String, JSONSchema>> = Lazy::new(|| {
    TOOL_CATALOG
        .iter()
        .filter_map(|tool| {
            JSONSchema::compile(&tool.input_schema)
                .ok()
                .map(|schema| (tool.name.clone(), schema))
        })
        .collect()
});

pub fn tool_catalog() -> &'static [ToolDef] {
    &TOOL_CATALOG
}

pub fn tool_by_name(name: &str) -> Option<&'static ToolDef> {
    TOOL_MAP.get(name)
}

/// Checks `args` against the tool's input schema. Every violation is listed
/// in one validation error, with suggestions for misspelled fields and enum
/// values.
pub fn validate_tool_args(tool_name: &str, args: &Value) -> Result<(), ToolError> {
    let (Some(tool), Some(schema)) = (tool_by_name(tool_name), TOOL_VALIDATORS.get(tool_name)) else {
        return Ok(());
    };
    let result = schema.validate(args);
    if let Err(errors) = result {
        return Err(schema_error(tool_name, args, errors, &tool.input_schema));
    }
    Ok(())
}

fn schema_error(tool_name: &str, args: &Value, errors: jsonschema::ErrorIterator, schema: &Value) -> ToolError {
    let mut problems = Vec::new();
    let mut fields = Vec::new();
    let mut did_you_mean = Vec::new();

    for err in errors.take(12) {
        let pointer = err.instance_path.to_string();
        let location = if pointer.is_empty() {
            "(root)".to_string()
        } else {
            pointer.trim_start_matches('/').replace('/', ".")
        };
        match &err.kind {
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                let known: Vec<String> = node_at(schema, &err.schema_path.to_string())
                    .and_then(|parent| parent.get("properties"))
                    .and_then(|props| props.as_object())
                    .map(|props| props.keys().cloned().collect())
                    .unwrap_or_default();
                for unknown in unexpected {
                    problems.push(format!("{}: unknown field '{}'", location, unknown));
                    fields.push(serde_json::json!({"field": unknown, "message": "unknown field"}));
                    let close = suggest(unknown, &known, 3);
                    if !close.is_empty() {
                        did_you_mean.push(format!("'{}' -> {}", unknown, close.join(", ")));
                    }
                }
            }
            ValidationErrorKind::Enum { options } => {
                let allowed: Vec<String> = options
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .map(|v| v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                problems.push(format!("{}: expected one of {}", location, allowed.join(", ")));
                fields.push(serde_json::json!({"field": location, "message": "invalid value"}));
                let received = node_at(args, &pointer)
                    .and_then(|v| v.as_str().map(|s| s.to_string()))
                    .unwrap_or_default();
                let close = suggest(&received, &allowed, 3);
                if !close.is_empty() {
                    did_you_mean.push(format!("{} -> {}", location, close.join(", ")));
                }
            }
            ValidationErrorKind::Required { property } => {
                let name = property
                    .as_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| property.to_string());
                problems.push(format!("missing required field '{}'", name));
                fields.push(serde_json::json!({"field": name, "message": "is required"}));
            }
            ValidationErrorKind::Type { kind } => {
                problems.push(format!("{}: expected {}", location, type_label(kind)));
                fields.push(serde_json::json!({"field": location, "message": format!("expected {}", type_label(kind))}));
            }
            _ => {
                problems.push(format!("{}: {}", location, err));
                fields.push(serde_json::json!({"field": location, "message": err.to_string()}));
            }
        }
    }

    let mut error = ToolError::validation(format!(
        "Invalid arguments for {}: {}",
        tool_name,
        problems.join("; ")
    ))
    .with_details(serde_json::json!({ "fields": fields }));
    if !did_you_mean.is_empty() {
        error = error.with_hint(format!("Did you mean: {}", did_you_mean.join(" | ")));
    }
    error
}

fn type_label(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Single(primitive) => primitive.to_string(),
        TypeKind::Multiple(types) => {
            let list: Vec<String> = (*types).into_iter().map(|t| t.to_string()).collect();
            list.join(" | ")
        }
    }
}

/// Resolves a JSON pointer, skipping the final keyword segment for schema
/// paths such as `/properties/x/additionalProperties`.
fn node_at<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    let mut current = root;
    let segments: Vec<&str> = pointer.split('/').filter(|s| !s.is_empty()).collect();
    for (idx, segment) in segments.iter().enumerate() {
        let is_last = idx + 1 == segments.len();
        if is_last && *segment == "additionalProperties" {
            break;
        }
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Catalog entries exposed through `tools/list`.
pub fn list_tools() -> Vec<ToolDef> {
    TOOL_CATALOG.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ToolErrorKind;
    use crate::mcp::routes::ROUTES;
    use std::collections::HashSet;

    #[test]
    fn catalog_and_routes_cover_the_same_tools() {
        let catalog: HashSet<&str> = tool_catalog().iter().map(|t| t.name.as_str()).collect();
        let routed: HashSet<&str> = ROUTES.iter().map(|r| r.tool).collect();
        assert_eq!(catalog, routed);
        assert_eq!(catalog.len(), tool_catalog().len());
    }

    #[test]
    fn every_schema_compiles_and_accepts_format() {
        for tool in tool_catalog() {
            assert!(TOOL_VALIDATORS.contains_key(&tool.name), "{} schema", tool.name);
            let format = tool
                .input_schema
                .get("properties")
                .and_then(|p| p.get("format"));
            assert!(format.is_some(), "{} lacks format", tool.name);
        }
    }

    #[test]
    fn numeric_ids_pass_schema_validation() {
        let args = serde_json::json!({"contractId": 1, "groupId": 12345});
        assert!(validate_tool_args("property_list", &args).is_ok());
        let args = serde_json::json!({"propertyId": 42, "createFromVersion": 1});
        assert!(validate_tool_args("property_version_create", &args).is_ok());
        let err = validate_tool_args("property_list", &serde_json::json!({"groupId": true})).expect_err("bool");
        assert_eq!(err.kind, ToolErrorKind::Validation);
    }

    #[test]
    fn unknown_fields_get_suggestions() {
        let err = validate_tool_args("property_create", &serde_json::json!({
            "propertyName": "site",
            "productId": "prd_fresca",
            "contractID": "ctr_1"
        }))
        .expect_err("unknown field");
        assert_eq!(err.kind, ToolErrorKind::Validation);
        assert!(err.message.contains("contractID"));
        assert!(err.hint.unwrap_or_default().contains("contractId"));
    }

    #[test]
    fn enum_values_get_suggestions() {
        let err = validate_tool_args("contract_list", &serde_json::json!({"format": "jsn"}))
            .expect_err("bad enum");
        assert!(err.message.contains("format: expected one of text, json"));
        assert!(err.hint.unwrap_or_default().contains("json"));
    }

    #[test]
    fn missing_required_fields_are_listed() {
        let err = validate_tool_args("purge_urls", &serde_json::json!({})).expect_err("required");
        assert!(err.message.contains("missing required field 'urls'"));
    }
}
