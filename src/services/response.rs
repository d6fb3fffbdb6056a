use crate::errors::ToolError;
use crate::utils::data_path::lookup;
use crate::utils::ids::IdKind;
use serde_json::Value;

/// Recognises an RFC 7807 problem document that some endpoints return with a
/// 2xx status.
pub fn detect_error_envelope(value: &Value) -> Option<ToolError> {
    let obj = value.as_object()?;
    let has_problem_marker = obj.get("type").map(|v| v.is_string()).unwrap_or(false)
        || obj.get("detail").map(|v| v.is_string()).unwrap_or(false);
    let has_title_or_status = obj.get("title").map(|v| v.is_string()).unwrap_or(false)
        || obj.get("status").map(|v| v.is_number()).unwrap_or(false);
    if !(has_problem_marker && has_title_or_status) {
        return None;
    }
    let status = obj
        .get("status")
        .and_then(|v| v.as_u64())
        .map(|s| s as u16)
        .unwrap_or(400);
    if (200..300).contains(&status) {
        return None;
    }
    Some(ToolError::from_http_status(status, value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Array,
    Object,
    String,
    Number,
    Any,
}

impl Expected {
    fn matches(self, value: &Value) -> bool {
        match self {
            Expected::Array => value.is_array(),
            Expected::Object => value.is_object(),
            Expected::String => value.is_string(),
            Expected::Number => value.is_number(),
            Expected::Any => !value.is_null(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Expected::Array => "an array",
            Expected::Object => "an object",
            Expected::String => "a string",
            Expected::Number => "a number",
            Expected::Any => "present",
        }
    }
}

/// Expected structure of a vendor response as `(path, kind)` pairs.
#[derive(Debug, Clone, Default)]
pub struct ShapeCheck {
    rules: Vec<(String, Expected)>,
}

impl ShapeCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(mut self, path: &str, expected: Expected) -> Self {
        self.rules.push((path.to_string(), expected));
        self
    }

    /// Shorthand for the common `<collection>.items` listing envelope.
    pub fn items(collection: &str) -> Self {
        Self::new().expect(&format!("{}.items", collection), Expected::Array)
    }

    pub fn check<'a>(&self, context: &str, value: &'a Value) -> Result<&'a Value, ToolError> {
        if let Some(problem) = detect_error_envelope(value) {
            return Err(problem);
        }
        for (path, expected) in &self.rules {
            let found = lookup(value, path);
            let ok = found.map(|v| expected.matches(v)).unwrap_or(false);
            if !ok {
                let shown = if path.is_empty() { "(root)" } else { path.as_str() };
                return Err(ToolError::malformed(format!(
                    "Unexpected response from {}: expected '{}' to be {}",
                    context,
                    shown,
                    expected.label()
                ))
                .with_details(serde_json::json!({
                    "path": shown,
                    "expected": expected.label(),
                    "received": found.map(json_type).unwrap_or("missing"),
                })));
            }
        }
        Ok(value)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Pulls an ID of `kind` out of a vendor link such as
/// `/papi/v1/properties/prp_999?contractId=ctr_1&groupId=grp_1`.
pub fn extract_id_from_link(link: &str, kind: IdKind) -> Option<String> {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    path.split('/')
        .rev()
        .find(|segment| segment.starts_with(kind.prefix()) && segment.len() > kind.prefix().len())
        .map(|segment| segment.to_string())
}

/// Last non-empty path segment of a link, for resources without a typed
/// prefix (DNS change lists, CPS enrollments, bulk searches).
pub fn last_link_segment(link: &str) -> Option<String> {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    path.split('/')
        .rev()
        .find(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
}
