use crate::errors::ToolError;
use crate::utils::ids::{normalize_id, IdKind};
use serde_json::{Map, Value};
use url::Url;

/// Entry point for tool argument checking. Managers obtain an [`ArgReader`]
/// per call; the reader collects every violation before failing.
#[derive(Clone)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn reader<'a>(&self, args: &'a Value) -> ArgReader<'a> {
        ArgReader::new(args)
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

pub struct ArgReader<'a> {
    args: &'a Value,
    violations: Vec<FieldViolation>,
}

impl<'a> ArgReader<'a> {
    pub fn new(args: &'a Value) -> Self {
        Self {
            args,
            violations: Vec::new(),
        }
    }

    fn raw(&self, field: &str) -> Option<&'a Value> {
        self.args.get(field).filter(|v| !v.is_null())
    }

    pub fn violate(&mut self, field: &str, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn optional_string(&mut self, field: &str) -> Option<String> {
        let value = self.raw(field)?;
        match value.as_str().map(|s| s.trim()) {
            Some("") => {
                self.violate(field, "must not be empty");
                None
            }
            Some(text) => Some(text.to_string()),
            None => {
                self.violate(field, "must be a string");
                None
            }
        }
    }

    pub fn required_string(&mut self, field: &str) -> Option<String> {
        if self.raw(field).is_none() {
            self.violate(field, "is required");
            return None;
        }
        self.optional_string(field)
    }

    pub fn string_or(&mut self, field: &str, default: &str) -> String {
        self.optional_string(field)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn optional_id(&mut self, field: &str, kind: IdKind) -> Option<String> {
        let value = self.raw(field)?;
        let raw = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => {
                self.violate(field, format!("must be a {} ID", kind.label()));
                return None;
            }
        };
        match normalize_id(&raw, kind) {
            Ok(id) => Some(id),
            Err(message) => {
                self.violate(field, message);
                None
            }
        }
    }

    pub fn required_id(&mut self, field: &str, kind: IdKind) -> Option<String> {
        if self.raw(field).is_none() {
            self.violate(field, format!("is required ({} ID)", kind.label()));
            return None;
        }
        self.optional_id(field, kind)
    }

    /// Case-insensitive enum; returns the canonical spelling from `allowed`.
    pub fn enum_value(&mut self, field: &str, allowed: &[&str], default: Option<&str>) -> Option<String> {
        let Some(value) = self.raw(field) else {
            if default.is_none() {
                self.violate(field, format!("is required (one of {})", allowed.join(", ")));
            }
            return default.map(|s| s.to_string());
        };
        let Some(text) = value.as_str() else {
            self.violate(field, format!("must be one of {}", allowed.join(", ")));
            return None;
        };
        let needle = text.trim();
        match allowed.iter().find(|candidate| candidate.eq_ignore_ascii_case(needle)) {
            Some(found) => Some(found.to_string()),
            None => {
                self.violate(
                    field,
                    format!("'{}' is not one of {}", needle, allowed.join(", ")),
                );
                None
            }
        }
    }

    pub fn optional_u64(&mut self, field: &str, min: u64, max: u64) -> Option<u64> {
        let value = self.raw(field)?;
        let parsed = value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse::<u64>().ok()));
        match parsed {
            Some(n) if n >= min && n <= max => Some(n),
            _ => {
                self.violate(field, format!("must be an integer between {} and {}", min, max));
                None
            }
        }
    }

    pub fn required_u64(&mut self, field: &str, min: u64, max: u64) -> Option<u64> {
        if self.raw(field).is_none() {
            self.violate(field, "is required");
            return None;
        }
        self.optional_u64(field, min, max)
    }

    pub fn bool_or(&mut self, field: &str, default: bool) -> bool {
        let Some(value) = self.raw(field) else {
            return default;
        };
        if let Some(b) = value.as_bool() {
            return b;
        }
        match value.as_str().map(|s| s.trim().to_lowercase()) {
            Some(s) if s == "true" || s == "1" => true,
            Some(s) if s == "false" || s == "0" => false,
            _ => {
                self.violate(field, "must be a boolean");
                default
            }
        }
    }

    pub fn string_array(&mut self, field: &str, min: usize, max: usize) -> Vec<String> {
        let Some(value) = self.raw(field) else {
            if min > 0 {
                self.violate(field, "is required");
            }
            return Vec::new();
        };
        let Some(items) = value.as_array() else {
            self.violate(field, "must be an array of strings");
            return Vec::new();
        };
        if items.len() < min || items.len() > max {
            self.violate(
                field,
                format!("must contain between {} and {} items (got {})", min, max, items.len()),
            );
        }
        let mut out = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            match item.as_str().map(|s| s.trim()) {
                Some(text) if !text.is_empty() => out.push(text.to_string()),
                _ => self.violate(&format!("{}[{}]", field, idx), "must be a non-empty string"),
            }
        }
        out
    }

    pub fn url_array(&mut self, field: &str, min: usize, max: usize) -> Vec<String> {
        let items = self.string_array(field, min, max);
        let mut out = Vec::new();
        for (idx, item) in items.into_iter().enumerate() {
            match Url::parse(&item) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => out.push(item),
                _ => self.violate(
                    &format!("{}[{}]", field, idx),
                    format!("'{}' is not an absolute http(s) URL", item),
                ),
            }
        }
        out
    }

    pub fn optional_object(&mut self, field: &str) -> Option<Map<String, Value>> {
        let value = self.raw(field)?;
        match value.as_object() {
            Some(obj) => Some(obj.clone()),
            None => {
                self.violate(field, "must be an object");
                None
            }
        }
    }

    pub fn required_object(&mut self, field: &str) -> Option<Map<String, Value>> {
        if self.raw(field).is_none() {
            self.violate(field, "is required");
            return None;
        }
        self.optional_object(field)
    }

    pub fn optional_array(&mut self, field: &str) -> Option<Vec<Value>> {
        let value = self.raw(field)?;
        match value.as_array() {
            Some(arr) => Some(arr.clone()),
            None => {
                self.violate(field, "must be an array");
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), ToolError> {
        if self.violations.is_empty() {
            return Ok(());
        }
        let lines: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect();
        let fields: Vec<Value> = self
            .violations
            .iter()
            .map(|v| serde_json::json!({"field": v.field, "message": v.message}))
            .collect();
        Err(ToolError::validation(format!(
            "Invalid parameters: {}",
            lines.join("; ")
        ))
        .with_details(serde_json::json!({ "fields": fields })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contract_prefix_is_added_and_preserved() {
        let args = json!({"contractId": "1-ABC", "other": "ctr_2-XYZ"});
        let mut reader = ArgReader::new(&args);
        assert_eq!(
            reader.required_id("contractId", IdKind::Contract).as_deref(),
            Some("ctr_1-ABC")
        );
        assert_eq!(
            reader.required_id("other", IdKind::Contract).as_deref(),
            Some("ctr_2-XYZ")
        );
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let args = json!({"groupId": 12345});
        let mut reader = ArgReader::new(&args);
        assert_eq!(
            reader.required_id("groupId", IdKind::Group).as_deref(),
            Some("grp_12345")
        );
    }

    #[test]
    fn finish_enumerates_every_violation() {
        let args = json!({"network": "qa", "urls": ["notaurl"]});
        let mut reader = ArgReader::new(&args);
        reader.required_string("propertyName");
        reader.enum_value("network", &["STAGING", "PRODUCTION"], None);
        reader.url_array("urls", 1, 10);
        let err = reader.finish().unwrap_err();
        assert_eq!(err.kind, crate::errors::ToolErrorKind::Validation);
        assert!(err.message.contains("propertyName: is required"));
        assert!(err.message.contains("network"));
        assert!(err.message.contains("urls[0]"));
        let fields = err
            .details
            .as_ref()
            .and_then(|d| d.get("fields"))
            .and_then(|v| v.as_array())
            .map(|a| a.len());
        assert_eq!(fields, Some(3));
    }

    #[test]
    fn enum_is_canonicalised() {
        let args = json!({"network": "staging"});
        let mut reader = ArgReader::new(&args);
        assert_eq!(
            reader.enum_value("network", &["STAGING", "PRODUCTION"], None).as_deref(),
            Some("STAGING")
        );
        assert_eq!(
            reader.enum_value("format", &["text", "json"], Some("text")).as_deref(),
            Some("text")
        );
    }

    #[test]
    fn array_bounds_are_enforced() {
        let args = json!({"tags": []});
        let mut reader = ArgReader::new(&args);
        reader.string_array("tags", 1, 5);
        assert!(reader.has_violations());
    }

    #[test]
    fn bool_accepts_strings() {
        let args = json!({"wait": "true"});
        let mut reader = ArgReader::new(&args);
        assert!(reader.bool_or("wait", false));
        assert!(!reader.bool_or("missing", false));
    }
}
