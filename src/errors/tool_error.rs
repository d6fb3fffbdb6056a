use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Validation,
    NotFound,
    Permission,
    RateLimit,
    Network,
    MalformedResponse,
    OperationTimeout,
    Conflict,
    Unknown,
}

impl ToolErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolErrorKind::Validation => "validation",
            ToolErrorKind::NotFound => "not_found",
            ToolErrorKind::Permission => "permission",
            ToolErrorKind::RateLimit => "rate_limit",
            ToolErrorKind::Network => "network",
            ToolErrorKind::MalformedResponse => "malformed_response",
            ToolErrorKind::OperationTimeout => "operation_timeout",
            ToolErrorKind::Conflict => "conflict",
            ToolErrorKind::Unknown => "unknown",
        }
    }

    /// Human readable cause used in the "Why" line of error output.
    pub fn explanation(self) -> &'static str {
        match self {
            ToolErrorKind::Validation => "The request parameters were rejected.",
            ToolErrorKind::NotFound => "The requested resource does not exist or is not visible to these credentials.",
            ToolErrorKind::Permission => "The credentials are missing, invalid, or lack access to this resource.",
            ToolErrorKind::RateLimit => "Akamai rate-limited the request.",
            ToolErrorKind::Network => "Akamai could not be reached or returned a server error.",
            ToolErrorKind::MalformedResponse => "Akamai returned a response with an unexpected structure.",
            ToolErrorKind::OperationTimeout => "The operation did not finish within the polling budget.",
            ToolErrorKind::Conflict => "The resource changed or is in a state that does not allow this operation.",
            ToolErrorKind::Unknown => "An unexpected error occurred.",
        }
    }

    pub fn default_hint(self) -> &'static str {
        match self {
            ToolErrorKind::Validation => "Fix the listed fields and retry.",
            ToolErrorKind::NotFound => "Use group_list, contract_list or property_list to find a valid ID.",
            ToolErrorKind::Permission => "Check your credentials file (~/.edgerc) and the API client's grants.",
            ToolErrorKind::RateLimit => "Wait a minute before retrying.",
            ToolErrorKind::Network => "Retry shortly; if it persists check connectivity to the Akamai API host.",
            ToolErrorKind::MalformedResponse => "Retry the call; if it persists report the response shape.",
            ToolErrorKind::OperationTimeout => "The vendor operation may still complete; check its status tool later.",
            ToolErrorKind::Conflict => "Fetch the latest version of the resource and retry.",
            ToolErrorKind::Unknown => "Retry the call; if it persists inspect the server log.",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
            retryable: matches!(kind, ToolErrorKind::RateLimit | ToolErrorKind::Network),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Validation, "VALIDATION", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Permission, "PERMISSION", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::RateLimit, "RATE_LIMIT", message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Network, "NETWORK", message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::MalformedResponse, "MALFORMED_RESPONSE", message)
    }

    pub fn operation_timeout(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::OperationTimeout, "OPERATION_TIMEOUT", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Conflict, "CONFLICT", message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Unknown, "UNKNOWN", message)
    }

    /// Classifies a non-success vendor response. `body` may be a problem
    /// detail object, a plain string or null.
    pub fn from_http_status(status: u16, body: &Value) -> Self {
        let detail = body
            .get("detail")
            .and_then(|v| v.as_str())
            .or_else(|| body.get("title").and_then(|v| v.as_str()))
            .or_else(|| body.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let message = match detail {
            Some(detail) => format!("Akamai API returned HTTP {}: {}", status, detail),
            None => format!("Akamai API returned HTTP {}", status),
        };
        let err = match status {
            400 | 422 => Self::validation(message),
            401 | 403 => Self::permission(message),
            404 => Self::not_found(message),
            409 | 412 => Self::conflict(message),
            429 => Self::rate_limited(message),
            500..=599 => Self::network(message),
            _ => Self::unknown(message),
        };
        let mut details = serde_json::json!({ "status": status });
        if body.is_object() {
            if let Value::Object(map) = &mut details {
                map.insert("problem".to_string(), body.clone());
            }
        }
        err.with_details(details)
    }

    pub fn hint_or_default(&self) -> &str {
        self.hint
            .as_deref()
            .unwrap_or_else(|| self.kind.default_hint())
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ToolError {}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::unknown(err.to_string())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::malformed(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_maps_to_kind() {
        let body = Value::Null;
        assert_eq!(ToolError::from_http_status(400, &body).kind, ToolErrorKind::Validation);
        assert_eq!(ToolError::from_http_status(401, &body).kind, ToolErrorKind::Permission);
        assert_eq!(ToolError::from_http_status(403, &body).kind, ToolErrorKind::Permission);
        assert_eq!(ToolError::from_http_status(404, &body).kind, ToolErrorKind::NotFound);
        assert_eq!(ToolError::from_http_status(412, &body).kind, ToolErrorKind::Conflict);
        assert_eq!(ToolError::from_http_status(429, &body).kind, ToolErrorKind::RateLimit);
        assert_eq!(ToolError::from_http_status(503, &body).kind, ToolErrorKind::Network);
        assert_eq!(ToolError::from_http_status(418, &body).kind, ToolErrorKind::Unknown);
    }

    #[test]
    fn http_status_uses_problem_detail() {
        let body = serde_json::json!({
            "type": "https://problems.luna.akamaiapis.net/papi/v0/not-found",
            "title": "Not Found",
            "detail": "Property prp_1 not found",
            "status": 404
        });
        let err = ToolError::from_http_status(404, &body);
        assert!(err.message.contains("Property prp_1 not found"));
        assert!(!err.retryable);
        assert_eq!(
            err.details.as_ref().and_then(|d| d.get("status")).and_then(|v| v.as_u64()),
            Some(404)
        );
    }

    #[test]
    fn rate_limit_and_network_are_retryable() {
        assert!(ToolError::rate_limited("slow down").retryable);
        assert!(ToolError::network("boom").retryable);
        assert!(!ToolError::validation("bad").retryable);
    }
}
