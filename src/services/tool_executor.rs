use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::ToolError;
use crate::mcp::catalog::validate_tool_args;
use crate::mcp::protocol::ToolResponse;
use crate::mcp::routes::{route_for, routed_tool_names};
use crate::services::formatter::{render, render_error, OutputFormat, ToolOutput};
use crate::services::logger::Logger;
use crate::utils::tool_errors::unknown_tool_error;

/// A group of related tools. `action` is the tool name routed to this
/// handler; `args` has the presentation-only `format` field removed.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError>;
}

#[derive(Clone)]
pub struct ToolExecutor {
    logger: Logger,
    handlers: Arc<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolExecutor {
    pub fn new(logger: Logger, handlers: HashMap<String, Arc<dyn ToolHandler>>) -> Self {
        Self {
            logger: logger.child("executor"),
            handlers: Arc::new(handlers),
        }
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    fn without_format(args: Value) -> Value {
        match args {
            Value::Object(mut map) => {
                map.remove("format");
                Value::Object(map)
            }
            other => other,
        }
    }

    async fn dispatch(&self, tool: &str, args: Value) -> Result<ToolOutput, ToolError> {
        let Some(route) = route_for(tool) else {
            return Err(unknown_tool_error("tool", tool, &routed_tool_names()));
        };
        let handler = self.handlers.get(route.handler).ok_or_else(|| {
            ToolError::unknown(format!("Tool {} has no handler registered", tool))
        })?;
        validate_tool_args(tool, &args)?;
        handler.handle(route.tool, Self::without_format(args)).await
    }

    /// Runs one tool call. Failures never escape: they come back as an
    /// `isError` response rendered in the requested format.
    pub async fn execute(&self, tool: &str, args: Value) -> ToolResponse {
        let started = Instant::now();
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        let format = OutputFormat::parse(args.get("format").and_then(|v| v.as_str()));
        let result = self.dispatch(tool, args).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(output) => {
                self.logger.info(
                    "tool ok",
                    Some(&serde_json::json!({"tool": tool, "duration_ms": duration_ms})),
                );
                ToolResponse::text(render(&output, format))
            }
            Err(err) => {
                self.logger.warn(
                    "tool failed",
                    Some(&serde_json::json!({
                        "tool": tool,
                        "duration_ms": duration_ms,
                        "kind": err.kind.as_str(),
                        "message": err.message,
                    })),
                );
                ToolResponse::error(render_error(tool, &err, format))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::formatter::Report;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn handle(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
            if args.get("format").is_some() {
                return Err(ToolError::unknown("format leaked to handler"));
            }
            Ok(ToolOutput::new(
                serde_json::json!({"action": action}),
                Report::new(format!("ran {}", action)),
            ))
        }
    }

    fn executor() -> ToolExecutor {
        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        handlers.insert("account".to_string(), Arc::new(Echo));
        ToolExecutor::new(Logger::new("test"), handlers)
    }

    #[tokio::test]
    async fn routes_and_renders_requested_format() {
        let response = executor()
            .execute("contract_list", serde_json::json!({"format": "json"}))
            .await;
        assert!(!response.is_error());
        let parsed: Value = serde_json::from_str(response.first_text()).expect("json");
        assert_eq!(parsed["action"], "contract_list");

        let text = executor().execute("contract_list", Value::Null).await;
        assert!(text.first_text().starts_with("# ran contract_list"));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_response_with_suggestion() {
        let response = executor().execute("contract_lst", serde_json::json!({})).await;
        assert!(response.is_error());
        assert!(response.first_text().contains("contract_list"));
    }

    #[tokio::test]
    async fn schema_violations_become_error_responses() {
        let response = executor()
            .execute("contract_list", serde_json::json!({"bogus": 1}))
            .await;
        assert!(response.is_error());
        assert!(response.first_text().contains("bogus"));
    }

    #[tokio::test]
    async fn missing_handler_is_reported() {
        let response = executor().execute("dns_zone_list", serde_json::json!({})).await;
        assert!(response.is_error());
    }
}
