use crate::constants::limits::MAX_PURGE_OBJECTS;
use crate::errors::ToolError;
use crate::services::client::ApiRequest;
use crate::services::formatter::{Report, ToolOutput};
use crate::services::logger::Logger;
use crate::services::orchestrator::Orchestrator;
use crate::services::response::{Expected, ShapeCheck};
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::{ArgReader, Validation};
use crate::utils::data_path::lookup;
use crate::utils::ids::{strip_prefix, IdKind};
use crate::utils::text::display_value;
use crate::utils::tool_errors::unknown_tool_error;
use serde_json::Value;

const PURGE_ACTIONS: &[&str] = &["purge_urls", "purge_cpcodes", "purge_tags"];
const PURGE_KINDS: &[&str] = &["invalidate", "delete"];
const PURGE_NETWORKS: &[&str] = &["staging", "production"];

/// Reads a CP code list; accepts numbers, numeric strings and `cpc_` IDs.
pub(crate) fn read_cpcodes(reader: &mut ArgReader<'_>, field: &str, max: usize) -> Vec<u64> {
    let Some(items) = reader.optional_array(field) else {
        if !reader.has_violations() {
            reader.violate(field, "is required");
        }
        return Vec::new();
    };
    if items.is_empty() || items.len() > max {
        reader.violate(
            field,
            format!("must contain between 1 and {} items (got {})", max, items.len()),
        );
    }
    let mut out = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        let parsed = item.as_u64().or_else(|| {
            item.as_str()
                .and_then(|s| strip_prefix(s.trim(), IdKind::CpCode).parse::<u64>().ok())
        });
        match parsed {
            Some(code) => out.push(code),
            None => reader.violate(&format!("{}[{}]", field, idx), "must be a numeric CP code"),
        }
    }
    out
}

/// FastPurge by URL, CP code or cache tag.
#[derive(Clone)]
pub struct PurgeManager {
    logger: Logger,
    validation: Validation,
    orchestrator: Orchestrator,
}

impl PurgeManager {
    pub fn new(logger: Logger, validation: Validation, orchestrator: Orchestrator) -> Self {
        Self {
            logger: logger.child("purge"),
            validation,
            orchestrator,
        }
    }

    pub async fn handle_action(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(&args);
        let objects: Vec<Value> = match action {
            "purge_urls" => reader
                .url_array("urls", 1, MAX_PURGE_OBJECTS)
                .into_iter()
                .map(Value::String)
                .collect(),
            "purge_cpcodes" => read_cpcodes(&mut reader, "cpcodes", MAX_PURGE_OBJECTS)
                .into_iter()
                .map(|code| serde_json::json!(code))
                .collect(),
            "purge_tags" => reader
                .string_array("tags", 1, MAX_PURGE_OBJECTS)
                .into_iter()
                .map(Value::String)
                .collect(),
            other => return Err(unknown_tool_error("purge action", other, PURGE_ACTIONS)),
        };
        let kind = reader
            .enum_value("action", PURGE_KINDS, Some("invalidate"))
            .unwrap_or_default();
        let network = reader
            .enum_value("network", PURGE_NETWORKS, Some("production"))
            .unwrap_or_default();
        reader.finish()?;

        let target = match action {
            "purge_urls" => "url",
            "purge_cpcodes" => "cpcode",
            _ => "tag",
        };
        let response = self
            .orchestrator
            .call(
                action,
                ApiRequest::post(
                    format!("/ccu/v3/{}/{}/{}", kind, target, network),
                    serde_json::json!({"objects": objects}),
                ),
                &ShapeCheck::new().expect("purgeId", Expected::String),
            )
            .await?;
        let body = &response.body;
        let show = |key: &str| lookup(body, key).map(display_value).unwrap_or_else(|| "-".to_string());
        self.logger.info(
            "purge submitted",
            Some(&serde_json::json!({"action": kind, "target": target, "network": network, "objects": objects.len()})),
        );

        let report = Report::new(format!("Purge ({} by {}) submitted to {}", kind, target, network))
            .key_values(
                "Request",
                vec![
                    ("Purge ID".to_string(), show("purgeId")),
                    ("Support ID".to_string(), show("supportId")),
                    ("Objects".to_string(), objects.len().to_string()),
                    ("Estimated seconds".to_string(), show("estimatedSeconds")),
                ],
            );
        Ok(ToolOutput::new(
            serde_json::json!({
                "action": kind,
                "type": target,
                "network": network,
                "objects": objects,
                "purgeId": body.get("purgeId"),
                "supportId": body.get("supportId"),
                "estimatedSeconds": body.get("estimatedSeconds"),
            }),
            report,
        ))
    }
}

#[async_trait::async_trait]
impl ToolHandler for PurgeManager {
    async fn handle(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
        self.logger.debug("handle_action", Some(&Value::String(action.to_string())));
        self.handle_action(action, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ToolErrorKind;
    use crate::services::fake_api::FakeApi;
    use crate::services::orchestrator::tests::orchestrator_with;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn manager(api: Arc<FakeApi>) -> PurgeManager {
        PurgeManager::new(Logger::new("test"), Validation::new(), orchestrator_with(api))
    }

    #[tokio::test]
    async fn cpcodes_accept_prefixed_and_numeric_forms() {
        let api = Arc::new(FakeApi::new().on(
            Method::POST,
            "/ccu/v3/delete/cpcode/staging",
            201,
            json!({"purgeId": "p-1", "estimatedSeconds": 5}),
        ));
        let out = manager(api.clone())
            .handle_action(
                "purge_cpcodes",
                json!({"cpcodes": ["cpc_123", 456, "789"], "action": "DELETE", "network": "Staging"}),
            )
            .await
            .expect("purge");
        assert_eq!(out.data["purgeId"], "p-1");
        assert_eq!(api.calls()[0].body, Some(json!({"objects": [123, 456, 789]})));
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected_without_a_call() {
        let api = Arc::new(FakeApi::new());
        let err = manager(api.clone())
            .handle_action("purge_urls", json!({"urls": ["https://ok.example.com/a", "ftp://nope"], "network": "qa"}))
            .await
            .expect_err("invalid");
        assert_eq!(err.kind, ToolErrorKind::Validation);
        assert!(err.message.contains("urls[1]"));
        assert!(err.message.contains("network"));
        assert!(api.calls().is_empty());
    }
}
