use crate::constants::cache as ttl;
use crate::constants::limits::MAX_NETWORK_LIST_ELEMENTS;
use crate::constants::network::NETWORKS;
use crate::errors::ToolError;
use crate::services::cache::{CacheKey, KeyPattern, ResourceKind};
use crate::services::client::ApiRequest;
use crate::services::formatter::{Report, ToolOutput};
use crate::services::logger::Logger;
use crate::services::orchestrator::Orchestrator;
use crate::services::poller::{poll_until_terminal, OperationStatus, PollOutcome, PollableOperation};
use crate::services::response::{Expected, ShapeCheck};
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::{ArgReader, Validation};
use crate::utils::data_path::{lookup, lookup_items, lookup_str};
use crate::utils::text::display_value;
use crate::utils::tool_errors::unknown_tool_error;
use serde_json::Value;
use std::net::IpAddr;

const SECURITY_ACTIONS: &[&str] = &[
    "network_list_list",
    "network_list_get",
    "network_list_create",
    "network_list_add_elements",
    "network_list_activate",
    "appsec_config_list",
    "siem_events_get",
];

const LIST_TYPES: &[&str] = &["IP", "GEO"];
const NETWORK_LISTS: &str = "/network-list/v2/network-lists";
const SIEM_DEFAULT_WINDOW_SECS: u64 = 15 * 60;
const SIEM_MAX_EVENTS: u64 = 10_000;

fn field(item: &Value, path: &str) -> String {
    lookup(item, path)
        .map(display_value)
        .unwrap_or_else(|| "-".to_string())
}

/// An address or CIDR block, v4 or v6.
fn valid_ip_element(raw: &str) -> bool {
    match raw.split_once('/') {
        Some((addr, prefix)) => match (addr.parse::<IpAddr>(), prefix.parse::<u8>()) {
            (Ok(IpAddr::V4(_)), Ok(bits)) => bits <= 32,
            (Ok(IpAddr::V6(_)), Ok(bits)) => bits <= 128,
            _ => false,
        },
        None => raw.parse::<IpAddr>().is_ok(),
    }
}

fn valid_geo_element(raw: &str) -> bool {
    raw.len() == 2 && raw.chars().all(|c| c.is_ascii_alphabetic())
}

fn check_elements(reader: &mut ArgReader<'_>, field: &str, list_type: Option<&str>, elements: &[String]) {
    let Some(list_type) = list_type else {
        return;
    };
    for (idx, element) in elements.iter().enumerate() {
        let ok = match list_type {
            "GEO" => valid_geo_element(element),
            _ => valid_ip_element(element),
        };
        if !ok {
            let expected = if list_type == "GEO" {
                "a two-letter country code"
            } else {
                "an IP address or CIDR block"
            };
            reader.violate(&format!("{}[{}]", field, idx), format!("'{}' is not {}", element, expected));
        }
    }
}

/// Splits a SIEM NDJSON payload into events and the trailing offset
/// context line.
fn split_siem_payload(body: &Value) -> (Vec<Value>, Option<Value>) {
    let lines: Vec<Value> = match body {
        Value::String(text) => text
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .collect(),
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    };
    let mut events = Vec::new();
    let mut context = None;
    for line in lines {
        if line.get("offset").is_some() && line.get("attackData").is_none() {
            context = Some(line);
        } else {
            events.push(line);
        }
    }
    (events, context)
}

/// Network Lists, Application Security configurations and SIEM events.
#[derive(Clone)]
pub struct SecurityManager {
    logger: Logger,
    validation: Validation,
    orchestrator: Orchestrator,
}

impl SecurityManager {
    pub fn new(logger: Logger, validation: Validation, orchestrator: Orchestrator) -> Self {
        Self {
            logger: logger.child("security"),
            validation,
            orchestrator,
        }
    }

    pub async fn handle_action(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
        match action {
            "network_list_list" => self.list_lists(&args).await,
            "network_list_get" => self.get_list(&args).await,
            "network_list_create" => self.create_list(&args).await,
            "network_list_add_elements" => self.add_elements(&args).await,
            "network_list_activate" => self.activate_list(&args).await,
            "appsec_config_list" => self.appsec_configs().await,
            "siem_events_get" => self.siem_events(&args).await,
            other => Err(unknown_tool_error("security action", other, SECURITY_ACTIONS)),
        }
    }

    async fn list_lists(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let search = reader.optional_string("search");
        let list_type = match args.get("type") {
            Some(_) => reader.enum_value("type", LIST_TYPES, None),
            None => None,
        };
        let include_elements = reader.bool_or("includeElements", false);
        reader.finish()?;

        let detail = format!(
            "{}|{}|{}",
            search.as_deref().unwrap_or(""),
            list_type.as_deref().unwrap_or(""),
            include_elements
        );
        let fetched = self
            .orchestrator
            .cached_read(
                "network_list_list",
                CacheKey::new(ResourceKind::NetworkLists, "all", detail),
                ttl::NETWORK_LISTS_TTL,
                ApiRequest::get(NETWORK_LISTS)
                    .with_optional_query("search", search.as_deref())
                    .with_optional_query("listType", list_type.as_deref())
                    .with_query("includeElements", include_elements.to_string()),
                &ShapeCheck::new().expect("networkLists", Expected::Array),
            )
            .await?;
        let lists = lookup_items(&fetched.body, "networkLists");
        let rows = lists
            .iter()
            .map(|l| {
                vec![
                    field(l, "uniqueId"),
                    field(l, "name"),
                    field(l, "type"),
                    field(l, "elementCount"),
                    field(l, "syncPoint"),
                ]
            })
            .collect();
        let report = Report::new("Network lists")
            .summary(format!("{} list(s).", lists.len()))
            .table("Network lists", &["ID", "Name", "Type", "Elements", "Sync point"], rows);
        Ok(ToolOutput::new(
            serde_json::json!({"networkLists": lists, "cached": fetched.cached}),
            report,
        ))
    }

    async fn get_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let list_id = reader.required_string("networkListId");
        let include_elements = reader.bool_or("includeElements", true);
        reader.finish()?;
        let list_id = list_id.unwrap_or_default();

        let fetched = self
            .orchestrator
            .cached_read(
                "network_list_get",
                CacheKey::new(ResourceKind::NetworkLists, list_id.as_str(), include_elements.to_string()),
                ttl::NETWORK_LISTS_TTL,
                ApiRequest::get(format!("{}/{}", NETWORK_LISTS, list_id))
                    .with_query("includeElements", include_elements.to_string()),
                &ShapeCheck::new().expect("uniqueId", Expected::String),
            )
            .await?;
        let list = &fetched.body;
        let elements: Vec<String> = lookup_items(list, "list").iter().map(display_value).collect();
        let mut report = Report::new(format!("Network list {}", field(list, "name"))).key_values(
            "List",
            vec![
                ("ID".to_string(), list_id.clone()),
                ("Type".to_string(), field(list, "type")),
                ("Elements".to_string(), field(list, "elementCount")),
                ("Sync point".to_string(), field(list, "syncPoint")),
                ("Description".to_string(), field(list, "description")),
            ],
        );
        if include_elements {
            report = report.bullets("Elements", elements);
        }
        Ok(ToolOutput::new(list.clone(), report))
    }

    async fn create_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let name = reader.required_string("name");
        let list_type = reader.enum_value("type", LIST_TYPES, None);
        let description = reader.optional_string("description");
        let elements = reader.string_array("elements", 0, MAX_NETWORK_LIST_ELEMENTS);
        check_elements(&mut reader, "elements", list_type.as_deref(), &elements);
        reader.finish()?;
        let name = name.unwrap_or_default();
        let list_type = list_type.unwrap_or_default();

        let response = self
            .orchestrator
            .mutate(
                "network_list_create",
                ApiRequest::post(
                    NETWORK_LISTS,
                    serde_json::json!({
                        "name": name,
                        "type": list_type,
                        "description": description,
                        "list": elements,
                    }),
                ),
                &ShapeCheck::new().expect("uniqueId", Expected::String),
                &[KeyPattern::kind(ResourceKind::NetworkLists)],
            )
            .await?;
        let list_id = lookup_str(&response.body, "uniqueId").unwrap_or_default().to_string();
        let report = Report::new(format!("Network list {} created", name)).key_values(
            "List",
            vec![
                ("ID".to_string(), list_id.clone()),
                ("Type".to_string(), list_type.clone()),
                ("Elements".to_string(), elements.len().to_string()),
            ],
        );
        Ok(ToolOutput::new(
            serde_json::json!({"networkListId": list_id, "name": name, "type": list_type, "elementCount": elements.len()}),
            report,
        ))
    }

    async fn add_elements(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let list_id = reader.required_string("networkListId");
        let elements = reader.string_array("elements", 1, MAX_NETWORK_LIST_ELEMENTS);
        reader.finish()?;
        let list_id = list_id.unwrap_or_default();

        let response = self
            .orchestrator
            .mutate(
                "network_list_add_elements",
                ApiRequest::post(
                    format!("{}/{}/append", NETWORK_LISTS, list_id),
                    serde_json::json!({"list": elements}),
                ),
                &ShapeCheck::new().expect("uniqueId", Expected::String),
                &[KeyPattern::kind(ResourceKind::NetworkLists)],
            )
            .await?;
        let report = Report::new(format!("{} element(s) appended to {}", elements.len(), list_id))
            .summary(format!(
                "The list now holds {} element(s). Activate it with network_list_activate.",
                field(&response.body, "elementCount")
            ));
        Ok(ToolOutput::new(
            serde_json::json!({
                "networkListId": list_id,
                "appended": elements.len(),
                "elementCount": response.body.get("elementCount"),
                "syncPoint": response.body.get("syncPoint"),
            }),
            report,
        ))
    }

    async fn activate_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let list_id = reader.required_string("networkListId");
        let network = reader.enum_value("network", NETWORKS, None);
        let comment = reader.string_or("comment", "Activated through akamai-mcp");
        let recipients = reader.string_array("notificationRecipients", 0, 50);
        let wait = reader.bool_or("wait", false);
        reader.finish()?;
        let list_id = list_id.unwrap_or_default();
        let network = network.unwrap_or_default();

        let environment = format!("{}/{}/environments/{}", NETWORK_LISTS, list_id, network);
        let response = self
            .orchestrator
            .mutate(
                "network_list_activate",
                ApiRequest::post(
                    format!("{}/activate", environment),
                    serde_json::json!({"comments": comment, "notificationRecipients": recipients}),
                ),
                &ShapeCheck::new().expect("activationStatus", Expected::String),
                &[KeyPattern::scoped(ResourceKind::NetworkLists, list_id.as_str())],
            )
            .await?;

        let mut data = serde_json::json!({
            "networkListId": list_id,
            "network": network,
            "activationId": response.body.get("activationId"),
            "status": response.body.get("activationStatus"),
        });
        let mut report = Report::new(format!("Activation of {} on {}", list_id, network));
        if !wait {
            report = report.summary(format!(
                "Submitted with status {}.",
                field(&response.body, "activationStatus")
            ));
            return Ok(ToolOutput::new(data, report));
        }

        let orchestrator = self.orchestrator.clone();
        let status_path = format!("{}/status", environment);
        let outcome = poll_until_terminal(
            &self.logger,
            PollableOperation::submitted(list_id.as_str(), "network list activation"),
            self.orchestrator.poll_settings(&network),
            |_| {
                let orchestrator = orchestrator.clone();
                let request = ApiRequest::get(status_path.clone());
                async move {
                    let body = orchestrator
                        .fetch(
                            "network_list_activate",
                            request,
                            &ShapeCheck::new().expect("activationStatus", Expected::String),
                        )
                        .await?;
                    let status = OperationStatus::from_vendor(
                        lookup_str(&body, "activationStatus").unwrap_or("UNKNOWN"),
                    );
                    Ok((status, body))
                }
            },
        )
        .await?
        .into_result()?;
        if let Value::Object(map) = &mut data {
            map.insert("status".to_string(), Value::String(outcome.label().to_string()));
            map.insert("attempts".to_string(), serde_json::json!(outcome.attempts()));
        }
        report = match outcome {
            PollOutcome::Failed { .. } => report.notice(format!("Activation of {} on {} failed.", list_id, network)),
            _ => report.summary(format!("{} is active on {}.", list_id, network)),
        };
        Ok(ToolOutput::new(data, report))
    }

    async fn appsec_configs(&self) -> Result<ToolOutput, ToolError> {
        let fetched = self
            .orchestrator
            .cached_read(
                "appsec_config_list",
                CacheKey::kind_only(ResourceKind::AppsecConfigs),
                ttl::APPSEC_CONFIGS_TTL,
                ApiRequest::get("/appsec/v1/configs"),
                &ShapeCheck::new().expect("configurations", Expected::Array),
            )
            .await?;
        let configs = lookup_items(&fetched.body, "configurations");
        let rows = configs
            .iter()
            .map(|c| {
                vec![
                    field(c, "id"),
                    field(c, "name"),
                    field(c, "latestVersion"),
                    field(c, "stagingVersion"),
                    field(c, "productionVersion"),
                ]
            })
            .collect();
        let report = Report::new("Application Security configurations")
            .summary(format!("{} configuration(s).", configs.len()))
            .table("Configurations", &["ID", "Name", "Latest", "Staging", "Production"], rows);
        Ok(ToolOutput::new(
            serde_json::json!({"configurations": configs, "cached": fetched.cached}),
            report,
        ))
    }

    async fn siem_events(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let config_id = reader.required_u64("configId", 1, u32::MAX as u64);
        let from = reader.optional_u64("from", 0, i64::MAX as u64);
        let to = reader.optional_u64("to", 0, i64::MAX as u64);
        let limit = reader.optional_u64("limit", 1, SIEM_MAX_EVENTS).unwrap_or(100);
        if let (Some(from), Some(to)) = (from, to) {
            if from >= to {
                reader.violate("to", "must be later than from");
            }
        }
        reader.finish()?;
        let config_id = config_id.unwrap_or_default();
        let from = from.unwrap_or_else(|| (chrono::Utc::now().timestamp().max(0) as u64).saturating_sub(SIEM_DEFAULT_WINDOW_SECS));

        let body = self
            .orchestrator
            .fetch(
                "siem_events_get",
                ApiRequest::get(format!("/siem/v1/configs/{}", config_id))
                    .with_query("from", from.to_string())
                    .with_optional_query("to", to.map(|t| t.to_string()))
                    .with_query("limit", limit.to_string()),
                &ShapeCheck::new(),
            )
            .await?;
        let (events, context) = split_siem_payload(&body);
        let rows = events
            .iter()
            .map(|e| {
                vec![
                    field(e, "httpMessage.start"),
                    field(e, "attackData.clientIP"),
                    field(e, "httpMessage.host"),
                    field(e, "httpMessage.path"),
                    field(e, "httpMessage.status"),
                ]
            })
            .collect();
        let mut report = Report::new(format!("SIEM events for configuration {}", config_id))
            .summary(format!("{} event(s) since {}.", events.len(), from))
            .table("Events", &["Start", "Client IP", "Host", "Path", "Status"], rows);
        if let Some(offset) = context.as_ref().and_then(|c| c.get("offset")) {
            report = report.paragraph(format!("Resume offset: {}", display_value(offset)));
        }
        Ok(ToolOutput::new(
            serde_json::json!({
                "configId": config_id,
                "from": from,
                "to": to,
                "events": events,
                "context": context,
            }),
            report,
        ))
    }
}

#[async_trait::async_trait]
impl ToolHandler for SecurityManager {
    async fn handle(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
        self.logger.debug("handle_action", Some(&Value::String(action.to_string())));
        self.handle_action(action, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fake_api::FakeApi;
    use crate::services::orchestrator::tests::orchestrator_with;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn manager(api: Arc<FakeApi>) -> SecurityManager {
        SecurityManager::new(Logger::new("test"), Validation::new(), orchestrator_with(api))
    }

    #[test]
    fn ip_elements_accept_addresses_and_cidrs() {
        assert!(valid_ip_element("192.0.2.1"));
        assert!(valid_ip_element("192.0.2.0/24"));
        assert!(valid_ip_element("2001:db8::/32"));
        assert!(!valid_ip_element("192.0.2.0/33"));
        assert!(!valid_ip_element("example.com"));
        assert!(valid_geo_element("US"));
        assert!(!valid_geo_element("USA"));
    }

    #[test]
    fn siem_payload_separates_offset_context() {
        let body = Value::String(
            "{\"attackData\":{\"clientIP\":\"192.0.2.1\"},\"httpMessage\":{\"host\":\"a\"}}\n\
             {\"total\":1,\"offset\":\"abc\",\"limit\":10}\n"
                .to_string(),
        );
        let (events, context) = split_siem_payload(&body);
        assert_eq!(events.len(), 1);
        assert_eq!(context.map(|c| c["offset"].clone()), Some(json!("abc")));
    }

    #[tokio::test]
    async fn create_validates_elements_against_type() {
        let api = Arc::new(FakeApi::new());
        let err = manager(api.clone())
            .handle_action("network_list_create", json!({"name": "blocked", "type": "geo", "elements": ["US", "10.0.0.1"]}))
            .await
            .expect_err("invalid");
        assert!(err.message.contains("elements[1]"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn activation_waits_for_active_status() {
        let env = "/network-list/v2/network-lists/123_BLOCK/environments/PRODUCTION";
        let api = Arc::new(
            FakeApi::new()
                .on(Method::POST, &format!("{}/activate", env), 200,
                    json!({"activationId": 9, "activationStatus": "PENDING_ACTIVATION"}))
                .on(Method::GET, &format!("{}/status", env), 200, json!({"activationStatus": "PENDING_ACTIVATION"}))
                .on(Method::GET, &format!("{}/status", env), 200, json!({"activationStatus": "ACTIVE"})),
        );
        let out = manager(api)
            .handle_action(
                "network_list_activate",
                json!({"networkListId": "123_BLOCK", "network": "production", "wait": true}),
            )
            .await
            .expect("active");
        assert_eq!(out.data["status"], "COMPLETE");
        assert_eq!(out.data["attempts"], 2);
    }
}
