use crate::constants::cache as ttl;
use crate::constants::network::{NETWORKS, STAGING};
use crate::constants::search::{MAX_GROUPS_PER_CALL, MAX_PROPERTIES_PER_GROUP, SOFT_DEADLINE_MS};
use crate::errors::ToolError;
use crate::services::cache::{CacheKey, KeyPattern, ResourceKind};
use crate::services::client::ApiRequest;
use crate::services::formatter::{Report, ToolOutput};
use crate::services::logger::Logger;
use crate::services::orchestrator::{Fetched, Orchestrator};
use crate::services::poller::{poll_until_terminal, OperationStatus, PollOutcome, PollableOperation};
use crate::services::response::{extract_id_from_link, last_link_segment, Expected, ShapeCheck};
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::{ArgReader, Validation};
use crate::utils::data_path::{lookup, lookup_items, lookup_str};
use crate::utils::ids::IdKind;
use crate::utils::text::display_value;
use crate::utils::tool_errors::unknown_tool_error;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};

const PROPERTY_ACTIONS: &[&str] = &[
    "property_list",
    "property_get",
    "property_create",
    "property_delete",
    "property_version_create",
    "property_rules_get",
    "property_rules_update",
    "property_hostnames_list",
    "property_activate",
    "property_activation_status",
    "property_search",
    "property_bulk_search",
    "edge_hostname_list",
    "edge_hostname_create",
    "include_list",
];

const MAX_VERSION: u64 = 1_000_000;
const EDGE_SUFFIXES: &[&str] = &["edgesuite.net", "edgekey.net", "akamaized.net"];
const IP_BEHAVIORS: &[&str] = &["IPV4", "IPV6_COMPLIANCE", "IPV6_PERFORMANCE"];
const SECURE_NETWORKS: &[&str] = &["STANDARD_TLS", "ENHANCED_TLS", "SHARED_CERT"];

/// Optional contract/group pair forwarded as query parameters on
/// property-scoped PAPI calls.
#[derive(Debug, Clone, Default)]
struct Scope {
    contract: Option<String>,
    group: Option<String>,
}

impl Scope {
    fn read(reader: &mut ArgReader<'_>) -> Self {
        Self {
            contract: reader.optional_id("contractId", IdKind::Contract),
            group: reader.optional_id("groupId", IdKind::Group),
        }
    }

    fn apply(&self, request: ApiRequest) -> ApiRequest {
        request
            .with_optional_query("contractId", self.contract.as_deref())
            .with_optional_query("groupId", self.group.as_deref())
    }
}

fn property_path(property_id: &str) -> String {
    format!("/papi/v1/properties/{}", property_id)
}

fn version_path(property_id: &str, version: u64) -> String {
    format!("{}/versions/{}", property_path(property_id), version)
}

fn list_scope(contract: &str, group: &str) -> String {
    format!("{}:{}", contract, group)
}

fn field(item: &Value, path: &str) -> String {
    lookup(item, path)
        .map(display_value)
        .unwrap_or_else(|| "-".to_string())
}

/// Property Manager: properties, versions, rule trees, hostnames,
/// activations, edge hostnames and includes.
#[derive(Clone)]
pub struct PropertyManager {
    logger: Logger,
    validation: Validation,
    orchestrator: Orchestrator,
}

impl PropertyManager {
    pub fn new(logger: Logger, validation: Validation, orchestrator: Orchestrator) -> Self {
        Self {
            logger: logger.child("property"),
            validation,
            orchestrator,
        }
    }

    pub async fn handle_action(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
        match action {
            "property_list" => self.property_list(&args).await,
            "property_get" => self.property_get(&args).await,
            "property_create" => self.property_create(&args).await,
            "property_delete" => self.property_delete(&args).await,
            "property_version_create" => self.version_create(&args).await,
            "property_rules_get" => self.rules_get(&args).await,
            "property_rules_update" => self.rules_update(&args).await,
            "property_hostnames_list" => self.hostnames_list(&args).await,
            "property_activate" => self.activate(&args).await,
            "property_activation_status" => self.activation_status(&args).await,
            "property_search" => self.search(&args).await,
            "property_bulk_search" => self.bulk_search(&args).await,
            "edge_hostname_list" => self.edge_hostname_list(&args).await,
            "edge_hostname_create" => self.edge_hostname_create(&args).await,
            "include_list" => self.include_list(&args).await,
            other => Err(unknown_tool_error("property action", other, PROPERTY_ACTIONS)),
        }
    }

    async fn properties_in(&self, contract: &str, group: &str) -> Result<Fetched, ToolError> {
        let fetched = self
            .orchestrator
            .cached_read(
                "property_list",
                CacheKey::new(ResourceKind::Properties, list_scope(contract, group), ""),
                ttl::PROPERTIES_TTL,
                ApiRequest::get("/papi/v1/properties")
                    .with_query("contractId", contract)
                    .with_query("groupId", group),
                &ShapeCheck::items("properties"),
            )
            .await?;
        self.orchestrator.names().remember_items(
            lookup_items(&fetched.body, "properties.items"),
            "propertyId",
            "propertyName",
        );
        Ok(fetched)
    }

    async fn property_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let scope = Scope::read(&mut reader);
        reader.finish()?;

        let (contract, group) = self
            .orchestrator
            .resolve_contract_and_group(scope.contract, scope.group)
            .await?;
        let fetched = self.properties_in(&contract, &group).await?;
        let items = lookup_items(&fetched.body, "properties.items");
        let group_label = self.orchestrator.names().label(&group);

        let rows = items
            .iter()
            .map(|p| {
                vec![
                    field(p, "propertyId"),
                    field(p, "propertyName"),
                    field(p, "latestVersion"),
                    field(p, "stagingVersion"),
                    field(p, "productionVersion"),
                ]
            })
            .collect();
        let report = Report::new(format!("Properties in {}", group_label))
            .summary(format!("{} propert(ies) on contract {}.", items.len(), contract))
            .table(
                "Properties",
                &["Property ID", "Name", "Latest", "Staging", "Production"],
                rows,
            );
        Ok(ToolOutput::new(
            serde_json::json!({
                "contractId": contract,
                "groupId": group,
                "groupName": self.orchestrator.names().get(&group),
                "properties": items,
                "cached": fetched.cached,
            }),
            report,
        ))
    }

    async fn load_property(&self, property_id: &str, scope: &Scope, cached: bool) -> Result<Value, ToolError> {
        let request = scope.apply(ApiRequest::get(property_path(property_id)));
        let shape = ShapeCheck::items("properties");
        let body = if cached {
            self.orchestrator
                .cached_read(
                    "property_get",
                    CacheKey::new(ResourceKind::Property, property_id, ""),
                    ttl::PROPERTY_TTL,
                    request,
                    &shape,
                )
                .await?
                .body
        } else {
            self.orchestrator.fetch("property_get", request, &shape).await?
        };
        lookup_items(&body, "properties.items")
            .first()
            .cloned()
            .ok_or_else(|| {
                ToolError::not_found(format!("Property {} was not found", property_id))
                    .with_hint("Use property_list or property_search to find the property ID.")
            })
    }

    async fn property_get(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let property_id = reader.required_id("propertyId", IdKind::Property);
        let scope = Scope::read(&mut reader);
        reader.finish()?;
        let property_id = property_id.unwrap_or_default();

        let property = self.load_property(&property_id, &scope, true).await?;
        let pairs = [
            "propertyName",
            "contractId",
            "groupId",
            "productId",
            "latestVersion",
            "stagingVersion",
            "productionVersion",
            "assetId",
        ]
        .iter()
        .map(|key| (key.to_string(), field(&property, key)))
        .collect();
        let report = Report::new(format!("Property {}", property_id)).key_values("Details", pairs);
        Ok(ToolOutput::new(property, report))
    }

    async fn property_create(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let name = reader.required_string("propertyName");
        let product = reader.required_id("productId", IdKind::Product);
        let scope = Scope::read(&mut reader);
        let rule_format = reader.optional_string("ruleFormat");
        reader.finish()?;
        let name = name.unwrap_or_default();
        let product = product.unwrap_or_default();

        let (contract, group) = self
            .orchestrator
            .resolve_contract_and_group(scope.contract, scope.group)
            .await?;
        let mut body = serde_json::json!({"productId": product, "propertyName": name});
        if let (Some(format), Value::Object(map)) = (&rule_format, &mut body) {
            map.insert("ruleFormat".to_string(), Value::String(format.clone()));
        }
        let request = ApiRequest::post("/papi/v1/properties", body)
            .with_query("contractId", contract.as_str())
            .with_query("groupId", group.as_str());
        let response = self
            .orchestrator
            .mutate(
                "property_create",
                request,
                &ShapeCheck::new().expect("propertyLink", Expected::String),
                &[KeyPattern::kind(ResourceKind::Properties)],
            )
            .await?;
        let link = lookup_str(&response.body, "propertyLink").unwrap_or_default();
        let property_id = extract_id_from_link(link, IdKind::Property).ok_or_else(|| {
            ToolError::malformed(format!("propertyLink '{}' does not contain a property ID", link))
        })?;
        self.orchestrator.names().insert(&property_id, &name);

        let report = Report::new(format!("Property {} created", name))
            .key_values(
                "Property",
                vec![
                    ("Property ID".to_string(), property_id.clone()),
                    ("Contract".to_string(), contract.clone()),
                    ("Group".to_string(), group.clone()),
                    ("Product".to_string(), product.clone()),
                ],
            )
            .bullets(
                "Next steps",
                vec![
                    format!("Edit the rule tree of version 1 with property_rules_update (propertyId {}).", property_id),
                    "Attach hostnames, then activate with property_activate.".to_string(),
                ],
            );
        Ok(ToolOutput::new(
            serde_json::json!({
                "propertyId": property_id,
                "propertyName": name,
                "contractId": contract,
                "groupId": group,
                "productId": product,
                "propertyLink": link,
            }),
            report,
        ))
    }

    async fn property_delete(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let property_id = reader.required_id("propertyId", IdKind::Property);
        let scope = Scope::read(&mut reader);
        reader.finish()?;
        let property_id = property_id.unwrap_or_default();

        let response = self
            .orchestrator
            .mutate(
                "property_delete",
                scope.apply(ApiRequest::delete(property_path(&property_id))),
                &ShapeCheck::new(),
                &[
                    KeyPattern::kind(ResourceKind::Properties),
                    KeyPattern::scoped(ResourceKind::Property, property_id.as_str()),
                    KeyPattern::scoped(ResourceKind::Rules, property_id.as_str()),
                    KeyPattern::scoped(ResourceKind::Hostnames, property_id.as_str()),
                ],
            )
            .await?;
        let report = Report::new(format!("Property {} deleted", property_id));
        Ok(ToolOutput::new(
            serde_json::json!({"propertyId": property_id, "deleted": true, "response": response.body}),
            report,
        ))
    }

    async fn version_create(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let property_id = reader.required_id("propertyId", IdKind::Property);
        let base = reader.optional_u64("createFromVersion", 1, MAX_VERSION);
        let scope = Scope::read(&mut reader);
        reader.finish()?;
        let property_id = property_id.unwrap_or_default();

        let base = match base {
            Some(version) => version,
            None => {
                let property = self.load_property(&property_id, &scope, false).await?;
                property
                    .get("latestVersion")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| {
                        ToolError::malformed(format!("Property {} has no latestVersion", property_id))
                    })?
            }
        };
        let response = self
            .orchestrator
            .mutate(
                "property_version_create",
                scope.apply(ApiRequest::post(
                    format!("{}/versions", property_path(&property_id)),
                    serde_json::json!({"createFromVersion": base}),
                )),
                &ShapeCheck::new().expect("versionLink", Expected::String),
                &[
                    KeyPattern::kind(ResourceKind::Properties),
                    KeyPattern::scoped(ResourceKind::Property, property_id.as_str()),
                ],
            )
            .await?;
        let link = lookup_str(&response.body, "versionLink").unwrap_or_default();
        let version = last_link_segment(link)
            .and_then(|segment| segment.parse::<u64>().ok())
            .ok_or_else(|| ToolError::malformed(format!("versionLink '{}' does not end in a version number", link)))?;

        let report = Report::new(format!("Version {} of {} created", version, property_id))
            .summary(format!("Copied from version {}.", base));
        Ok(ToolOutput::new(
            serde_json::json!({
                "propertyId": property_id,
                "version": version,
                "createdFromVersion": base,
                "versionLink": link,
            }),
            report,
        ))
    }

    async fn rules_get(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let property_id = reader.required_id("propertyId", IdKind::Property);
        let version = reader.required_u64("version", 1, MAX_VERSION);
        let scope = Scope::read(&mut reader);
        reader.finish()?;
        let property_id = property_id.unwrap_or_default();
        let version = version.unwrap_or_default();

        let fetched = self
            .orchestrator
            .cached_read(
                "property_rules_get",
                CacheKey::new(ResourceKind::Rules, property_id.as_str(), version.to_string()),
                ttl::RULES_TTL,
                scope.apply(ApiRequest::get(format!("{}/rules", version_path(&property_id, version)))),
                &ShapeCheck::new().expect("rules", Expected::Object),
            )
            .await?;
        let body = &fetched.body;
        let rules = lookup(body, "rules").cloned().unwrap_or(Value::Null);
        let behaviors: Vec<String> = lookup_items(&rules, "behaviors")
            .iter()
            .filter_map(|b| lookup_str(b, "name").map(|s| s.to_string()))
            .collect();
        let children: Vec<String> = lookup_items(&rules, "children")
            .iter()
            .filter_map(|c| lookup_str(c, "name").map(|s| s.to_string()))
            .collect();

        let report = Report::new(format!("Rules of {} v{}", property_id, version))
            .key_values(
                "Rule tree",
                vec![
                    ("Rule format".to_string(), field(body, "ruleFormat")),
                    ("ETag".to_string(), field(body, "etag")),
                    ("Root behaviors".to_string(), behaviors.len().to_string()),
                    ("Child rules".to_string(), children.len().to_string()),
                ],
            )
            .bullets("Behaviors", behaviors)
            .bullets("Child rules", children)
            .paragraph("Use format=json for the complete rule tree.");
        Ok(ToolOutput::new(
            serde_json::json!({
                "propertyId": property_id,
                "version": version,
                "etag": body.get("etag"),
                "ruleFormat": body.get("ruleFormat"),
                "rules": rules,
                "cached": fetched.cached,
            }),
            report,
        ))
    }

    async fn rules_update(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let property_id = reader.required_id("propertyId", IdKind::Property);
        let version = reader.required_u64("version", 1, MAX_VERSION);
        let rules = reader.required_object("rules");
        let etag = reader.optional_string("etag");
        let scope = Scope::read(&mut reader);
        if let Some(rules) = &rules {
            if rules.get("name").and_then(|v| v.as_str()) != Some("default") {
                reader.violate("rules", "root rule must be named 'default'");
            }
        }
        reader.finish()?;
        let property_id = property_id.unwrap_or_default();
        let version = version.unwrap_or_default();
        let rules = rules.unwrap_or_else(Map::new);

        let mut request = scope.apply(ApiRequest::put(
            format!("{}/rules", version_path(&property_id, version)),
            serde_json::json!({"rules": rules}),
        ));
        if let Some(etag) = &etag {
            request = request.with_header("If-Match", etag.as_str());
        }
        let response = self
            .orchestrator
            .mutate(
                "property_rules_update",
                request,
                &ShapeCheck::new().expect("rules", Expected::Object),
                &[KeyPattern::scoped(ResourceKind::Rules, property_id.as_str())],
            )
            .await?;
        let problems: Vec<String> = lookup_items(&response.body, "errors")
            .iter()
            .map(|e| {
                format!(
                    "{}: {}",
                    lookup_str(e, "errorLocation").unwrap_or("(rules)"),
                    lookup_str(e, "detail").or_else(|| lookup_str(e, "title")).unwrap_or("invalid")
                )
            })
            .collect();

        let mut report = Report::new(format!("Rules of {} v{} updated", property_id, version))
            .summary(format!("New ETag: {}", field(&response.body, "etag")));
        if !problems.is_empty() {
            report = report
                .notice(format!(
                    "{} validation error(s) were reported; activation will fail until they are fixed.",
                    problems.len()
                ))
                .bullets("Validation errors", problems.clone());
        }
        Ok(ToolOutput::new(
            serde_json::json!({
                "propertyId": property_id,
                "version": version,
                "etag": response.body.get("etag"),
                "errors": response.body.get("errors").cloned().unwrap_or(Value::Array(Vec::new())),
            }),
            report,
        ))
    }

    async fn hostnames_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let property_id = reader.required_id("propertyId", IdKind::Property);
        let version = reader.required_u64("version", 1, MAX_VERSION);
        let scope = Scope::read(&mut reader);
        reader.finish()?;
        let property_id = property_id.unwrap_or_default();
        let version = version.unwrap_or_default();

        let fetched = self
            .orchestrator
            .cached_read(
                "property_hostnames_list",
                CacheKey::new(ResourceKind::Hostnames, property_id.as_str(), version.to_string()),
                ttl::HOSTNAMES_TTL,
                scope.apply(ApiRequest::get(format!("{}/hostnames", version_path(&property_id, version)))),
                &ShapeCheck::items("hostnames"),
            )
            .await?;
        let items = lookup_items(&fetched.body, "hostnames.items");
        let rows = items
            .iter()
            .map(|h| {
                vec![
                    field(h, "cnameFrom"),
                    field(h, "cnameTo"),
                    field(h, "certProvisioningType"),
                ]
            })
            .collect();
        let report = Report::new(format!("Hostnames of {} v{}", property_id, version))
            .table("Hostnames", &["Hostname", "Edge hostname", "Certificate"], rows);
        Ok(ToolOutput::new(
            serde_json::json!({
                "propertyId": property_id,
                "version": version,
                "hostnames": items,
                "cached": fetched.cached,
            }),
            report,
        ))
    }

    async fn poll_activation(
        &self,
        property_id: &str,
        activation_id: &str,
        network: &str,
        scope: &Scope,
    ) -> Result<PollOutcome, ToolError> {
        let path = format!("{}/activations/{}", property_path(property_id), activation_id);
        let orchestrator = self.orchestrator.clone();
        let scope = scope.clone();
        poll_until_terminal(
            &self.logger,
            PollableOperation::submitted(activation_id, "property activation"),
            self.orchestrator.poll_settings(network),
            |_| {
                let orchestrator = orchestrator.clone();
                let request = scope.apply(ApiRequest::get(path.clone()));
                async move {
                    let body = orchestrator
                        .fetch("property_activation_status", request, &ShapeCheck::items("activations"))
                        .await?;
                    let status = OperationStatus::from_vendor(
                        lookup_str(&body, "activations.items[0].status").unwrap_or("UNKNOWN"),
                    );
                    Ok((status, body))
                }
            },
        )
        .await?
        .into_result()
    }

    async fn activate(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let property_id = reader.required_id("propertyId", IdKind::Property);
        let version = reader.required_u64("version", 1, MAX_VERSION);
        let network = reader.enum_value("network", NETWORKS, None);
        let emails = reader.string_array("notifyEmails", 1, 50);
        let note = reader.string_or("note", "Activated through akamai-mcp");
        let acknowledge = reader.bool_or("acknowledgeAllWarnings", true);
        let wait = reader.bool_or("wait", false);
        let scope = Scope::read(&mut reader);
        reader.finish()?;
        let property_id = property_id.unwrap_or_default();
        let version = version.unwrap_or_default();
        let network = network.unwrap_or_else(|| STAGING.to_string());

        let response = self
            .orchestrator
            .mutate(
                "property_activate",
                scope.apply(ApiRequest::post(
                    format!("{}/activations", property_path(&property_id)),
                    serde_json::json!({
                        "propertyVersion": version,
                        "network": network,
                        "notifyEmails": emails,
                        "note": note,
                        "acknowledgeAllWarnings": acknowledge,
                    }),
                )),
                &ShapeCheck::new().expect("activationLink", Expected::String),
                &[
                    KeyPattern::kind(ResourceKind::Properties),
                    KeyPattern::scoped(ResourceKind::Property, property_id.as_str()),
                ],
            )
            .await?;
        let link = lookup_str(&response.body, "activationLink").unwrap_or_default();
        let activation_id = extract_id_from_link(link, IdKind::Activation).ok_or_else(|| {
            ToolError::malformed(format!("activationLink '{}' does not contain an activation ID", link))
        })?;

        let mut data = serde_json::json!({
            "propertyId": property_id,
            "version": version,
            "network": network,
            "activationId": activation_id,
            "status": "SUBMITTED",
        });
        let mut report = Report::new(format!("Activation of {} v{} on {}", property_id, version, network))
            .key_values("Activation", vec![("Activation ID".to_string(), activation_id.clone())]);

        if wait {
            let outcome = self
                .poll_activation(&property_id, &activation_id, &network, &scope)
                .await?;
            if let Value::Object(map) = &mut data {
                map.insert("status".to_string(), Value::String(outcome.label().to_string()));
                map.insert("attempts".to_string(), serde_json::json!(outcome.attempts()));
                map.insert("activation".to_string(), lookup(outcome.last(), "activations.items[0]").cloned().unwrap_or(Value::Null));
            }
            report = match outcome {
                PollOutcome::Failed { .. } => report.notice(format!(
                    "Activation {} failed on {}. Review the activation warnings and errors.",
                    activation_id, network
                )),
                _ => report.summary(format!("{} v{} is active on {}.", property_id, version, network)),
            };
        } else {
            report = report.summary(format!(
                "Activation submitted. Check progress with property_activation_status (activationId {}).",
                activation_id
            ));
        }
        Ok(ToolOutput::new(data, report))
    }

    async fn activation_status(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let property_id = reader.required_id("propertyId", IdKind::Property);
        let activation_id = reader.required_id("activationId", IdKind::Activation);
        let scope = Scope::read(&mut reader);
        reader.finish()?;
        let property_id = property_id.unwrap_or_default();
        let activation_id = activation_id.unwrap_or_default();

        let body = self
            .orchestrator
            .fetch(
                "property_activation_status",
                scope.apply(ApiRequest::get(format!(
                    "{}/activations/{}",
                    property_path(&property_id),
                    activation_id
                ))),
                &ShapeCheck::items("activations"),
            )
            .await?;
        let activation = lookup(&body, "activations.items[0]").cloned().ok_or_else(|| {
            ToolError::not_found(format!("Activation {} was not found", activation_id))
        })?;
        let status = OperationStatus::from_vendor(lookup_str(&activation, "status").unwrap_or("UNKNOWN"));
        let report = Report::new(format!("Activation {}", activation_id)).key_values(
            "Status",
            vec![
                ("Status".to_string(), field(&activation, "status")),
                ("Network".to_string(), field(&activation, "network")),
                ("Version".to_string(), field(&activation, "propertyVersion")),
                ("Submitted".to_string(), field(&activation, "submitDate")),
                ("Updated".to_string(), field(&activation, "updateDate")),
            ],
        );
        Ok(ToolOutput::new(
            serde_json::json!({
                "propertyId": property_id,
                "activationId": activation_id,
                "status": status,
                "activation": activation,
            }),
            report,
        ))
    }

    /// Name search over a bounded window of groups. The cursor is the index
    /// of the next group to scan.
    async fn search(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let query = reader.required_string("query");
        let contract = reader.optional_id("contractId", IdKind::Contract);
        let cursor = reader.optional_string("cursor");
        let max_groups = reader
            .optional_u64("maxGroups", 1, 20)
            .map(|n| n as usize)
            .unwrap_or(MAX_GROUPS_PER_CALL);
        let start = match cursor.as_deref().map(|c| c.parse::<usize>()) {
            Some(Ok(index)) => index,
            Some(Err(_)) => {
                reader.violate("cursor", "must be a next_cursor value from a previous call");
                0
            }
            None => 0,
        };
        reader.finish()?;
        let query = query.unwrap_or_default();
        let needle = query.to_lowercase();

        let groups = self.orchestrator.groups().await?;
        let mut targets: Vec<(String, String)> = Vec::new();
        for group in lookup_items(&groups.body, "groups.items") {
            let Some(group_id) = lookup_str(group, "groupId") else {
                continue;
            };
            for contract_id in lookup_items(group, "contractIds").iter().filter_map(|c| c.as_str()) {
                if contract.as_deref().map(|c| c == contract_id).unwrap_or(true) {
                    targets.push((contract_id.to_string(), group_id.to_string()));
                }
            }
        }

        let started = Instant::now();
        let deadline = Duration::from_millis(SOFT_DEADLINE_MS);
        let mut matches = Vec::new();
        let mut skipped = Vec::new();
        let mut next = start;
        for (contract_id, group_id) in targets.iter().skip(start).take(max_groups) {
            if next > start && started.elapsed() >= deadline {
                break;
            }
            next += 1;
            let fetched = match self.properties_in(contract_id, group_id).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    skipped.push(serde_json::json!({"groupId": group_id, "error": err.message}));
                    continue;
                }
            };
            let hits = lookup_items(&fetched.body, "properties.items")
                .iter()
                .filter(|p| {
                    lookup_str(p, "propertyName")
                        .map(|name| name.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
                .take(MAX_PROPERTIES_PER_GROUP);
            for hit in hits {
                matches.push(serde_json::json!({
                    "propertyId": hit.get("propertyId"),
                    "propertyName": hit.get("propertyName"),
                    "contractId": contract_id,
                    "groupId": group_id,
                    "latestVersion": hit.get("latestVersion"),
                    "stagingVersion": hit.get("stagingVersion"),
                    "productionVersion": hit.get("productionVersion"),
                }));
            }
        }
        let truncated = next < targets.len();
        let next_cursor = truncated.then(|| next.to_string());
        self.logger.debug(
            "property search",
            Some(&serde_json::json!({
                "query": query,
                "scanned": next - start,
                "total": targets.len(),
                "elapsed_ms": started.elapsed().as_millis() as u64,
            })),
        );

        let rows = matches
            .iter()
            .map(|m| {
                vec![
                    field(m, "propertyId"),
                    field(m, "propertyName"),
                    self.orchestrator.names().label(lookup_str(m, "groupId").unwrap_or("-")),
                    field(m, "productionVersion"),
                ]
            })
            .collect();
        let mut report = Report::new(format!("Properties matching '{}'", query))
            .summary(format!(
                "{} match(es) in groups {}-{} of {}.",
                matches.len(),
                start + 1,
                next,
                targets.len()
            ))
            .table("Matches", &["Property ID", "Name", "Group", "Production"], rows);
        if let Some(cursor) = &next_cursor {
            report = report.notice(format!(
                "Search stopped before scanning every group. Call property_search again with cursor '{}' to continue.",
                cursor
            ));
        }
        if !skipped.is_empty() {
            report = report.bullets(
                "Skipped groups",
                skipped
                    .iter()
                    .map(|s| format!("{}: {}", field(s, "groupId"), field(s, "error")))
                    .collect(),
            );
        }
        Ok(ToolOutput::new(
            serde_json::json!({
                "query": query,
                "matches": matches,
                "groupsScanned": next - start,
                "totalGroups": targets.len(),
                "skipped": skipped,
                "truncated": truncated,
                "next_cursor": next_cursor,
            }),
            report,
        ))
    }

    async fn bulk_search(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let pattern = reader.required_string("match");
        let wait = reader.bool_or("wait", true);
        if let Some(pattern) = &pattern {
            if !pattern.starts_with('$') {
                reader.violate("match", "must be a JSONPath expression starting with '$'");
            }
        }
        reader.finish()?;
        let pattern = pattern.unwrap_or_default();

        let response = self
            .orchestrator
            .mutate(
                "property_bulk_search",
                ApiRequest::post(
                    "/papi/v1/bulk/rules-search-requests",
                    serde_json::json!({"bulkSearchQuery": {"syntax": "JSONPATH", "match": pattern}}),
                ),
                &ShapeCheck::new().expect("bulkSearchLink", Expected::String),
                &[],
            )
            .await?;
        let link = lookup_str(&response.body, "bulkSearchLink").unwrap_or_default();
        let search_id = last_link_segment(link)
            .ok_or_else(|| ToolError::malformed(format!("bulkSearchLink '{}' has no search ID", link)))?;

        if !wait {
            let report = Report::new("Bulk search submitted")
                .summary(format!("Search {} is running on the Akamai side.", search_id));
            return Ok(ToolOutput::new(
                serde_json::json!({"bulkSearchId": search_id, "status": "SUBMITTED"}),
                report,
            ));
        }

        let path = format!("/papi/v1/bulk/rules-search-requests/{}", search_id);
        let orchestrator = self.orchestrator.clone();
        let outcome = poll_until_terminal(
            &self.logger,
            PollableOperation::submitted(search_id.as_str(), "bulk search"),
            self.orchestrator.poll_settings(STAGING),
            |_| {
                let orchestrator = orchestrator.clone();
                let request = ApiRequest::get(path.clone());
                async move {
                    let body = orchestrator
                        .fetch(
                            "property_bulk_search",
                            request,
                            &ShapeCheck::new().expect("searchTargetStatus", Expected::String),
                        )
                        .await?;
                    let status = OperationStatus::from_vendor(
                        lookup_str(&body, "searchTargetStatus").unwrap_or("UNKNOWN"),
                    );
                    Ok((status, body))
                }
            },
        )
        .await?
        .into_result()?;

        let results = lookup_items(outcome.last(), "results");
        let rows = results
            .iter()
            .map(|r| {
                vec![
                    field(r, "propertyId"),
                    field(r, "propertyName"),
                    field(r, "propertyVersion"),
                    lookup_items(r, "matchLocations").len().to_string(),
                ]
            })
            .collect();
        let mut report = Report::new(format!("Bulk search {}", search_id))
            .summary(format!("{} propert(ies) matched `{}`.", results.len(), pattern))
            .table("Matches", &["Property ID", "Name", "Version", "Locations"], rows);
        if let PollOutcome::Failed { .. } = outcome {
            report = report.notice("The bulk search ended with an error on the Akamai side.");
        }
        Ok(ToolOutput::new(
            serde_json::json!({
                "bulkSearchId": search_id,
                "status": outcome.label(),
                "results": results,
            }),
            report,
        ))
    }

    async fn edge_hostname_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let scope = Scope::read(&mut reader);
        reader.finish()?;

        let (contract, group) = self
            .orchestrator
            .resolve_contract_and_group(scope.contract, scope.group)
            .await?;
        let fetched = self
            .orchestrator
            .cached_read(
                "edge_hostname_list",
                CacheKey::new(ResourceKind::EdgeHostnames, list_scope(&contract, &group), ""),
                ttl::EDGE_HOSTNAMES_TTL,
                ApiRequest::get("/papi/v1/edgehostnames")
                    .with_query("contractId", contract.as_str())
                    .with_query("groupId", group.as_str()),
                &ShapeCheck::items("edgeHostnames"),
            )
            .await?;
        let items = lookup_items(&fetched.body, "edgeHostnames.items");
        let rows = items
            .iter()
            .map(|e| {
                vec![
                    field(e, "edgeHostnameId"),
                    field(e, "edgeHostnameDomain"),
                    field(e, "productId"),
                    field(e, "secure"),
                    field(e, "ipVersionBehavior"),
                ]
            })
            .collect();
        let report = Report::new("Edge hostnames")
            .summary(format!("{} edge hostname(s) in {}.", items.len(), self.orchestrator.names().label(&group)))
            .table("Edge hostnames", &["ID", "Domain", "Product", "Secure", "IP version"], rows);
        Ok(ToolOutput::new(
            serde_json::json!({
                "contractId": contract,
                "groupId": group,
                "edgeHostnames": items,
                "cached": fetched.cached,
            }),
            report,
        ))
    }

    async fn edge_hostname_create(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let prefix = reader.required_string("domainPrefix");
        let suffix = reader.enum_value("domainSuffix", EDGE_SUFFIXES, None);
        let product = reader.required_id("productId", IdKind::Product);
        let ip_behavior = reader.enum_value("ipVersionBehavior", IP_BEHAVIORS, Some("IPV4"));
        let secure_network = reader.enum_value("secureNetwork", SECURE_NETWORKS, None);
        let enrollment = reader.optional_u64("certEnrollmentId", 1, u32::MAX as u64);
        let scope = Scope::read(&mut reader);
        let secure_network = match (suffix.as_deref(), secure_network) {
            (Some("edgekey.net"), None) => Some("ENHANCED_TLS".to_string()),
            (_, given) => given,
        };
        if secure_network.as_deref() == Some("ENHANCED_TLS") && enrollment.is_none() {
            reader.violate("certEnrollmentId", "is required for ENHANCED_TLS edge hostnames");
        }
        reader.finish()?;
        let prefix = prefix.unwrap_or_default();
        let suffix = suffix.unwrap_or_default();
        let product = product.unwrap_or_default();

        let (contract, group) = self
            .orchestrator
            .resolve_contract_and_group(scope.contract, scope.group)
            .await?;
        let mut body = serde_json::json!({
            "productId": product,
            "domainPrefix": prefix,
            "domainSuffix": suffix,
            "ipVersionBehavior": ip_behavior,
        });
        if let Value::Object(map) = &mut body {
            if let Some(network) = &secure_network {
                map.insert("secureNetwork".to_string(), Value::String(network.clone()));
            }
            if let Some(enrollment) = enrollment {
                map.insert("certEnrollmentId".to_string(), serde_json::json!(enrollment));
            }
        }
        let response = self
            .orchestrator
            .mutate(
                "edge_hostname_create",
                ApiRequest::post("/papi/v1/edgehostnames", body)
                    .with_query("contractId", contract.as_str())
                    .with_query("groupId", group.as_str()),
                &ShapeCheck::new().expect("edgeHostnameLink", Expected::String),
                &[KeyPattern::kind(ResourceKind::EdgeHostnames)],
            )
            .await?;
        let link = lookup_str(&response.body, "edgeHostnameLink").unwrap_or_default();
        let edge_hostname_id = extract_id_from_link(link, IdKind::EdgeHostname).ok_or_else(|| {
            ToolError::malformed(format!("edgeHostnameLink '{}' does not contain an edge hostname ID", link))
        })?;
        let domain = format!("{}.{}", prefix, suffix);
        let report = Report::new(format!("Edge hostname {} created", domain)).key_values(
            "Edge hostname",
            vec![
                ("ID".to_string(), edge_hostname_id.clone()),
                ("Contract".to_string(), contract.clone()),
                ("Group".to_string(), group.clone()),
            ],
        );
        Ok(ToolOutput::new(
            serde_json::json!({
                "edgeHostnameId": edge_hostname_id,
                "edgeHostnameDomain": domain,
                "contractId": contract,
                "groupId": group,
            }),
            report,
        ))
    }

    async fn include_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let scope = Scope::read(&mut reader);
        reader.finish()?;

        let (contract, group) = self
            .orchestrator
            .resolve_contract_and_group(scope.contract, scope.group)
            .await?;
        let fetched = self
            .orchestrator
            .cached_read(
                "include_list",
                CacheKey::new(ResourceKind::Includes, list_scope(&contract, &group), ""),
                ttl::INCLUDES_TTL,
                ApiRequest::get("/papi/v1/includes")
                    .with_query("contractId", contract.as_str())
                    .with_query("groupId", group.as_str()),
                &ShapeCheck::items("includes"),
            )
            .await?;
        let items = lookup_items(&fetched.body, "includes.items");
        let rows = items
            .iter()
            .map(|i| {
                vec![
                    field(i, "includeId"),
                    field(i, "includeName"),
                    field(i, "includeType"),
                    field(i, "latestVersion"),
                    field(i, "stagingVersion"),
                    field(i, "productionVersion"),
                ]
            })
            .collect();
        let report = Report::new("Includes")
            .summary(format!("{} include(s) in {}.", items.len(), self.orchestrator.names().label(&group)))
            .table(
                "Includes",
                &["Include ID", "Name", "Type", "Latest", "Staging", "Production"],
                rows,
            );
        Ok(ToolOutput::new(
            serde_json::json!({
                "contractId": contract,
                "groupId": group,
                "includes": items,
                "cached": fetched.cached,
            }),
            report,
        ))
    }
}

#[async_trait::async_trait]
impl ToolHandler for PropertyManager {
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

    fn manager(api: Arc<FakeApi>) -> PropertyManager {
        PropertyManager::new(Logger::new("test"), Validation::new(), orchestrator_with(api))
    }

    fn groups_body() -> Value {
        json!({"groups": {"items": [
            {"groupId": "grp_1", "groupName": "Root", "contractIds": ["ctr_1"]},
            {"groupId": "grp_2", "groupName": "Web", "contractIds": ["ctr_1"]},
            {"groupId": "grp_3", "groupName": "Api", "contractIds": ["ctr_1"]}
        ]}})
    }

    #[tokio::test]
    async fn create_extracts_property_id_and_invalidates_lists() {
        let api = Arc::new(FakeApi::new().on(
            Method::POST,
            "/papi/v1/properties",
            201,
            json!({"propertyLink": "/papi/v1/properties/prp_999?contractId=ctr_1&groupId=grp_1"}),
        ));
        let manager = manager(api.clone());
        let stale = CacheKey::new(ResourceKind::Properties, "ctr_1:grp_1", "");
        manager
            .orchestrator
            .cache()
            .set(&stale, &json!({"properties": {"items": []}}), Duration::from_secs(60));

        let out = manager
            .handle_action(
                "property_create",
                json!({"propertyName": "www.example.com", "productId": "Fresca", "contractId": "1", "groupId": "1"}),
            )
            .await
            .expect("created");
        assert_eq!(out.data["propertyId"], "prp_999");
        assert!(manager.orchestrator.cache().get(&stale).is_none());

        let call = &api.calls()[0];
        assert_eq!(call.query_value("contractId"), Some("ctr_1"));
        assert_eq!(call.query_value("groupId"), Some("grp_1"));
        assert_eq!(call.body.as_ref().map(|b| b["productId"].clone()), Some(json!("prd_Fresca")));
    }

    #[tokio::test]
    async fn version_create_and_activate_refresh_property_lists() {
        let list = json!({"properties": {"items": [
            {"propertyId": "prp_1", "propertyName": "www", "latestVersion": 1}
        ]}});
        let api = Arc::new(
            FakeApi::new()
                .on(Method::GET, "/papi/v1/properties", 200, list)
                .on(Method::POST, "/papi/v1/properties/prp_1/versions", 201,
                    json!({"versionLink": "/papi/v1/properties/prp_1/versions/2"}))
                .on(Method::POST, "/papi/v1/properties/prp_1/activations", 201,
                    json!({"activationLink": "/papi/v1/properties/prp_1/activations/atv_5"})),
        );
        let manager = manager(api.clone());
        let list_args = json!({"contractId": "ctr_1", "groupId": "grp_1"});

        let first = manager.handle_action("property_list", list_args.clone()).await.expect("list");
        assert_eq!(first.data["cached"], false);
        let again = manager.handle_action("property_list", list_args.clone()).await.expect("list");
        assert_eq!(again.data["cached"], true);

        manager
            .handle_action("property_version_create", json!({"propertyId": "prp_1", "createFromVersion": 1}))
            .await
            .expect("version");
        let after_version = manager.handle_action("property_list", list_args.clone()).await.expect("list");
        assert_eq!(after_version.data["cached"], false);

        manager
            .handle_action(
                "property_activate",
                json!({"propertyId": "prp_1", "version": 2, "network": "STAGING", "notifyEmails": ["ops@example.com"]}),
            )
            .await
            .expect("activate");
        let after_activate = manager.handle_action("property_list", list_args).await.expect("list");
        assert_eq!(after_activate.data["cached"], false);
        assert_eq!(api.calls_to(Method::GET, "/papi/v1/properties"), 3);
    }

    #[tokio::test]
    async fn create_reports_every_missing_field_before_any_call() {
        let api = Arc::new(FakeApi::new());
        let err = manager(api.clone())
            .handle_action("property_create", json!({"contractId": "grp_1"}))
            .await
            .expect_err("invalid");
        assert_eq!(err.kind, ToolErrorKind::Validation);
        assert!(err.message.contains("propertyName"));
        assert!(err.message.contains("productId"));
        assert!(err.message.contains("contractId"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn rules_update_forwards_etag_as_if_match() {
        let api = Arc::new(FakeApi::new().on(
            Method::PUT,
            "/papi/v1/properties/prp_1/versions/3/rules",
            200,
            json!({"etag": "new", "rules": {"name": "default"}, "errors": [
                {"errorLocation": "#/rules/behaviors/0", "detail": "origin hostname missing"}
            ]}),
        ));
        let out = manager(api.clone())
            .handle_action(
                "property_rules_update",
                json!({"propertyId": "1", "version": 3, "etag": "old", "rules": {"name": "default", "behaviors": []}}),
            )
            .await
            .expect("updated");
        assert_eq!(out.data["etag"], "new");
        assert_eq!(out.data["errors"].as_array().map(|e| e.len()), Some(1));
        let call = &api.calls()[0];
        assert!(call.headers.iter().any(|(k, v)| k == "If-Match" && v == "old"));
    }

    #[tokio::test]
    async fn activate_with_wait_polls_until_active() {
        let activations = "/papi/v1/properties/prp_1/activations";
        let api = Arc::new(
            FakeApi::new()
                .on(Method::POST, activations, 201, json!({"activationLink": format!("{}/atv_42", activations)}))
                .on(Method::GET, "/papi/v1/properties/prp_1/activations/atv_42", 200,
                    json!({"activations": {"items": [{"status": "PENDING"}]}}))
                .on(Method::GET, "/papi/v1/properties/prp_1/activations/atv_42", 200,
                    json!({"activations": {"items": [{"status": "ACTIVE", "network": "STAGING"}]}})),
        );
        let out = manager(api.clone())
            .handle_action(
                "property_activate",
                json!({"propertyId": "prp_1", "version": 2, "network": "staging", "notifyEmails": ["ops@example.com"], "wait": true}),
            )
            .await
            .expect("activated");
        assert_eq!(out.data["activationId"], "atv_42");
        assert_eq!(out.data["network"], "STAGING");
        assert_eq!(out.data["status"], "COMPLETE");
        assert_eq!(out.data["attempts"], 2);
    }

    #[tokio::test]
    async fn activation_that_never_finishes_times_out() {
        let api = Arc::new(
            FakeApi::new()
                .on(Method::POST, "/papi/v1/properties/prp_1/activations", 201,
                    json!({"activationLink": "/papi/v1/properties/prp_1/activations/atv_7"}))
                .on(Method::GET, "/papi/v1/properties/prp_1/activations/atv_7", 200,
                    json!({"activations": {"items": [{"status": "PENDING"}]}})),
        );
        let err = manager(api.clone())
            .handle_action(
                "property_activate",
                json!({"propertyId": "1", "version": 1, "network": "PRODUCTION", "notifyEmails": ["a@b.c"], "wait": true}),
            )
            .await
            .expect_err("timeout");
        assert_eq!(err.kind, ToolErrorKind::OperationTimeout);
        let polls = api.calls_to(Method::GET, "/papi/v1/properties/prp_1/activations/atv_7");
        assert_eq!(polls as u32, crate::config::Settings::for_tests().production_poll.max_attempts);
    }

    #[tokio::test]
    async fn search_is_bounded_and_resumable() {
        let api = Arc::new(
            FakeApi::new()
                .on(Method::GET, "/papi/v1/groups", 200, groups_body())
                .on(Method::GET, "/papi/v1/properties", 200, json!({"properties": {"items": [
                    {"propertyId": "prp_1", "propertyName": "www.example.com"},
                    {"propertyId": "prp_2", "propertyName": "api.other.net"}
                ]}})),
        );
        let manager = manager(api);
        let first = manager
            .handle_action("property_search", json!({"query": "EXAMPLE", "maxGroups": 2}))
            .await
            .expect("search");
        assert_eq!(first.data["truncated"], true);
        assert_eq!(first.data["next_cursor"], "2");
        assert_eq!(first.data["matches"].as_array().map(|m| m.len()), Some(2));

        let rest = manager
            .handle_action("property_search", json!({"query": "example", "cursor": "2", "maxGroups": 2}))
            .await
            .expect("search");
        assert_eq!(rest.data["truncated"], false);
        assert!(rest.data["next_cursor"].is_null());
        assert_eq!(rest.data["groupsScanned"], 1);
    }

    #[tokio::test]
    async fn bulk_search_polls_and_returns_results() {
        let api = Arc::new(
            FakeApi::new()
                .on(Method::POST, "/papi/v1/bulk/rules-search-requests", 202,
                    json!({"bulkSearchLink": "/papi/v1/bulk/rules-search-requests/5?contractId=ctr_1"}))
                .on(Method::GET, "/papi/v1/bulk/rules-search-requests/5", 200,
                    json!({"searchTargetStatus": "COMPLETE", "results": [
                        {"propertyId": "prp_1", "propertyName": "a", "propertyVersion": 3, "matchLocations": ["/rules/behaviors/0"]}
                    ]})),
        );
        let out = manager(api)
            .handle_action("property_bulk_search", json!({"match": "$..behaviors[?(@.name == 'origin')]"}))
            .await
            .expect("bulk");
        assert_eq!(out.data["bulkSearchId"], "5");
        assert_eq!(out.data["results"][0]["propertyId"], "prp_1");
    }

    #[tokio::test]
    async fn enhanced_tls_edge_hostname_needs_enrollment() {
        let err = manager(Arc::new(FakeApi::new()))
            .handle_action(
                "edge_hostname_create",
                json!({"domainPrefix": "www.example.com", "domainSuffix": "edgekey.net", "productId": "prd_1"}),
            )
            .await
            .expect_err("enrollment");
        assert!(err.message.contains("certEnrollmentId"));
    }
}
