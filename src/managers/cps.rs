use crate::constants::cache as ttl;
use crate::constants::content_types::{CPS_CHANGE_STATUS, CPS_ENROLLMENT, CPS_ENROLLMENTS, CPS_ENROLLMENT_STATUS};
use crate::errors::ToolError;
use crate::services::cache::{CacheKey, KeyPattern, ResourceKind};
use crate::services::client::ApiRequest;
use crate::services::formatter::{Report, ToolOutput};
use crate::services::logger::Logger;
use crate::services::orchestrator::Orchestrator;
use crate::services::response::{last_link_segment, Expected, ShapeCheck};
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::{ArgReader, Validation};
use crate::utils::data_path::{lookup, lookup_items, lookup_str};
use crate::utils::ids::{strip_prefix, IdKind};
use crate::utils::text::display_value;
use crate::utils::tool_errors::unknown_tool_error;
use serde_json::{Map, Value};

const CPS_ACTIONS: &[&str] = &[
    "cps_enrollment_list",
    "cps_enrollment_get",
    "cps_dv_enrollment_create",
    "cps_enrollment_status",
];

const SECURE_NETWORKS: &[&str] = &["standard-tls", "enhanced-tls"];
const CONTACT_FIELDS: &[&str] = &["firstName", "lastName", "email", "phone"];
const ORG_FIELDS: &[&str] = &["name", "addressLineOne", "city", "region", "postalCode", "country", "phone"];
const MAX_SANS: usize = 100;

fn enrollment_path(id: u64) -> String {
    format!("/cps/v2/enrollments/{}", id)
}

fn field(item: &Value, path: &str) -> String {
    lookup(item, path)
        .map(display_value)
        .unwrap_or_else(|| "-".to_string())
}

/// Requires `fields` to be non-empty strings inside the object at `name`.
fn require_members(reader: &mut ArgReader<'_>, name: &str, object: &Option<Map<String, Value>>, fields: &[&str]) {
    let Some(object) = object else {
        return;
    };
    for member in fields {
        let ok = object
            .get(*member)
            .and_then(|v| v.as_str())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if !ok {
            reader.violate(&format!("{}.{}", name, member), "is required");
        }
    }
}

/// Pending change locations; CPS returns either bare links or
/// `{location, changeType}` objects.
fn pending_changes(enrollment: &Value) -> Vec<(String, String)> {
    lookup_items(enrollment, "pendingChanges")
        .iter()
        .filter_map(|change| match change {
            Value::String(location) => Some((location.clone(), "-".to_string())),
            other => lookup_str(other, "location").map(|location| {
                (
                    location.to_string(),
                    lookup_str(other, "changeType").unwrap_or("-").to_string(),
                )
            }),
        })
        .collect()
}

/// Certificate Provisioning System enrollments.
#[derive(Clone)]
pub struct CpsManager {
    logger: Logger,
    validation: Validation,
    orchestrator: Orchestrator,
}

impl CpsManager {
    pub fn new(logger: Logger, validation: Validation, orchestrator: Orchestrator) -> Self {
        Self {
            logger: logger.child("cps"),
            validation,
            orchestrator,
        }
    }

    pub async fn handle_action(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
        match action {
            "cps_enrollment_list" => self.enrollment_list(&args).await,
            "cps_enrollment_get" => self.enrollment_get(&args).await,
            "cps_dv_enrollment_create" => self.dv_enrollment_create(&args).await,
            "cps_enrollment_status" => self.enrollment_status(&args).await,
            other => Err(unknown_tool_error("cps action", other, CPS_ACTIONS)),
        }
    }

    async fn load_enrollment(&self, id: u64) -> Result<Value, ToolError> {
        self.orchestrator
            .fetch(
                "cps_enrollment_get",
                ApiRequest::get(enrollment_path(id)).with_header("Accept", CPS_ENROLLMENT),
                &ShapeCheck::new().expect("csr", Expected::Object),
            )
            .await
    }

    async fn enrollment_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let contract = reader.optional_id("contractId", IdKind::Contract);
        reader.finish()?;

        let contract = self.orchestrator.resolve_contract(contract).await?;
        let fetched = self
            .orchestrator
            .cached_read(
                "cps_enrollment_list",
                CacheKey::new(ResourceKind::Enrollments, contract.as_str(), ""),
                ttl::ENROLLMENTS_TTL,
                ApiRequest::get("/cps/v2/enrollments")
                    .with_query("contractId", strip_prefix(&contract, IdKind::Contract))
                    .with_header("Accept", CPS_ENROLLMENTS),
                &ShapeCheck::new().expect("enrollments", Expected::Array),
            )
            .await?;
        let enrollments = lookup_items(&fetched.body, "enrollments");
        let rows = enrollments
            .iter()
            .map(|e| {
                vec![
                    lookup_str(e, "location")
                        .and_then(last_link_segment)
                        .unwrap_or_else(|| field(e, "id")),
                    field(e, "csr.cn"),
                    lookup_items(e, "csr.sans").len().to_string(),
                    field(e, "validationType"),
                    field(e, "networkConfiguration.secureNetwork"),
                    pending_changes(e).len().to_string(),
                ]
            })
            .collect();
        let report = Report::new("Certificate enrollments")
            .summary(format!("{} enrollment(s) on {}.", enrollments.len(), contract))
            .table(
                "Enrollments",
                &["ID", "Common name", "SANs", "Validation", "Network", "Pending changes"],
                rows,
            );
        Ok(ToolOutput::new(
            serde_json::json!({"contractId": contract, "enrollments": enrollments, "cached": fetched.cached}),
            report,
        ))
    }

    async fn enrollment_get(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let id = reader.required_u64("enrollmentId", 1, u32::MAX as u64);
        reader.finish()?;
        let id = id.unwrap_or_default();

        let enrollment = self.load_enrollment(id).await?;
        let sans: Vec<String> = lookup_items(&enrollment, "csr.sans").iter().map(display_value).collect();
        let report = Report::new(format!("Enrollment {}", id))
            .key_values(
                "Certificate",
                vec![
                    ("Common name".to_string(), field(&enrollment, "csr.cn")),
                    ("Validation".to_string(), field(&enrollment, "validationType")),
                    ("Certificate type".to_string(), field(&enrollment, "certificateType")),
                    ("Network".to_string(), field(&enrollment, "networkConfiguration.secureNetwork")),
                    ("SNI only".to_string(), field(&enrollment, "networkConfiguration.sniOnly")),
                    ("Pending changes".to_string(), pending_changes(&enrollment).len().to_string()),
                ],
            )
            .bullets("Subject alternative names", sans);
        Ok(ToolOutput::new(enrollment, report))
    }

    async fn dv_enrollment_create(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let common_name = reader.required_string("commonName").map(|cn| cn.to_lowercase());
        let mut sans = reader.string_array("sans", 0, MAX_SANS);
        let admin = reader.required_object("adminContact");
        let tech = reader.required_object("techContact");
        let org = reader.required_object("org");
        let secure_network = reader
            .enum_value("secureNetwork", SECURE_NETWORKS, Some("enhanced-tls"))
            .unwrap_or_default();
        let sni_only = reader.bool_or("sniOnly", true);
        let contract = reader.optional_id("contractId", IdKind::Contract);
        require_members(&mut reader, "adminContact", &admin, CONTACT_FIELDS);
        require_members(&mut reader, "techContact", &tech, CONTACT_FIELDS);
        require_members(&mut reader, "org", &org, ORG_FIELDS);
        reader.finish()?;
        let common_name = common_name.unwrap_or_default();
        let org = org.unwrap_or_default();

        if !sans.iter().any(|s| s.eq_ignore_ascii_case(&common_name)) {
            sans.insert(0, common_name.clone());
        }
        let contract = self.orchestrator.resolve_contract(contract).await?;
        let org_text = |key: &str| org.get(key).cloned().unwrap_or(Value::Null);
        let body = serde_json::json!({
            "ra": "lets-encrypt",
            "validationType": "dv",
            "certificateType": "san",
            "certificateChainType": "default",
            "changeManagement": false,
            "enableMultiStackedCertificates": false,
            "signatureAlgorithm": "SHA-256",
            "csr": {
                "cn": common_name,
                "sans": sans,
                "c": org_text("country"),
                "st": org_text("region"),
                "l": org_text("city"),
                "o": org_text("name"),
            },
            "networkConfiguration": {
                "geography": "core",
                "secureNetwork": secure_network,
                "sniOnly": sni_only,
                "quicEnabled": false,
                "dnsNameSettings": {"cloneDnsNames": false, "dnsNames": sans},
            },
            "org": org,
            "adminContact": admin,
            "techContact": tech,
        });
        let response = self
            .orchestrator
            .mutate(
                "cps_dv_enrollment_create",
                ApiRequest::post("/cps/v2/enrollments", body)
                    .with_query("contractId", strip_prefix(&contract, IdKind::Contract))
                    .with_header("Content-Type", CPS_ENROLLMENT)
                    .with_header("Accept", CPS_ENROLLMENT_STATUS),
                &ShapeCheck::new().expect("enrollment", Expected::String),
                &[KeyPattern::kind(ResourceKind::Enrollments)],
            )
            .await?;
        let link = lookup_str(&response.body, "enrollment").unwrap_or_default();
        let enrollment_id = last_link_segment(link)
            .and_then(|segment| segment.parse::<u64>().ok())
            .ok_or_else(|| ToolError::malformed(format!("enrollment link '{}' does not end in an ID", link)))?;

        let report = Report::new(format!("DV enrollment for {} created", common_name))
            .key_values(
                "Enrollment",
                vec![
                    ("Enrollment ID".to_string(), enrollment_id.to_string()),
                    ("SANs".to_string(), sans.join(", ")),
                    ("Network".to_string(), secure_network.clone()),
                ],
            )
            .bullets(
                "Next steps",
                vec![format!(
                    "Follow domain validation with cps_enrollment_status (enrollmentId {}).",
                    enrollment_id
                )],
            );
        Ok(ToolOutput::new(
            serde_json::json!({
                "enrollmentId": enrollment_id,
                "enrollmentLink": link,
                "contractId": contract,
                "commonName": common_name,
                "sans": sans,
                "changes": response.body.get("changes").cloned().unwrap_or(Value::Array(Vec::new())),
            }),
            report,
        ))
    }

    async fn enrollment_status(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let id = reader.required_u64("enrollmentId", 1, u32::MAX as u64);
        reader.finish()?;
        let id = id.unwrap_or_default();

        let enrollment = self.load_enrollment(id).await?;
        let changes = pending_changes(&enrollment);
        let Some((location, change_type)) = changes.first().cloned() else {
            let report = Report::new(format!("Enrollment {}", id))
                .summary("No pending changes; the certificate is deployed as configured.");
            return Ok(ToolOutput::new(
                serde_json::json!({"enrollmentId": id, "pendingChanges": 0, "status": "COMPLETE"}),
                report,
            ));
        };

        let change = self
            .orchestrator
            .fetch(
                "cps_enrollment_status",
                ApiRequest::get(location.as_str()).with_header("Accept", CPS_CHANGE_STATUS),
                &ShapeCheck::new().expect("statusInfo", Expected::Object),
            )
            .await?;
        let mut report = Report::new(format!("Enrollment {} change status", id)).key_values(
            "Change",
            vec![
                ("Change type".to_string(), change_type.clone()),
                ("Status".to_string(), field(&change, "statusInfo.status")),
                ("State".to_string(), field(&change, "statusInfo.state")),
                ("Description".to_string(), field(&change, "statusInfo.description")),
            ],
        );
        if let Some(error) = lookup(&change, "statusInfo.error").filter(|e| !e.is_null()) {
            report = report.notice(format!("CPS reported an error: {}", display_value(error)));
        }
        let allowed: Vec<String> = lookup_items(&change, "allowedInput")
            .iter()
            .filter_map(|input| lookup_str(input, "type").map(|t| t.to_string()))
            .collect();
        if !allowed.is_empty() {
            report = report.bullets("Waiting for input", allowed.clone());
        }
        Ok(ToolOutput::new(
            serde_json::json!({
                "enrollmentId": id,
                "pendingChanges": changes.len(),
                "changeType": change_type,
                "changeLocation": location,
                "statusInfo": change.get("statusInfo"),
                "allowedInput": allowed,
            }),
            report,
        ))
    }
}

#[async_trait::async_trait]
impl ToolHandler for CpsManager {
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

    fn manager(api: Arc<FakeApi>) -> CpsManager {
        CpsManager::new(Logger::new("test"), Validation::new(), orchestrator_with(api))
    }

    fn contact() -> Value {
        json!({"firstName": "Ada", "lastName": "Ops", "email": "ada@example.com", "phone": "+1 555 0100"})
    }

    #[tokio::test]
    async fn dv_create_builds_enrollment_and_reads_id() {
        let api = Arc::new(FakeApi::new().on(
            Method::POST,
            "/cps/v2/enrollments",
            202,
            json!({"enrollment": "/cps/v2/enrollments/10002", "changes": ["/cps/v2/enrollments/10002/changes/1"]}),
        ));
        let out = manager(api.clone())
            .handle_action(
                "cps_dv_enrollment_create",
                json!({
                    "commonName": "WWW.example.com",
                    "sans": ["api.example.com"],
                    "adminContact": contact(),
                    "techContact": contact(),
                    "org": {"name": "Example", "addressLineOne": "1 Main St", "city": "Boston",
                            "region": "MA", "postalCode": "02101", "country": "US", "phone": "+1 555 0100"},
                    "contractId": "ctr_1-AB"
                }),
            )
            .await
            .expect("created");
        assert_eq!(out.data["enrollmentId"], 10002);
        assert_eq!(out.data["sans"], json!(["www.example.com", "api.example.com"]));

        let call = &api.calls()[0];
        assert_eq!(call.query_value("contractId"), Some("1-AB"));
        assert!(call.headers.iter().any(|(k, v)| k == "Content-Type" && v == CPS_ENROLLMENT));
        let body = call.body.clone().unwrap_or_default();
        assert_eq!(body["validationType"], "dv");
        assert_eq!(body["csr"]["c"], "US");
    }

    #[tokio::test]
    async fn dv_create_lists_missing_contact_members() {
        let err = manager(Arc::new(FakeApi::new()))
            .handle_action(
                "cps_dv_enrollment_create",
                json!({"commonName": "a.example.com", "adminContact": {"firstName": "A"}, "techContact": contact(), "org": {}}),
            )
            .await
            .expect_err("invalid");
        assert!(err.message.contains("adminContact.email"));
        assert!(err.message.contains("org.country"));
    }

    #[tokio::test]
    async fn status_follows_the_first_pending_change() {
        let api = Arc::new(
            FakeApi::new()
                .on(Method::GET, "/cps/v2/enrollments/7", 200, json!({
                    "csr": {"cn": "www.example.com"},
                    "pendingChanges": [{"location": "/cps/v2/enrollments/7/changes/3", "changeType": "new-certificate"}]
                }))
                .on(Method::GET, "/cps/v2/enrollments/7/changes/3", 200, json!({
                    "statusInfo": {"status": "coodinate-domain-validation", "state": "awaiting-input", "description": "Waiting for DV"},
                    "allowedInput": [{"type": "lets-encrypt-challenges"}]
                })),
        );
        let out = manager(api)
            .handle_action("cps_enrollment_status", json!({"enrollmentId": "7"}))
            .await
            .expect("status");
        assert_eq!(out.data["changeType"], "new-certificate");
        assert_eq!(out.data["allowedInput"], json!(["lets-encrypt-challenges"]));
    }
}
