use crate::constants::cache as ttl;
use crate::constants::limits::MAX_BULK_RECORDS;
use crate::constants::network::PRODUCTION;
use crate::errors::{ToolError, ToolErrorKind};
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
use crate::utils::ids::{strip_prefix, IdKind};
use crate::utils::text::display_value;
use crate::utils::tool_errors::unknown_tool_error;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::net::{Ipv4Addr, Ipv6Addr};

const DNS_ACTIONS: &[&str] = &[
    "dns_zone_list",
    "dns_zone_get",
    "dns_zone_create",
    "dns_zone_activate",
    "dns_records_list",
    "dns_record_upsert",
    "dns_record_delete",
    "dns_records_bulk_import",
];

const ZONE_TYPES: &[&str] = &["PRIMARY", "SECONDARY", "ALIAS"];

const RECORD_TYPES: &[&str] = &[
    "A", "AAAA", "AFSDB", "AKAMAICDN", "AKAMAITLC", "CAA", "CERT", "CNAME", "DNSKEY", "DS",
    "HINFO", "HTTPS", "LOC", "MX", "NAPTR", "NS", "PTR", "RP", "SOA", "SPF", "SRV", "SSHFP",
    "SVCB", "TLSA", "TXT",
];

const MIN_TTL: u64 = 30;
const MAX_TTL: u64 = 2_147_483_647;
const MAX_NAME_LEN: usize = 253;

static DNS_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*\.)?([A-Za-z0-9_]([A-Za-z0-9_-]{0,61}[A-Za-z0-9_])?\.)*[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$")
        .expect("static regex")
});

fn valid_dns_name(name: &str) -> bool {
    name.len() <= MAX_NAME_LEN && DNS_NAME.is_match(name)
}

/// A record set as Edge DNS expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSet {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: u64,
    pub rdata: Vec<String>,
}

/// Resolves `name` against `zone`: `@` is the apex, a trailing dot marks an
/// absolute name, anything else outside the zone is taken as relative.
fn qualify(name: &str, zone: &str) -> String {
    let name = name.trim();
    if name == "@" {
        return zone.to_string();
    }
    if let Some(absolute) = name.strip_suffix('.') {
        return absolute.to_lowercase();
    }
    let lower = name.to_lowercase();
    if lower == zone || lower.ends_with(&format!(".{}", zone)) {
        lower
    } else {
        format!("{}.{}", lower, zone)
    }
}

/// Checks one record set; problems come back as `(field, message)` pairs.
fn check_record(
    zone: &str,
    name: &str,
    record_type: &str,
    ttl: Option<u64>,
    rdata: Vec<String>,
) -> Result<RecordSet, Vec<(String, String)>> {
    let mut problems = Vec::new();
    let name = qualify(name, zone);
    if !valid_dns_name(&name) {
        problems.push(("name".to_string(), format!("'{}' is not a valid DNS name", name)));
    } else if name != zone && !name.ends_with(&format!(".{}", zone)) {
        problems.push(("name".to_string(), format!("'{}' is outside zone {}", name, zone)));
    }

    let record_type = record_type.trim().to_uppercase();
    if !RECORD_TYPES.contains(&record_type.as_str()) {
        problems.push(("type".to_string(), format!("'{}' is not a supported record type", record_type)));
    }

    let ttl = match ttl {
        Some(ttl) if (MIN_TTL..=MAX_TTL).contains(&ttl) => ttl,
        Some(_) => {
            problems.push(("ttl".to_string(), format!("must be between {} and {}", MIN_TTL, MAX_TTL)));
            0
        }
        None => {
            problems.push(("ttl".to_string(), "is required".to_string()));
            0
        }
    };

    if rdata.is_empty() {
        problems.push(("rdata".to_string(), "must contain at least one value".to_string()));
    }
    for (idx, value) in rdata.iter().enumerate() {
        let field = format!("rdata[{}]", idx);
        let bad = match record_type.as_str() {
            "A" => value.parse::<Ipv4Addr>().is_err().then(|| format!("'{}' is not an IPv4 address", value)),
            "AAAA" => value.parse::<Ipv6Addr>().is_err().then(|| format!("'{}' is not an IPv6 address", value)),
            "MX" => {
                let mut parts = value.split_whitespace();
                let priority_ok = parts.next().map(|p| p.parse::<u16>().is_ok()).unwrap_or(false);
                (!priority_ok || parts.next().is_none())
                    .then(|| format!("'{}' must look like '<priority> <host>'", value))
            }
            _ => None,
        };
        if let Some(message) = bad {
            problems.push((field, message));
        }
    }
    if record_type == "CNAME" {
        if rdata.len() > 1 {
            problems.push(("rdata".to_string(), "a CNAME takes exactly one target".to_string()));
        }
        if name == zone {
            problems.push(("name".to_string(), "a CNAME cannot sit at the zone apex".to_string()));
        }
    }

    if problems.is_empty() {
        Ok(RecordSet {
            name,
            record_type,
            ttl,
            rdata,
        })
    } else {
        Err(problems)
    }
}

/// Reads one element of a bulk import list, tolerating loose typing.
fn record_from_value(zone: &str, raw: &Value) -> Result<RecordSet, Vec<(String, String)>> {
    let Some(obj) = raw.as_object() else {
        return Err(vec![("record".to_string(), "must be an object".to_string())]);
    };
    let name = obj.get("name").and_then(|v| v.as_str()).unwrap_or("");
    let record_type = obj.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let ttl = obj.get("ttl").and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    });
    let rdata = match obj.get("rdata") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(|s| s.to_string()).unwrap_or_else(|| item.to_string()))
            .collect(),
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    };
    check_record(zone, name, record_type, ttl, rdata)
}

fn describe(problems: &[(String, String)]) -> String {
    problems
        .iter()
        .map(|(field, message)| format!("{} {}", field, message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn zone_path(zone: &str) -> String {
    format!("/config-dns/v2/zones/{}", zone)
}

fn record_path(zone: &str, record: &RecordSet) -> String {
    format!("{}/names/{}/types/{}", zone_path(zone), record.name, record.record_type)
}

fn field(item: &Value, path: &str) -> String {
    lookup(item, path)
        .map(display_value)
        .unwrap_or_else(|| "-".to_string())
}

/// Edge DNS zones and record sets.
#[derive(Clone)]
pub struct DnsManager {
    logger: Logger,
    validation: Validation,
    orchestrator: Orchestrator,
}

impl DnsManager {
    pub fn new(logger: Logger, validation: Validation, orchestrator: Orchestrator) -> Self {
        Self {
            logger: logger.child("dns"),
            validation,
            orchestrator,
        }
    }

    pub async fn handle_action(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
        match action {
            "dns_zone_list" => self.zone_list(&args).await,
            "dns_zone_get" => self.zone_get(&args).await,
            "dns_zone_create" => self.zone_create(&args).await,
            "dns_zone_activate" => self.zone_activate(&args).await,
            "dns_records_list" => self.records_list(&args).await,
            "dns_record_upsert" => self.record_upsert(&args).await,
            "dns_record_delete" => self.record_delete(&args).await,
            "dns_records_bulk_import" => self.bulk_import(&args).await,
            other => Err(unknown_tool_error("dns action", other, DNS_ACTIONS)),
        }
    }

    fn read_zone(&self, reader: &mut ArgReader<'_>) -> String {
        let zone = reader
            .required_string("zone")
            .map(|z| z.trim_end_matches('.').to_lowercase())
            .unwrap_or_default();
        if !zone.is_empty() && !valid_dns_name(&zone) {
            reader.violate("zone", format!("'{}' is not a valid zone name", zone));
        }
        zone
    }

    fn record_invalidation(zone: &str) -> [KeyPattern; 2] {
        [
            KeyPattern::scoped(ResourceKind::RecordSets, zone),
            KeyPattern::scoped(ResourceKind::Zone, zone),
        ]
    }

    async fn zone_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let contract = reader.optional_id("contractId", IdKind::Contract);
        let search = reader.optional_string("search");
        reader.finish()?;

        let fetched = self
            .orchestrator
            .cached_read(
                "dns_zone_list",
                CacheKey::new(
                    ResourceKind::Zones,
                    contract.as_deref().unwrap_or("all"),
                    search.as_deref().unwrap_or(""),
                ),
                ttl::ZONES_TTL,
                ApiRequest::get("/config-dns/v2/zones")
                    .with_query("showAll", "true")
                    .with_optional_query("contractIds", contract.as_deref())
                    .with_optional_query("search", search.as_deref()),
                &ShapeCheck::new().expect("zones", Expected::Array),
            )
            .await?;
        let zones = lookup_items(&fetched.body, "zones");
        let rows = zones
            .iter()
            .map(|z| {
                vec![
                    field(z, "zone"),
                    field(z, "type"),
                    field(z, "activationState"),
                    field(z, "contractId"),
                    field(z, "lastModifiedDate"),
                ]
            })
            .collect();
        let report = Report::new("DNS zones")
            .summary(format!("{} zone(s).", zones.len()))
            .table("Zones", &["Zone", "Type", "State", "Contract", "Modified"], rows);
        Ok(ToolOutput::new(
            serde_json::json!({"zones": zones, "cached": fetched.cached}),
            report,
        ))
    }

    async fn zone_get(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let zone = self.read_zone(&mut reader);
        reader.finish()?;

        let fetched = self
            .orchestrator
            .cached_read(
                "dns_zone_get",
                CacheKey::new(ResourceKind::Zone, zone.as_str(), ""),
                ttl::ZONE_TTL,
                ApiRequest::get(zone_path(&zone)),
                &ShapeCheck::new().expect("zone", Expected::String),
            )
            .await?;
        let body = &fetched.body;
        let pairs = ["type", "activationState", "contractId", "comment", "signAndServe", "lastActivationDate", "versionId"]
            .iter()
            .map(|key| (key.to_string(), field(body, key)))
            .collect();
        let report = Report::new(format!("Zone {}", zone)).key_values("Zone", pairs);
        Ok(ToolOutput::new(body.clone(), report))
    }

    async fn zone_create(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let zone = self.read_zone(&mut reader);
        let zone_type = reader.enum_value("type", ZONE_TYPES, None);
        let contract = reader.optional_id("contractId", IdKind::Contract);
        let group = reader.optional_id("groupId", IdKind::Group);
        let comment = reader.optional_string("comment");
        let masters = reader.string_array("masters", 0, 32);
        let target = reader.optional_string("target");
        match zone_type.as_deref() {
            Some("SECONDARY") if masters.is_empty() => {
                reader.violate("masters", "is required for SECONDARY zones");
            }
            Some("ALIAS") if target.is_none() => {
                reader.violate("target", "is required for ALIAS zones");
            }
            _ => {}
        }
        reader.finish()?;
        let zone_type = zone_type.unwrap_or_default();

        let contract = self.orchestrator.resolve_contract(contract).await?;
        let mut body = serde_json::json!({"zone": zone, "type": zone_type});
        if let Value::Object(map) = &mut body {
            if let Some(comment) = &comment {
                map.insert("comment".to_string(), Value::String(comment.clone()));
            }
            if !masters.is_empty() {
                map.insert("masters".to_string(), serde_json::json!(masters));
            }
            if let Some(target) = &target {
                map.insert("target".to_string(), Value::String(target.clone()));
            }
        }
        let request = ApiRequest::post("/config-dns/v2/zones", body)
            .with_query("contractId", contract.as_str())
            .with_optional_query("gid", group.as_deref().map(|g| strip_prefix(g, IdKind::Group)));
        let response = self
            .orchestrator
            .mutate(
                "dns_zone_create",
                request,
                &ShapeCheck::new().expect("zone", Expected::String),
                &[KeyPattern::kind(ResourceKind::Zones)],
            )
            .await?;

        let report = Report::new(format!("Zone {} created", zone))
            .key_values(
                "Zone",
                vec![
                    ("Type".to_string(), zone_type.clone()),
                    ("Contract".to_string(), contract.clone()),
                    ("State".to_string(), field(&response.body, "activationState")),
                ],
            )
            .bullets(
                "Next steps",
                vec![
                    "Add records with dns_record_upsert or dns_records_bulk_import.".to_string(),
                    format!("Submit the change list with dns_zone_activate (zone {}).", zone),
                ],
            );
        Ok(ToolOutput::new(
            serde_json::json!({
                "zone": zone,
                "type": zone_type,
                "contractId": contract,
                "response": response.body,
            }),
            report,
        ))
    }

    async fn zone_activate(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let zone = self.read_zone(&mut reader);
        let comment = reader.optional_string("comment");
        let wait = reader.bool_or("wait", false);
        reader.finish()?;

        let mut invalidate = Self::record_invalidation(&zone).to_vec();
        invalidate.push(KeyPattern::kind(ResourceKind::Zones));
        self.orchestrator
            .mutate(
                "dns_zone_activate",
                ApiRequest::new(reqwest::Method::POST, format!("/config-dns/v2/changelists/{}/submit", zone))
                    .with_optional_query("comment", comment.as_deref()),
                &ShapeCheck::new(),
                &invalidate,
            )
            .await?;

        let mut data = serde_json::json!({"zone": zone, "status": "SUBMITTED"});
        let mut report = Report::new(format!("Change list for {} submitted", zone));
        if !wait {
            report = report.summary("Use dns_zone_get to follow activationState.");
            return Ok(ToolOutput::new(data, report));
        }

        let orchestrator = self.orchestrator.clone();
        let path = zone_path(&zone);
        let outcome = poll_until_terminal(
            &self.logger,
            PollableOperation::submitted(zone.as_str(), "zone activation"),
            self.orchestrator.poll_settings(PRODUCTION),
            |_| {
                let orchestrator = orchestrator.clone();
                let request = ApiRequest::get(path.clone());
                async move {
                    let body = orchestrator
                        .fetch(
                            "dns_zone_get",
                            request,
                            &ShapeCheck::new().expect("activationState", Expected::String),
                        )
                        .await?;
                    let status = OperationStatus::from_vendor(
                        lookup_str(&body, "activationState").unwrap_or("UNKNOWN"),
                    );
                    Ok((status, body))
                }
            },
        )
        .await?
        .into_result()?;
        if let Value::Object(map) = &mut data {
            map.insert("status".to_string(), Value::String(outcome.label().to_string()));
            map.insert("activationState".to_string(), outcome.last().get("activationState").cloned().unwrap_or(Value::Null));
        }
        report = match outcome {
            PollOutcome::Failed { .. } => report.notice(format!("Activation of {} failed.", zone)),
            _ => report.summary(format!("Zone {} is active.", zone)),
        };
        Ok(ToolOutput::new(data, report))
    }

    async fn records_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let zone = self.read_zone(&mut reader);
        let name = reader.optional_string("name");
        let record_type = reader
            .optional_string("type")
            .map(|t| t.to_uppercase());
        if let Some(t) = &record_type {
            if !RECORD_TYPES.contains(&t.as_str()) {
                reader.violate("type", format!("'{}' is not a supported record type", t));
            }
        }
        reader.finish()?;
        let name = name.map(|n| qualify(&n, &zone));

        let detail = format!(
            "{}|{}",
            name.as_deref().unwrap_or(""),
            record_type.as_deref().unwrap_or("")
        );
        let fetched = self
            .orchestrator
            .cached_read(
                "dns_records_list",
                CacheKey::new(ResourceKind::RecordSets, zone.as_str(), detail),
                ttl::RECORDSETS_TTL,
                ApiRequest::get(format!("{}/recordsets", zone_path(&zone)))
                    .with_query("showAll", "true")
                    .with_optional_query("search", name.as_deref())
                    .with_optional_query("types", record_type.as_deref()),
                &ShapeCheck::new().expect("recordsets", Expected::Array),
            )
            .await?;
        let records = lookup_items(&fetched.body, "recordsets");
        let rows = records
            .iter()
            .map(|r| {
                let rdata = lookup_items(r, "rdata")
                    .iter()
                    .map(display_value)
                    .collect::<Vec<_>>()
                    .join(" ");
                vec![field(r, "name"), field(r, "type"), field(r, "ttl"), rdata]
            })
            .collect();
        let report = Report::new(format!("Records in {}", zone))
            .summary(format!("{} record set(s).", records.len()))
            .table("Record sets", &["Name", "Type", "TTL", "Data"], rows);
        Ok(ToolOutput::new(
            serde_json::json!({"zone": zone, "recordsets": records, "cached": fetched.cached}),
            report,
        ))
    }

    async fn record_upsert(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let zone = self.read_zone(&mut reader);
        let name = reader.required_string("name");
        let record_type = reader.required_string("type");
        let ttl = reader.required_u64("ttl", MIN_TTL, MAX_TTL);
        let rdata = reader.string_array("rdata", 1, 400);
        let record = if reader.has_violations() {
            None
        } else {
            match check_record(
                &zone,
                name.as_deref().unwrap_or(""),
                record_type.as_deref().unwrap_or(""),
                ttl,
                rdata,
            ) {
                Ok(record) => Some(record),
                Err(problems) => {
                    for (field, message) in problems {
                        reader.violate(&field, message);
                    }
                    None
                }
            }
        };
        reader.finish()?;
        let record = record.ok_or_else(|| ToolError::unknown("record validation produced no record"))?;

        let body = serde_json::to_value(&record)?;
        let path = record_path(&zone, &record);
        let invalidate = Self::record_invalidation(&zone);
        let shape = ShapeCheck::new();
        let operation = match self
            .orchestrator
            .mutate("dns_record_upsert", ApiRequest::put(path.as_str(), body.clone()), &shape, &invalidate)
            .await
        {
            Ok(_) => "updated",
            Err(err) if err.kind == ToolErrorKind::NotFound => {
                self.orchestrator
                    .mutate("dns_record_upsert", ApiRequest::post(path.as_str(), body), &shape, &invalidate)
                    .await?;
                "created"
            }
            Err(err) => return Err(err),
        };

        let report = Report::new(format!("{} {} {}", record.name, record.record_type, operation)).key_values(
            "Record set",
            vec![
                ("TTL".to_string(), record.ttl.to_string()),
                ("Data".to_string(), record.rdata.join(" ")),
            ],
        );
        Ok(ToolOutput::new(
            serde_json::json!({"zone": zone, "operation": operation, "record": record}),
            report,
        ))
    }

    async fn record_delete(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let zone = self.read_zone(&mut reader);
        let name = reader.required_string("name");
        let record_type = reader
            .required_string("type")
            .map(|t| t.to_uppercase());
        if let Some(t) = &record_type {
            if !RECORD_TYPES.contains(&t.as_str()) {
                reader.violate("type", format!("'{}' is not a supported record type", t));
            }
        }
        reader.finish()?;
        let name = qualify(name.as_deref().unwrap_or(""), &zone);
        let record_type = record_type.unwrap_or_default();

        self.orchestrator
            .mutate(
                "dns_record_delete",
                ApiRequest::delete(format!("{}/names/{}/types/{}", zone_path(&zone), name, record_type)),
                &ShapeCheck::new(),
                &Self::record_invalidation(&zone),
            )
            .await?;
        let report = Report::new(format!("{} {} deleted", name, record_type))
            .summary(format!("Removed from zone {}.", zone));
        Ok(ToolOutput::new(
            serde_json::json!({"zone": zone, "name": name, "type": record_type, "deleted": true}),
            report,
        ))
    }

    /// Creates each valid record on its own; invalid records and vendor
    /// rejections are counted as failures without stopping the batch.
    async fn bulk_import(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let zone = self.read_zone(&mut reader);
        let records = reader.optional_array("records");
        match &records {
            None if !reader.has_violations() => reader.violate("records", "is required"),
            Some(items) if items.is_empty() || items.len() > MAX_BULK_RECORDS => reader.violate(
                "records",
                format!("must contain between 1 and {} records (got {})", MAX_BULK_RECORDS, items.len()),
            ),
            _ => {}
        }
        reader.finish()?;
        let records = records.unwrap_or_default();

        let invalidate = Self::record_invalidation(&zone);
        let mut created = Vec::new();
        let mut errors = Vec::new();
        for (idx, raw) in records.iter().enumerate() {
            let label = format!(
                "Record #{} ({} {})",
                idx + 1,
                raw.get("name").and_then(|v| v.as_str()).unwrap_or("?"),
                raw.get("type").and_then(|v| v.as_str()).unwrap_or("?")
            );
            let record = match record_from_value(&zone, raw) {
                Ok(record) => record,
                Err(problems) => {
                    errors.push(format!("{}: {}", label, describe(&problems)));
                    continue;
                }
            };
            let body = serde_json::to_value(&record)?;
            match self
                .orchestrator
                .mutate(
                    "dns_records_bulk_import",
                    ApiRequest::post(record_path(&zone, &record), body),
                    &ShapeCheck::new(),
                    &invalidate,
                )
                .await
            {
                Ok(_) => created.push(record),
                Err(err) => errors.push(format!("{}: {}", label, err.message)),
            }
        }
        self.logger.info(
            "bulk import finished",
            Some(&serde_json::json!({"zone": zone, "created": created.len(), "failed": errors.len()})),
        );

        let mut report = Report::new(format!("Bulk import into {}", zone)).summary(format!(
            "{} created, {} failed out of {} record(s).",
            created.len(),
            errors.len(),
            records.len()
        ));
        if !errors.is_empty() {
            report = report.bullets("Failures", errors.clone());
        }
        if !created.is_empty() {
            report = report.paragraph(format!(
                "Submit the change list with dns_zone_activate (zone {}) when ready.",
                zone
            ));
        }
        Ok(ToolOutput::new(
            serde_json::json!({
                "zone": zone,
                "created": created.len(),
                "failed": errors.len(),
                "errors": errors,
                "records": created,
            }),
            report,
        ))
    }
}

#[async_trait::async_trait]
impl ToolHandler for DnsManager {
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
    use std::time::Duration;

    fn manager(api: Arc<FakeApi>) -> DnsManager {
        DnsManager::new(Logger::new("test"), Validation::new(), orchestrator_with(api))
    }

    #[test]
    fn names_are_qualified_against_the_zone() {
        assert_eq!(qualify("www", "example.com"), "www.example.com");
        assert_eq!(qualify("@", "example.com"), "example.com");
        assert_eq!(qualify("WWW.Example.com", "example.com"), "www.example.com");
        assert_eq!(qualify("www.other.org.", "example.com"), "www.other.org");
    }

    #[test]
    fn record_checks_collect_every_problem() {
        let problems = check_record("example.com", "www.other.org.", "A", Some(5), vec!["300.1.1.1".into()])
            .expect_err("invalid");
        let fields: Vec<&str> = problems.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["name", "ttl", "rdata[0]"]);

        let ok = check_record("example.com", "mail", "mx", Some(300), vec!["10 mx.example.com.".into()])
            .expect("valid");
        assert_eq!(ok.record_type, "MX");
        assert_eq!(ok.name, "mail.example.com");
    }

    #[tokio::test]
    async fn zone_create_sends_contract_and_numeric_gid() {
        let api = Arc::new(FakeApi::new().on(
            Method::POST,
            "/config-dns/v2/zones",
            201,
            json!({"zone": "example.com", "type": "PRIMARY", "activationState": "NEW"}),
        ));
        manager(api.clone())
            .handle_action(
                "dns_zone_create",
                json!({"zone": "Example.com.", "type": "primary", "contractId": "ctr_1", "groupId": "42"}),
            )
            .await
            .expect("created");
        let call = &api.calls()[0];
        assert_eq!(call.query_value("contractId"), Some("ctr_1"));
        assert_eq!(call.query_value("gid"), Some("42"));
        assert_eq!(call.body, Some(json!({"zone": "example.com", "type": "PRIMARY"})));
    }

    #[tokio::test]
    async fn secondary_zone_requires_masters() {
        let err = manager(Arc::new(FakeApi::new()))
            .handle_action("dns_zone_create", json!({"zone": "example.com", "type": "SECONDARY", "contractId": "1"}))
            .await
            .expect_err("masters");
        assert!(err.message.contains("masters"));
    }

    #[tokio::test]
    async fn upsert_falls_back_to_create_and_invalidates_records() {
        let path = "/config-dns/v2/zones/example.com/names/www.example.com/types/A";
        let api = Arc::new(
            FakeApi::new()
                .on(Method::PUT, path, 404, json!({"title": "Not Found", "status": 404}))
                .on(Method::POST, path, 201, json!({"name": "www.example.com"})),
        );
        let manager = manager(api.clone());
        let cached = CacheKey::new(ResourceKind::RecordSets, "example.com", "|");
        manager
            .orchestrator
            .cache()
            .set(&cached, &json!({"recordsets": []}), Duration::from_secs(60));

        let out = manager
            .handle_action(
                "dns_record_upsert",
                json!({"zone": "example.com", "name": "www", "type": "a", "ttl": 300, "rdata": ["192.0.2.1"]}),
            )
            .await
            .expect("upsert");
        assert_eq!(out.data["operation"], "created");
        assert_eq!(api.calls_to(Method::POST, path), 1);
        assert!(manager.orchestrator.cache().get(&cached).is_none());
    }

    #[tokio::test]
    async fn bulk_import_aggregates_partial_failures() {
        let api = Arc::new(
            FakeApi::new()
                .on(Method::POST, "/config-dns/v2/zones/example.com/names/www.example.com/types/A", 201, json!({}))
                .on(
                    Method::POST,
                    "/config-dns/v2/zones/example.com/names/mail.example.com/types/MX",
                    409,
                    json!({"title": "Conflict", "detail": "record set exists", "status": 409}),
                ),
        );
        let out = manager(api)
            .handle_action(
                "dns_records_bulk_import",
                json!({"zone": "example.com", "records": [
                    {"name": "www", "type": "A", "ttl": 300, "rdata": ["192.0.2.1"]},
                    {"name": "bad", "type": "BOGUS", "ttl": 300, "rdata": ["x"]},
                    {"name": "mail", "type": "MX", "ttl": 300, "rdata": ["10 mx.example.com."]}
                ]}),
            )
            .await
            .expect("import");
        assert_eq!(out.data["created"], 1);
        assert_eq!(out.data["failed"], 2);
        let errors = out.data["errors"].as_array().cloned().unwrap_or_default();
        assert!(errors[0].as_str().unwrap_or("").contains("Record #2 (bad BOGUS)"));
        assert!(errors[1].as_str().unwrap_or("").contains("record set exists"));
    }
}
