use crate::errors::ToolError;
use crate::managers::purge::read_cpcodes;
use crate::services::client::ApiRequest;
use crate::services::formatter::{Report, ToolOutput};
use crate::services::logger::Logger;
use crate::services::orchestrator::Orchestrator;
use crate::services::response::{Expected, ShapeCheck};
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::{ArgReader, Validation};
use crate::utils::data_path::{lookup, lookup_items};
use crate::utils::text::display_value;
use crate::utils::tool_errors::unknown_tool_error;
use chrono::{DateTime, Utc};
use serde_json::Value;

const REPORTING_ACTIONS: &[&str] = &["reporting_traffic"];
const INTERVALS: &[&str] = &["FIVE_MINUTES", "HOUR", "DAY", "WEEK", "MONTH"];
const DEFAULT_METRICS: &[&str] = &["edgeHitsPerSecond", "edgeBytesPerSecond"];
const MAX_CPCODES: usize = 100;
const TRAFFIC_REPORT: &str = "/reporting-api/v1/reports/traffic-by-time/versions/1/report-data";

fn read_time(reader: &mut ArgReader<'_>, field: &str) -> Option<DateTime<Utc>> {
    let raw = reader.required_string(field)?;
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(_) => {
            reader.violate(field, format!("'{}' is not an ISO 8601 timestamp such as 2024-05-01T00:00:00Z", raw));
            None
        }
    }
}

/// Traffic reports from the Reporting API.
#[derive(Clone)]
pub struct ReportingManager {
    logger: Logger,
    validation: Validation,
    orchestrator: Orchestrator,
}

impl ReportingManager {
    pub fn new(logger: Logger, validation: Validation, orchestrator: Orchestrator) -> Self {
        Self {
            logger: logger.child("reporting"),
            validation,
            orchestrator,
        }
    }

    pub async fn handle_action(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
        match action {
            "reporting_traffic" => self.traffic(&args).await,
            other => Err(unknown_tool_error("reporting action", other, REPORTING_ACTIONS)),
        }
    }

    async fn traffic(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let cpcodes = read_cpcodes(&mut reader, "cpcodes", MAX_CPCODES);
        let start = read_time(&mut reader, "start");
        let end = read_time(&mut reader, "end");
        let interval = reader
            .enum_value("interval", INTERVALS, Some("HOUR"))
            .unwrap_or_default();
        let mut metrics = reader.string_array("metrics", 0, 20);
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                reader.violate("end", "must be later than start");
            }
        }
        reader.finish()?;
        if metrics.is_empty() {
            metrics = DEFAULT_METRICS.iter().map(|m| m.to_string()).collect();
        }
        let start = start.map(|t| t.to_rfc3339()).unwrap_or_default();
        let end = end.map(|t| t.to_rfc3339()).unwrap_or_default();

        let body = self
            .orchestrator
            .fetch(
                "reporting_traffic",
                ApiRequest::post(
                    TRAFFIC_REPORT,
                    serde_json::json!({
                        "objectType": "cpcode",
                        "objectIds": cpcodes.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
                        "metrics": metrics,
                    }),
                )
                .with_query("start", start.as_str())
                .with_query("end", end.as_str())
                .with_query("interval", interval.as_str()),
                &ShapeCheck::new().expect("data", Expected::Array),
            )
            .await?;
        let data = lookup_items(&body, "data");
        self.logger.debug(
            "traffic report",
            Some(&serde_json::json!({"cpcodes": cpcodes.len(), "rows": data.len()})),
        );

        let mut columns = vec!["Time"];
        columns.extend(metrics.iter().map(|m| m.as_str()));
        let rows = data
            .iter()
            .map(|row| {
                let mut cells = vec![lookup(row, "startdatetime")
                    .map(display_value)
                    .unwrap_or_else(|| "-".to_string())];
                cells.extend(metrics.iter().map(|m| {
                    lookup(row, m)
                        .map(display_value)
                        .unwrap_or_else(|| "-".to_string())
                }));
                cells
            })
            .collect();
        let mut report = Report::new("Traffic by time")
            .summary(format!(
                "{} CP code(s), {} to {}, interval {}.",
                cpcodes.len(),
                start,
                end,
                interval
            ))
            .table("Traffic", &columns, rows);
        if let Some(summary) = lookup(&body, "summaryStatistics").and_then(|s| s.as_object()) {
            let pairs = summary
                .iter()
                .map(|(metric, stats)| {
                    let value = stats
                        .get("value")
                        .map(display_value)
                        .unwrap_or_else(|| display_value(stats));
                    (metric.clone(), value)
                })
                .collect();
            report = report.key_values("Summary", pairs);
        }
        Ok(ToolOutput::new(
            serde_json::json!({
                "cpcodes": cpcodes,
                "start": start,
                "end": end,
                "interval": interval,
                "metrics": metrics,
                "data": data,
                "summaryStatistics": body.get("summaryStatistics"),
            }),
            report,
        ))
    }
}

#[async_trait::async_trait]
impl ToolHandler for ReportingManager {
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

    fn manager(api: Arc<FakeApi>) -> ReportingManager {
        ReportingManager::new(Logger::new("test"), Validation::new(), orchestrator_with(api))
    }

    #[tokio::test]
    async fn traffic_posts_object_ids_and_window() {
        let api = Arc::new(FakeApi::new().on(
            Method::POST,
            TRAFFIC_REPORT,
            200,
            json!({"data": [{"startdatetime": "2024-05-01T00:00:00Z", "edgeHitsPerSecond": 12.5}]}),
        ));
        let out = manager(api.clone())
            .handle_action(
                "reporting_traffic",
                json!({"cpcodes": [123], "start": "2024-05-01T00:00:00Z", "end": "2024-05-02T00:00:00Z", "interval": "day"}),
            )
            .await
            .expect("report");
        assert_eq!(out.data["interval"], "DAY");
        assert_eq!(out.data["data"].as_array().map(|d| d.len()), Some(1));
        let call = &api.calls()[0];
        assert_eq!(call.query_value("interval"), Some("DAY"));
        assert_eq!(call.body.as_ref().map(|b| b["objectIds"].clone()), Some(json!(["123"])));
        assert_eq!(
            call.body.as_ref().map(|b| b["metrics"].clone()),
            Some(json!(["edgeHitsPerSecond", "edgeBytesPerSecond"]))
        );
    }

    #[tokio::test]
    async fn inverted_window_is_rejected() {
        let err = manager(Arc::new(FakeApi::new()))
            .handle_action(
                "reporting_traffic",
                json!({"cpcodes": [1], "start": "2024-05-02T00:00:00Z", "end": "2024-05-01T00:00:00Z"}),
            )
            .await
            .expect_err("window");
        assert!(err.message.contains("end: must be later than start"));
    }
}
