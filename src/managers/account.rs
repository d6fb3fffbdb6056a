use crate::constants::cache as ttl;
use crate::errors::ToolError;
use crate::services::cache::{CacheKey, ResourceKind};
use crate::services::client::ApiRequest;
use crate::services::formatter::{Report, ToolOutput};
use crate::services::logger::Logger;
use crate::services::orchestrator::Orchestrator;
use crate::services::response::ShapeCheck;
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::Validation;
use crate::utils::data_path::{lookup_items, lookup_str};
use crate::utils::ids::IdKind;
use crate::utils::tool_errors::unknown_tool_error;
use serde_json::Value;

const ACCOUNT_ACTIONS: &[&str] = &["contract_list", "group_list", "product_list"];

/// Contracts, groups and products: the account context every other tool
/// defaults from.
#[derive(Clone)]
pub struct AccountManager {
    logger: Logger,
    validation: Validation,
    orchestrator: Orchestrator,
}

fn field(item: &Value, name: &str) -> String {
    lookup_str(item, name).unwrap_or("-").to_string()
}

impl AccountManager {
    pub fn new(logger: Logger, validation: Validation, orchestrator: Orchestrator) -> Self {
        Self {
            logger: logger.child("account"),
            validation,
            orchestrator,
        }
    }

    pub async fn handle_action(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
        match action {
            "contract_list" => self.contract_list().await,
            "group_list" => self.group_list(&args).await,
            "product_list" => self.product_list(&args).await,
            other => Err(unknown_tool_error("account action", other, ACCOUNT_ACTIONS)),
        }
    }

    async fn contract_list(&self) -> Result<ToolOutput, ToolError> {
        let fetched = self.orchestrator.contracts().await?;
        let items = lookup_items(&fetched.body, "contracts.items");
        let rows = items
            .iter()
            .map(|c| vec![field(c, "contractId"), field(c, "contractTypeName")])
            .collect();
        let report = Report::new("Contracts")
            .summary(format!("{} contract(s) visible to these credentials.", items.len()))
            .table("Contracts", &["Contract ID", "Type"], rows);
        Ok(ToolOutput::new(
            serde_json::json!({"contracts": items, "cached": fetched.cached}),
            report,
        ))
    }

    async fn group_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let contract = reader.optional_id("contractId", IdKind::Contract);
        reader.finish()?;

        let fetched = self.orchestrator.groups().await?;
        let groups: Vec<&Value> = lookup_items(&fetched.body, "groups.items")
            .iter()
            .filter(|g| match &contract {
                Some(contract) => g
                    .get("contractIds")
                    .and_then(|ids| ids.as_array())
                    .map(|ids| ids.iter().any(|id| id.as_str() == Some(contract.as_str())))
                    .unwrap_or(false),
                None => true,
            })
            .collect();

        let rows = groups
            .iter()
            .map(|g| {
                let contracts = g
                    .get("contractIds")
                    .and_then(|ids| ids.as_array())
                    .map(|ids| {
                        ids.iter()
                            .filter_map(|id| id.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                vec![
                    field(g, "groupId"),
                    field(g, "groupName"),
                    field(g, "parentGroupId"),
                    contracts,
                ]
            })
            .collect();
        let scope = contract
            .as_deref()
            .map(|c| format!(" on contract {}", c))
            .unwrap_or_default();
        let report = Report::new("Groups")
            .summary(format!("{} group(s){}.", groups.len(), scope))
            .table("Groups", &["Group ID", "Name", "Parent", "Contracts"], rows);
        Ok(ToolOutput::new(
            serde_json::json!({"groups": groups, "contractId": contract, "cached": fetched.cached}),
            report,
        ))
    }

    async fn product_list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let contract = reader.optional_id("contractId", IdKind::Contract);
        reader.finish()?;

        let contract = self.orchestrator.resolve_contract(contract).await?;
        let fetched = self
            .orchestrator
            .cached_read(
                "product_list",
                CacheKey::new(ResourceKind::Products, contract.as_str(), ""),
                ttl::PRODUCTS_TTL,
                ApiRequest::get("/papi/v1/products").with_query("contractId", contract.as_str()),
                &ShapeCheck::items("products"),
            )
            .await?;
        let items = lookup_items(&fetched.body, "products.items");
        self.orchestrator
            .names()
            .remember_items(items, "productId", "productName");
        self.logger.debug(
            "products",
            Some(&serde_json::json!({"contract": contract, "count": items.len()})),
        );

        let rows = items
            .iter()
            .map(|p| vec![field(p, "productId"), field(p, "productName")])
            .collect();
        let report = Report::new(format!("Products on {}", self.orchestrator.names().label(&contract)))
            .summary(format!("{} product(s).", items.len()))
            .table("Products", &["Product ID", "Name"], rows);
        Ok(ToolOutput::new(
            serde_json::json!({"contractId": contract, "products": items, "cached": fetched.cached}),
            report,
        ))
    }
}

#[async_trait::async_trait]
impl ToolHandler for AccountManager {
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

    fn manager(api: Arc<FakeApi>) -> AccountManager {
        AccountManager::new(Logger::new("test"), Validation::new(), orchestrator_with(api))
    }

    fn groups_body() -> Value {
        json!({"groups": {"items": [
            {"groupId": "grp_1", "groupName": "Root", "contractIds": ["ctr_A"]},
            {"groupId": "grp_2", "groupName": "Web", "parentGroupId": "grp_1", "contractIds": ["ctr_B"]}
        ]}})
    }

    #[tokio::test]
    async fn group_list_filters_by_contract_with_prefix_insertion() {
        let api = Arc::new(FakeApi::new().on(Method::GET, "/papi/v1/groups", 200, groups_body()));
        let out = manager(api)
            .handle_action("group_list", json!({"contractId": "B"}))
            .await
            .expect("groups");
        assert_eq!(out.data["contractId"], "ctr_B");
        assert_eq!(out.data["groups"].as_array().map(|g| g.len()), Some(1));
        assert_eq!(out.data["groups"][0]["groupId"], "grp_2");
    }

    #[tokio::test]
    async fn product_list_defaults_contract_and_caches() {
        let api = Arc::new(
            FakeApi::new()
                .on(
                    Method::GET,
                    "/papi/v1/contracts",
                    200,
                    json!({"contracts": {"items": [{"contractId": "ctr_A", "contractTypeName": "Direct"}]}}),
                )
                .on(
                    Method::GET,
                    "/papi/v1/products",
                    200,
                    json!({"products": {"items": [{"productId": "prd_Fresca", "productName": "Ion"}]}}),
                ),
        );
        let manager = manager(api.clone());
        let first = manager.handle_action("product_list", json!({})).await.expect("products");
        assert_eq!(first.data["contractId"], "ctr_A");
        assert_eq!(first.data["cached"], false);
        let second = manager.handle_action("product_list", json!({})).await.expect("products");
        assert_eq!(second.data["cached"], true);
        assert_eq!(api.calls_to(Method::GET, "/papi/v1/products"), 1);
        let call = api
            .calls()
            .into_iter()
            .find(|c| c.path == "/papi/v1/products")
            .expect("products call");
        assert_eq!(call.query_value("contractId"), Some("ctr_A"));
    }

    #[tokio::test]
    async fn malformed_contract_listing_is_reported() {
        let api = Arc::new(FakeApi::new().on(Method::GET, "/papi/v1/contracts", 200, json!({"contracts": {}})));
        let err = manager(api)
            .handle_action("contract_list", json!({}))
            .await
            .expect_err("shape");
        assert_eq!(err.kind, crate::errors::ToolErrorKind::MalformedResponse);
    }
}
