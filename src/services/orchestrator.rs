use crate::config::{PollSettings, Settings};
use crate::constants::cache as ttl;
use crate::errors::ToolError;
use crate::services::cache::{CacheKey, CacheService, KeyPattern, ResourceKind};
use crate::services::client::{AkamaiApi, ApiRequest, ApiResponse};
use crate::services::logger::Logger;
use crate::services::name_cache::NameCache;
use crate::services::response::ShapeCheck;
use crate::services::selection::SelectionPolicy;
use crate::utils::data_path::lookup_items;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Shared plumbing for the managers: cached reads, writes with
/// post-success invalidation, and default contract/group resolution.
#[derive(Clone)]
pub struct Orchestrator {
    logger: Logger,
    api: Arc<dyn AkamaiApi>,
    cache: CacheService,
    policy: Arc<dyn SelectionPolicy>,
    names: Arc<NameCache>,
    staging_poll: PollSettings,
    production_poll: PollSettings,
}

/// A read result and whether it came from the cache.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: Value,
    pub cached: bool,
}

impl Orchestrator {
    pub fn new(
        logger: Logger,
        api: Arc<dyn AkamaiApi>,
        cache: CacheService,
        policy: Arc<dyn SelectionPolicy>,
        names: Arc<NameCache>,
        settings: &Settings,
    ) -> Self {
        Self {
            logger: logger.child("orchestrator"),
            api,
            cache,
            policy,
            names,
            staging_poll: settings.staging_poll,
            production_poll: settings.production_poll,
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn names(&self) -> &NameCache {
        &self.names
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn poll_settings(&self, network: &str) -> PollSettings {
        if network.eq_ignore_ascii_case(crate::constants::network::PRODUCTION) {
            self.production_poll
        } else {
            self.staging_poll
        }
    }

    /// Live call with a shape check on the body.
    pub async fn call(&self, context: &str, request: ApiRequest, shape: &ShapeCheck) -> Result<ApiResponse, ToolError> {
        let response = self.api.request(request).await?;
        shape.check(context, &response.body)?;
        Ok(response)
    }

    pub async fn fetch(&self, context: &str, request: ApiRequest, shape: &ShapeCheck) -> Result<Value, ToolError> {
        Ok(self.call(context, request, shape).await?.body)
    }

    /// Serves `key` from the cache when present, otherwise fetches, checks
    /// and stores the body for `ttl`.
    pub async fn cached_read(
        &self,
        context: &str,
        key: CacheKey,
        ttl: Duration,
        request: ApiRequest,
        shape: &ShapeCheck,
    ) -> Result<Fetched, ToolError> {
        if let Some(body) = self.cache.get(&key) {
            return Ok(Fetched { body, cached: true });
        }
        let body = self.fetch(context, request, shape).await?;
        self.cache.set(&key, &body, ttl);
        Ok(Fetched {
            body,
            cached: false,
        })
    }

    /// Issues a write. Cache entries matching `invalidate` are dropped only
    /// after the vendor accepted it and the response passed `shape`.
    pub async fn mutate(
        &self,
        context: &str,
        request: ApiRequest,
        shape: &ShapeCheck,
        invalidate: &[KeyPattern],
    ) -> Result<ApiResponse, ToolError> {
        let response = self.call(context, request, shape).await?;
        if !invalidate.is_empty() {
            let removed = self.cache.invalidate(invalidate);
            self.logger.debug(
                "write invalidated cache",
                Some(&serde_json::json!({"context": context, "removed": removed})),
            );
        }
        Ok(response)
    }

    pub async fn contracts(&self) -> Result<Fetched, ToolError> {
        let fetched = self
            .cached_read(
                "contract_list",
                CacheKey::kind_only(ResourceKind::Contracts),
                ttl::CONTRACTS_TTL,
                ApiRequest::get("/papi/v1/contracts"),
                &ShapeCheck::items("contracts"),
            )
            .await?;
        self.names.remember_items(
            lookup_items(&fetched.body, "contracts.items"),
            "contractId",
            "contractTypeName",
        );
        Ok(fetched)
    }

    pub async fn groups(&self) -> Result<Fetched, ToolError> {
        let fetched = self
            .cached_read(
                "group_list",
                CacheKey::kind_only(ResourceKind::Groups),
                ttl::GROUPS_TTL,
                ApiRequest::get("/papi/v1/groups"),
                &ShapeCheck::items("groups"),
            )
            .await?;
        self.names
            .remember_items(lookup_items(&fetched.body, "groups.items"), "groupId", "groupName");
        Ok(fetched)
    }

    /// The given contract, or the policy's choice from the contract list.
    pub async fn resolve_contract(&self, given: Option<String>) -> Result<String, ToolError> {
        if let Some(contract) = given {
            return Ok(contract);
        }
        let contracts = self.contracts().await?;
        let chosen = self
            .policy
            .pick_contract(lookup_items(&contracts.body, "contracts.items"))
            .ok_or_else(|| {
                ToolError::not_found("No contracts are visible to these credentials")
                    .with_hint("Check the API client's grants or pass contractId explicitly.")
            })?;
        self.log_default("contract", &chosen);
        Ok(chosen)
    }

    /// Fills in a missing contract and/or group. A given group without a
    /// contract takes the group's first contract.
    pub async fn resolve_contract_and_group(
        &self,
        contract: Option<String>,
        group: Option<String>,
    ) -> Result<(String, String), ToolError> {
        if let (Some(contract), Some(group)) = (&contract, &group) {
            return Ok((contract.clone(), group.clone()));
        }
        let groups = self.groups().await?;
        let items = lookup_items(&groups.body, "groups.items");

        if let Some(group) = group {
            let contract = match contract {
                Some(contract) => contract,
                None => items
                    .iter()
                    .find(|g| g.get("groupId").and_then(|v| v.as_str()) == Some(group.as_str()))
                    .and_then(|g| g.get("contractIds"))
                    .and_then(|ids| ids.as_array())
                    .and_then(|ids| ids.first())
                    .and_then(|id| id.as_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| {
                        ToolError::not_found(format!("Group {} was not found or has no contract", group))
                            .with_hint("Use group_list to find a valid groupId, or pass contractId.")
                    })?,
            };
            return Ok((contract, group));
        }

        let choice = self
            .policy
            .pick_group(items, contract.as_deref())
            .ok_or_else(|| {
                let scope = contract
                    .as_deref()
                    .map(|c| format!(" for contract {}", c))
                    .unwrap_or_default();
                ToolError::not_found(format!("No groups are visible{}", scope))
                    .with_hint("Use group_list to find a valid groupId.")
            })?;
        let contract = match choice.contract_id {
            Some(contract) => contract,
            None => self.resolve_contract(None).await?,
        };
        self.log_default("group", &choice.group_id);
        Ok((contract, choice.group_id))
    }

    fn log_default(&self, what: &str, id: &str) {
        self.logger.info(
            "selected default",
            Some(&serde_json::json!({"what": what, "id": id, "policy": self.policy.name()})),
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::fake_api::FakeApi;
    use crate::services::response::Expected;
    use crate::services::selection::FirstListed;
    use crate::stores::MemoryCacheStore;
    use reqwest::Method;
    use serde_json::json;

    pub(crate) fn orchestrator_with(api: Arc<FakeApi>) -> Orchestrator {
        let logger = Logger::new("test");
        Orchestrator::new(
            logger.clone(),
            api,
            CacheService::new(logger, Arc::new(MemoryCacheStore::new())),
            Arc::new(FirstListed),
            Arc::new(NameCache::new(100)),
            &Settings::for_tests(),
        )
    }

    fn zones_key() -> CacheKey {
        CacheKey::new(ResourceKind::Zones, "ctr_1", "")
    }

    fn seeded(orch: &Orchestrator) {
        orch.cache()
            .set(&zones_key(), &json!({"zones": []}), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn cached_read_hits_api_once() {
        let api = Arc::new(FakeApi::new().on(
            Method::GET,
            "/papi/v1/contracts",
            200,
            json!({"contracts": {"items": [{"contractId": "ctr_1", "contractTypeName": "Direct"}]}}),
        ));
        let orch = orchestrator_with(api.clone());
        assert!(!orch.contracts().await.unwrap().cached);
        assert!(orch.contracts().await.unwrap().cached);
        assert_eq!(api.calls_to(Method::GET, "/papi/v1/contracts"), 1);
        assert_eq!(orch.names().label("ctr_1"), "Direct (ctr_1)");
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_intact() {
        let api = Arc::new(FakeApi::new().on(
            Method::POST,
            "/config-dns/v2/zones",
            500,
            json!({"title": "Internal Server Error", "status": 500}),
        ));
        let orch = orchestrator_with(api);
        seeded(&orch);
        let err = orch
            .mutate(
                "dns_zone_create",
                ApiRequest::post("/config-dns/v2/zones", json!({})),
                &ShapeCheck::new(),
                &[KeyPattern::kind(ResourceKind::Zones)],
            )
            .await
            .expect_err("500");
        assert_eq!(err.kind, crate::errors::ToolErrorKind::Network);
        assert!(orch.cache().get(&zones_key()).is_some());
    }

    #[tokio::test]
    async fn malformed_write_response_does_not_invalidate() {
        let api = Arc::new(FakeApi::new().on(Method::POST, "/config-dns/v2/zones", 201, json!("oops")));
        let orch = orchestrator_with(api);
        seeded(&orch);
        let shape = ShapeCheck::new().expect("zone", Expected::String);
        assert!(orch
            .mutate(
                "dns_zone_create",
                ApiRequest::post("/config-dns/v2/zones", json!({})),
                &shape,
                &[KeyPattern::kind(ResourceKind::Zones)],
            )
            .await
            .is_err());
        assert!(orch.cache().get(&zones_key()).is_some());
    }

    #[tokio::test]
    async fn successful_write_invalidates_every_pattern() {
        let api = Arc::new(FakeApi::new().on(
            Method::POST,
            "/config-dns/v2/zones",
            201,
            json!({"zone": "example.com"}),
        ));
        let orch = orchestrator_with(api);
        seeded(&orch);
        let other = CacheKey::new(ResourceKind::Zone, "example.com", "");
        orch.cache().set(&other, &json!({}), Duration::from_secs(60));
        orch.mutate(
            "dns_zone_create",
            ApiRequest::post("/config-dns/v2/zones", json!({})),
            &ShapeCheck::new(),
            &[
                KeyPattern::kind(ResourceKind::Zones),
                KeyPattern::scoped(ResourceKind::Zone, "example.com"),
            ],
        )
        .await
        .expect("write");
        assert!(orch.cache().get(&zones_key()).is_none());
        assert!(orch.cache().get(&other).is_none());
    }

    #[tokio::test]
    async fn resolves_defaults_through_policy() {
        let api = Arc::new(FakeApi::new().on(
            Method::GET,
            "/papi/v1/groups",
            200,
            json!({"groups": {"items": [
                {"groupId": "grp_1", "groupName": "Root", "contractIds": ["ctr_A"]},
                {"groupId": "grp_2", "groupName": "Other", "contractIds": ["ctr_B"]}
            ]}}),
        ));
        let orch = orchestrator_with(api);
        assert_eq!(
            orch.resolve_contract_and_group(None, None).await.unwrap(),
            ("ctr_A".to_string(), "grp_1".to_string())
        );
        assert_eq!(
            orch.resolve_contract_and_group(None, Some("grp_2".into())).await.unwrap(),
            ("ctr_B".to_string(), "grp_2".to_string())
        );
        assert_eq!(
            orch.resolve_contract_and_group(Some("ctr_B".into()), None).await.unwrap(),
            ("ctr_B".to_string(), "grp_2".to_string())
        );
    }
}
