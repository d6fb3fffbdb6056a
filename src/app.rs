use crate::config::{CacheBackend, Settings};
use crate::constants::cache::NAME_CACHE_MAX_ENTRIES;
use crate::errors::ToolError;
use crate::managers;
use crate::mcp::routes::handler_names;
use crate::services::cache::CacheService;
use crate::services::client::{AkamaiApi, EdgeGridClient};
use crate::services::logger::Logger;
use crate::services::name_cache::NameCache;
use crate::services::orchestrator::Orchestrator;
use crate::services::selection::policy_from_name;
use crate::services::tool_executor::{ToolExecutor, ToolHandler};
use crate::services::validation::Validation;
use crate::stores::{CacheStore, FileCacheStore, MemoryCacheStore};
use std::collections::HashMap;
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub tool_executor: Arc<ToolExecutor>,
    pub orchestrator: Orchestrator,
}

fn root_logger(settings: &Settings) -> Logger {
    let logger = Logger::new("akamai-mcp");
    if let Some(level) = settings.log_level {
        logger.set_level(level);
    }
    logger
}

impl App {
    fn validate_tool_wiring(handlers: &HashMap<String, Arc<dyn ToolHandler>>) -> Result<(), ToolError> {
        let mut missing: Vec<&str> = handler_names()
            .into_iter()
            .filter(|name| !handlers.contains_key(*name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ToolError::unknown("Tool wiring is incomplete")
            .with_hint("Every handler named in the route table must be registered at startup.")
            .with_details(serde_json::json!({ "missing_handlers": missing })))
    }

    /// Builds the server against the live EdgeGrid API.
    pub fn initialize(settings: Settings) -> Result<Self, ToolError> {
        let logger = root_logger(&settings);
        let client = EdgeGridClient::new(
            logger.clone(),
            settings.credentials.clone(),
            settings.credentials_error.clone(),
            settings.request_timeout,
        )?;
        if !client.is_configured() {
            logger.warn(
                "Akamai credentials not configured; API tools will fail until they are",
                Some(&serde_json::json!({
                    "edgerc": settings.edgerc_path.display().to_string(),
                    "section": settings.section,
                    "reason": settings.credentials_error,
                })),
            );
        }
        Self::assemble(logger, settings, Arc::new(client))
    }

    /// Builds the server against any [`AkamaiApi`]; used by tests.
    pub fn with_api(settings: Settings, api: Arc<dyn AkamaiApi>) -> Result<Self, ToolError> {
        Self::assemble(root_logger(&settings), settings, api)
    }

    fn assemble(logger: Logger, settings: Settings, api: Arc<dyn AkamaiApi>) -> Result<Self, ToolError> {
        let store: Arc<dyn CacheStore> = match settings.cache_backend {
            CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
            CacheBackend::File => Arc::new(FileCacheStore::new(settings.cache_dir.clone())),
        };
        let cache = CacheService::new(logger.clone(), store);
        let orchestrator = Orchestrator::new(
            logger.clone(),
            api,
            cache,
            policy_from_name(&settings.selection_policy),
            Arc::new(NameCache::new(NAME_CACHE_MAX_ENTRIES)),
            &settings,
        );
        let validation = Validation::new();

        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        handlers.insert(
            "account".to_string(),
            Arc::new(managers::account::AccountManager::new(
                logger.clone(),
                validation.clone(),
                orchestrator.clone(),
            )),
        );
        handlers.insert(
            "property".to_string(),
            Arc::new(managers::property::PropertyManager::new(
                logger.clone(),
                validation.clone(),
                orchestrator.clone(),
            )),
        );
        handlers.insert(
            "dns".to_string(),
            Arc::new(managers::dns::DnsManager::new(
                logger.clone(),
                validation.clone(),
                orchestrator.clone(),
            )),
        );
        handlers.insert(
            "purge".to_string(),
            Arc::new(managers::purge::PurgeManager::new(
                logger.clone(),
                validation.clone(),
                orchestrator.clone(),
            )),
        );
        handlers.insert(
            "cps".to_string(),
            Arc::new(managers::cps::CpsManager::new(
                logger.clone(),
                validation.clone(),
                orchestrator.clone(),
            )),
        );
        handlers.insert(
            "reporting".to_string(),
            Arc::new(managers::reporting::ReportingManager::new(
                logger.clone(),
                validation.clone(),
                orchestrator.clone(),
            )),
        );
        handlers.insert(
            "security".to_string(),
            Arc::new(managers::security::SecurityManager::new(
                logger.clone(),
                validation.clone(),
                orchestrator.clone(),
            )),
        );
        handlers.insert(
            "securemobi".to_string(),
            Arc::new(managers::securemobi::SecureMobiManager::new(
                logger.clone(),
                validation,
                settings.request_timeout,
            )?),
        );

        Self::validate_tool_wiring(&handlers)?;

        let tool_executor = Arc::new(ToolExecutor::new(logger.clone(), handlers));
        logger.info(
            "server ready",
            Some(&serde_json::json!({
                "cache_store": orchestrator.cache().store_name(),
                "selection_policy": settings.selection_policy,
            })),
        );
        Ok(Self {
            logger,
            tool_executor,
            orchestrator,
        })
    }
}
