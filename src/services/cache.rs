use crate::services::logger::Logger;
use crate::stores::{CacheStore, CacheStoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Contracts,
    Groups,
    Products,
    Properties,
    Property,
    Rules,
    Hostnames,
    EdgeHostnames,
    Includes,
    Zones,
    Zone,
    RecordSets,
    Enrollments,
    NetworkLists,
    AppsecConfigs,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Contracts => "contracts",
            ResourceKind::Groups => "groups",
            ResourceKind::Products => "products",
            ResourceKind::Properties => "properties",
            ResourceKind::Property => "property",
            ResourceKind::Rules => "rules",
            ResourceKind::Hostnames => "hostnames",
            ResourceKind::EdgeHostnames => "edge_hostnames",
            ResourceKind::Includes => "includes",
            ResourceKind::Zones => "zones",
            ResourceKind::Zone => "zone",
            ResourceKind::RecordSets => "recordsets",
            ResourceKind::Enrollments => "enrollments",
            ResourceKind::NetworkLists => "network_lists",
            ResourceKind::AppsecConfigs => "appsec_configs",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        const ALL: &[ResourceKind] = &[
            ResourceKind::Contracts,
            ResourceKind::Groups,
            ResourceKind::Products,
            ResourceKind::Properties,
            ResourceKind::Property,
            ResourceKind::Rules,
            ResourceKind::Hostnames,
            ResourceKind::EdgeHostnames,
            ResourceKind::Includes,
            ResourceKind::Zones,
            ResourceKind::Zone,
            ResourceKind::RecordSets,
            ResourceKind::Enrollments,
            ResourceKind::NetworkLists,
            ResourceKind::AppsecConfigs,
        ];
        ALL.iter().copied().find(|kind| kind.as_str() == raw)
    }
}

/// Structured cache key: `(kind, scope, detail)`. `scope` is usually the
/// owning resource (contract, zone, property), `detail` a version or filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub kind: ResourceKind,
    pub scope: String,
    pub detail: String,
}

impl CacheKey {
    pub fn new(kind: ResourceKind, scope: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            scope: scope.into(),
            detail: detail.into(),
        }
    }

    pub fn kind_only(kind: ResourceKind) -> Self {
        Self::new(kind, "", "")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind.as_str(), self.scope, self.detail)
    }
}

/// Key pattern; `None` components match anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    pub kind: Option<ResourceKind>,
    pub scope: Option<String>,
    pub detail: Option<String>,
}

impl KeyPattern {
    pub fn any() -> Self {
        Self {
            kind: None,
            scope: None,
            detail: None,
        }
    }

    pub fn kind(kind: ResourceKind) -> Self {
        Self {
            kind: Some(kind),
            scope: None,
            detail: None,
        }
    }

    pub fn scoped(kind: ResourceKind, scope: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            scope: Some(scope.into()),
            detail: None,
        }
    }

    /// Parses `kind[:scope[:detail]]` where any component may be `*`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().splitn(3, ':');
        let kind = match parts.next()? {
            "*" => None,
            other => Some(ResourceKind::parse(other)?),
        };
        let component = |part: Option<&str>| match part {
            None | Some("*") => None,
            Some(text) => Some(text.to_string()),
        };
        let scope = component(parts.next());
        let detail = component(parts.next());
        Some(Self {
            kind,
            scope,
            detail,
        })
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        if let Some(kind) = self.kind {
            if kind != key.kind {
                return false;
            }
        }
        if let Some(scope) = &self.scope {
            if scope != &key.scope {
                return false;
            }
        }
        if let Some(detail) = &self.detail {
            if detail != &key.detail {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.kind.map(|k| k.as_str()).unwrap_or("*"),
            self.scope.as_deref().unwrap_or("*"),
            self.detail.as_deref().unwrap_or("*")
        )
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidated: u64,
    pub errors: u64,
}

/// Read cache in front of the vendor API. Store failures are logged and
/// degrade to misses; callers never see them.
#[derive(Clone)]
pub struct CacheService {
    logger: Logger,
    store: Arc<dyn CacheStore>,
    stats: Arc<Mutex<CacheStats>>,
}

impl CacheService {
    pub fn new(logger: Logger, store: Arc<dyn CacheStore>) -> Self {
        Self {
            logger: logger.child("cache"),
            store,
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        match self.store.get(key) {
            Ok(Some(value)) => {
                self.bump(|s| s.hits += 1);
                self.logger
                    .debug("hit", Some(&serde_json::json!({"key": key.to_string()})));
                Some(value)
            }
            Ok(None) => {
                self.bump(|s| s.misses += 1);
                None
            }
            Err(err) => {
                self.record_error("read", key.to_string(), &err);
                self.bump(|s| s.misses += 1);
                None
            }
        }
    }

    pub fn set(&self, key: &CacheKey, value: &Value, ttl: Duration) {
        match self.store.set(key, value, ttl) {
            Ok(()) => self.bump(|s| s.writes += 1),
            Err(err) => self.record_error("write", key.to_string(), &err),
        }
    }

    pub fn invalidate(&self, patterns: &[KeyPattern]) -> usize {
        let mut removed = 0;
        for pattern in patterns {
            match self.store.remove_matching(pattern) {
                Ok(count) => removed += count,
                Err(err) => self.record_error("invalidate", pattern.to_string(), &err),
            }
        }
        if removed > 0 {
            self.bump(|s| s.invalidated += removed as u64);
        }
        self.logger.debug(
            "invalidate",
            Some(&serde_json::json!({
                "patterns": patterns.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
                "removed": removed,
            })),
        );
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record_error(&self, op: &str, key: String, err: &CacheStoreError) {
        self.bump(|s| s.errors += 1);
        self.logger.warn(
            "Cache store failure treated as miss",
            Some(&serde_json::json!({"op": op, "key": key, "error": err.to_string()})),
        );
    }

    fn bump(&self, apply: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            apply(&mut stats);
        }
    }
}
