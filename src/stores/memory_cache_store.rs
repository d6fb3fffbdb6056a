use crate::services::cache::{CacheKey, KeyPattern};
use crate::stores::{CacheStore, CacheStoreError};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<CacheKey, Entry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheStoreError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &CacheKey, value: &Value, ttl: Duration) -> Result<(), CacheStoreError> {
        self.entries.insert(
            key.clone(),
            Entry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn remove_matching(&self, pattern: &KeyPattern) -> Result<usize, CacheStoreError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !pattern.matches(key));
        Ok(before.saturating_sub(self.entries.len()))
    }

    fn len(&self) -> usize {
        self.purge_expired();
        self.entries.len()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::ResourceKind;
    use serde_json::json;

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let store = MemoryCacheStore::new();
        let key = CacheKey::new(ResourceKind::Contracts, "", "");
        store.set(&key, &json!("x"), Duration::from_millis(0)).unwrap();
        assert!(store.get(&key).unwrap().is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn remove_matching_counts_removed_entries() {
        let store = MemoryCacheStore::new();
        for scope in ["a", "b", "c"] {
            let key = CacheKey::new(ResourceKind::Properties, scope, "");
            store.set(&key, &json!(scope), Duration::from_secs(60)).unwrap();
        }
        let removed = store
            .remove_matching(&KeyPattern::scoped(ResourceKind::Properties, "b"))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 2);
    }
}
