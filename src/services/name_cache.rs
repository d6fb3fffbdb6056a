use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    names: HashMap<String, String>,
    order: VecDeque<String>,
}

/// Display names for contracts, groups and products keyed by prefixed ID.
/// Entries never expire but the map is bounded; the oldest insert is evicted
/// first.
pub struct NameCache {
    inner: RwLock<Inner>,
    max_entries: usize,
}

impl NameCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.names.get(id).cloned())
    }

    pub fn insert(&self, id: &str, name: &str) {
        let Ok(mut inner) = self.inner.write() else {
            return;
        };
        if inner.names.insert(id.to_string(), name.to_string()).is_none() {
            inner.order.push_back(id.to_string());
        }
        while inner.names.len() > self.max_entries {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.names.remove(&oldest);
        }
    }

    /// Records `(id, name)` pairs from a vendor listing such as
    /// `groups.items[*].{groupId, groupName}`.
    pub fn remember_items(&self, items: &[serde_json::Value], id_field: &str, name_field: &str) {
        for item in items {
            let id = item.get(id_field).and_then(|v| v.as_str());
            let name = item.get(name_field).and_then(|v| v.as_str());
            if let (Some(id), Some(name)) = (id, name) {
                self.insert(id, name);
            }
        }
    }

    /// Returns `"Name (id)"` when the name is known, otherwise the bare ID.
    pub fn label(&self, id: &str) -> String {
        match self.get(id) {
            Some(name) => format!("{} ({})", name, id),
            None => id.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.names.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evicts_oldest_when_full() {
        let cache = NameCache::new(2);
        cache.insert("grp_1", "One");
        cache.insert("grp_2", "Two");
        cache.insert("grp_3", "Three");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("grp_1"), None);
        assert_eq!(cache.get("grp_3").as_deref(), Some("Three"));
    }

    #[test]
    fn remembers_listing_items_and_labels() {
        let cache = NameCache::new(10);
        let items = vec![
            json!({"contractId": "ctr_1", "contractTypeName": "Direct"}),
            json!({"contractId": "ctr_2"}),
        ];
        cache.remember_items(&items, "contractId", "contractTypeName");
        assert_eq!(cache.label("ctr_1"), "Direct (ctr_1)");
        assert_eq!(cache.label("ctr_2"), "ctr_2");
    }
}
