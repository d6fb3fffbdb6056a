pub mod file_cache_store;
pub mod memory_cache_store;

use crate::services::cache::{CacheKey, KeyPattern};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub use file_cache_store::FileCacheStore;
pub use memory_cache_store::MemoryCacheStore;

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry is corrupt: {0}")]
    Corrupt(String),
    #[error("cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Backing storage for [`crate::services::cache::CacheService`]. Single-key
/// operations must be atomic on their own; nothing spans keys.
pub trait CacheStore: Send + Sync {
    /// Returns `None` for absent or expired entries.
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheStoreError>;
    fn set(&self, key: &CacheKey, value: &Value, ttl: Duration) -> Result<(), CacheStoreError>;
    /// Removes every entry whose key matches; returns how many were removed.
    fn remove_matching(&self, pattern: &KeyPattern) -> Result<usize, CacheStoreError>;
    fn len(&self) -> usize;
    fn name(&self) -> &'static str;
}
