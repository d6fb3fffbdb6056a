use crate::services::cache::{CacheKey, KeyPattern};
use crate::stores::{CacheStore, CacheStoreError};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One JSON file per entry, named by the sha256 of the rendered key. The
/// structured key is stored inside the file so invalidation can match on it.
#[derive(Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.to_string().as_bytes());
        self.dir
            .join(format!("{}.json", hex::encode(hasher.finalize())))
    }

    fn is_expired(entry: &Value) -> bool {
        let Some(expires_at) = entry.get("expires_at_ms").and_then(|v| v.as_i64()) else {
            return true;
        };
        chrono::Utc::now().timestamp_millis() >= expires_at
    }

    fn read_entry(path: &Path) -> Result<Option<Value>, CacheStoreError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry: Value = serde_json::from_str(&raw)
            .map_err(|err| CacheStoreError::Corrupt(format!("{}: {}", path.display(), err)))?;
        Ok(Some(entry))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheStoreError> {
        let listing = match std::fs::read_dir(&self.dir) {
            Ok(listing) => listing,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut out = Vec::new();
        for item in listing {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                out.push(path);
            }
        }
        Ok(out)
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheStoreError> {
        let path = self.entry_path(key);
        let Some(entry) = Self::read_entry(&path)? else {
            return Ok(None);
        };
        if Self::is_expired(&entry) {
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }
        let stored_key: CacheKey = serde_json::from_value(entry.get("key").cloned().unwrap_or(Value::Null))
            .map_err(|err| CacheStoreError::Corrupt(err.to_string()))?;
        if &stored_key != key {
            return Ok(None);
        }
        Ok(entry.get("value").cloned())
    }

    fn set(&self, key: &CacheKey, value: &Value, ttl: Duration) -> Result<(), CacheStoreError> {
        let now = chrono::Utc::now();
        let payload = serde_json::json!({
            "key": key,
            "created_at": now.to_rfc3339(),
            "expires_at_ms": now.timestamp_millis() + ttl.as_millis() as i64,
            "value": value,
        });
        let serialized = serde_json::to_string_pretty(&payload)?;
        write_atomically(&self.entry_path(key), &format!("{}\n", serialized))?;
        Ok(())
    }

    fn remove_matching(&self, pattern: &KeyPattern) -> Result<usize, CacheStoreError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            let entry = match Self::read_entry(&path) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(CacheStoreError::Corrupt(_)) => {
                    let _ = std::fs::remove_file(&path);
                    continue;
                }
                Err(err) => return Err(err),
            };
            let Ok(key) = serde_json::from_value::<CacheKey>(entry.get("key").cloned().unwrap_or(Value::Null)) else {
                let _ = std::fs::remove_file(&path);
                continue;
            };
            if pattern.matches(&key) {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.entry_files()
            .map(|files| {
                files
                    .iter()
                    .filter(|path| {
                        matches!(Self::read_entry(path), Ok(Some(entry)) if !Self::is_expired(&entry))
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Writes to a sibling temp file and renames it over the target, so readers
/// never observe a half-written entry.
fn write_atomically(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(tmp, path)
}
