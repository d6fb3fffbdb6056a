use std::env;
use std::path::PathBuf;

fn env_path(key: &str) -> Option<PathBuf> {
    let raw = env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }
    Some(expand_home(trimmed))
}

fn home_dir() -> Option<PathBuf> {
    env::var("HOME")
        .ok()
        .or_else(|| env::var("USERPROFILE").ok())
        .filter(|h| !h.trim().is_empty())
        .map(PathBuf::from)
}

/// Expands a leading `~` to the home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// `AKAMAI_EDGERC`, else `~/.edgerc`.
pub fn resolve_edgerc_path() -> PathBuf {
    env_path("AKAMAI_EDGERC").unwrap_or_else(|| expand_home("~/.edgerc"))
}

/// `AKAMAI_MCP_CACHE_DIR`, else `$XDG_STATE_HOME/akamai-mcp/cache`, else
/// `~/.local/state/akamai-mcp/cache`.
pub fn resolve_cache_dir() -> PathBuf {
    if let Some(dir) = env_path("AKAMAI_MCP_CACHE_DIR") {
        return dir;
    }
    let state = env_path("XDG_STATE_HOME")
        .or_else(|| home_dir().map(|home| home.join(".local").join("state")))
        .unwrap_or_else(env::temp_dir);
    state.join("akamai-mcp").join("cache")
}
