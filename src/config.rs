use crate::constants::{network, polling};
use crate::services::logger::LogLevel;
use crate::utils::paths::{resolve_cache_dir, resolve_edgerc_path};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EdgercError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("section [{0}] not found")]
    MissingSection(String),
    #[error("section [{section}] is missing '{field}'")]
    MissingField { section: String, field: &'static str },
}

/// EdgeGrid API client credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub client_token: String,
    pub client_secret: String,
    pub access_token: String,
    pub account_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("client_token", &"***")
            .field("client_secret", &"***")
            .field("access_token", &"***")
            .field("account_key", &self.account_key)
            .finish()
    }
}

/// Parses the sections of an `.edgerc` INI document. Keys are lower-cased,
/// values trimmed, `;`/`#` lines ignored.
pub fn parse_edgerc(raw: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current = String::from("default");
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_string();
            sections.entry(current.clone()).or_default();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        sections
            .entry(current.clone())
            .or_default()
            .insert(key.trim().to_lowercase(), value.to_string());
    }
    sections
}

impl Credentials {
    pub fn from_edgerc_str(raw: &str, section: &str) -> Result<Self, EdgercError> {
        let sections = parse_edgerc(raw);
        let values = sections
            .get(section)
            .ok_or_else(|| EdgercError::MissingSection(section.to_string()))?;
        let field = |name: &'static str| -> Result<String, EdgercError> {
            values
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| EdgercError::MissingField {
                    section: section.to_string(),
                    field: name,
                })
        };
        Ok(Self {
            host: field("host")?,
            client_token: field("client_token")?,
            client_secret: field("client_secret")?,
            access_token: field("access_token")?,
            account_key: values
                .get("account_key")
                .filter(|v| !v.is_empty())
                .cloned(),
        })
    }

    pub fn from_edgerc_file(path: &Path, section: &str) -> Result<Self, EdgercError> {
        let raw = std::fs::read_to_string(path).map_err(|source| EdgercError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_edgerc_str(&raw, section)
    }

    /// All four `AKAMAI_*` credential variables, if every one is set.
    fn from_env() -> Option<Self> {
        let host = env_string("AKAMAI_HOST")?;
        Some(Self {
            host,
            client_token: env_string("AKAMAI_CLIENT_TOKEN")?,
            client_secret: env_string("AKAMAI_CLIENT_SECRET")?,
            access_token: env_string("AKAMAI_ACCESS_TOKEN")?,
            account_key: None,
        })
    }

    /// Base URL for requests. Hosts without a scheme use https.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(polling::INTERVAL_MS),
            max_attempts: polling::MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub edgerc_path: PathBuf,
    pub section: String,
    /// `None` when no usable credentials were found; tools then fail with a
    /// permission error instead of the server refusing to start.
    pub credentials: Option<Credentials>,
    pub credentials_error: Option<String>,
    pub cache_backend: CacheBackend,
    pub cache_dir: PathBuf,
    pub selection_policy: String,
    pub staging_poll: PollSettings,
    pub production_poll: PollSettings,
    pub request_timeout: Duration,
    pub log_level: Option<LogLevel>,
}

/// Overrides taken from the command line; they win over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub edgerc: Option<PathBuf>,
    pub section: Option<String>,
    pub log_level: Option<LogLevel>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::load(&Overrides::default())
    }

    pub fn load(overrides: &Overrides) -> Self {
        let edgerc_path = overrides
            .edgerc
            .clone()
            .unwrap_or_else(resolve_edgerc_path);
        let section = overrides
            .section
            .clone()
            .or_else(|| env_string("AKAMAI_SECTION"))
            .unwrap_or_else(|| "default".to_string());

        let (credentials, credentials_error) = match Credentials::from_env() {
            Some(creds) => (Some(creds), None),
            None => match Credentials::from_edgerc_file(&edgerc_path, &section) {
                Ok(creds) => (Some(creds), None),
                Err(err) => (None, Some(err.to_string())),
            },
        };
        let credentials = credentials.map(|mut creds| {
            if let Some(key) = env_string("AKAMAI_ACCOUNT_SWITCH_KEY") {
                creds.account_key = Some(key);
            }
            creds
        });

        let cache_backend = match env_string("AKAMAI_MCP_CACHE_STORE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "file" => CacheBackend::File,
            _ => CacheBackend::Memory,
        };

        let shared = PollSettings {
            interval: env_u64("AKAMAI_MCP_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or_else(|| PollSettings::default().interval),
            max_attempts: env_u64("AKAMAI_MCP_POLL_MAX_ATTEMPTS")
                .map(|n| n.clamp(1, u32::MAX as u64) as u32)
                .unwrap_or(polling::MAX_ATTEMPTS),
        };

        Self {
            edgerc_path,
            section,
            credentials,
            credentials_error,
            cache_backend,
            cache_dir: resolve_cache_dir(),
            selection_policy: env_string("AKAMAI_MCP_SELECTION_POLICY")
                .unwrap_or_else(|| "first".to_string()),
            staging_poll: poll_for_network("STAGING", shared),
            production_poll: poll_for_network("PRODUCTION", shared),
            request_timeout: Duration::from_millis(
                env_u64("AKAMAI_MCP_REQUEST_TIMEOUT_MS").unwrap_or(network::TIMEOUT_API_REQUEST_MS),
            ),
            log_level: overrides.log_level,
        }
    }

    /// Settings with no credentials and default tuning, for tests that
    /// inject their own API client.
    pub fn for_tests() -> Self {
        Self {
            edgerc_path: PathBuf::from("/nonexistent/.edgerc"),
            section: "default".to_string(),
            credentials: None,
            credentials_error: None,
            cache_backend: CacheBackend::Memory,
            cache_dir: std::env::temp_dir().join("akamai-mcp-test-cache"),
            selection_policy: "first".to_string(),
            staging_poll: PollSettings {
                interval: Duration::from_millis(0),
                max_attempts: 5,
            },
            production_poll: PollSettings {
                interval: Duration::from_millis(0),
                max_attempts: 5,
            },
            request_timeout: Duration::from_millis(network::TIMEOUT_API_REQUEST_MS),
            log_level: None,
        }
    }
}

fn poll_for_network(network_name: &str, shared: PollSettings) -> PollSettings {
    let interval = env_u64(&format!("AKAMAI_MCP_{}_POLL_INTERVAL_MS", network_name))
        .map(Duration::from_millis)
        .unwrap_or(shared.interval);
    let max_attempts = env_u64(&format!("AKAMAI_MCP_{}_POLL_MAX_ATTEMPTS", network_name))
        .map(|n| n.clamp(1, u32::MAX as u64) as u32)
        .unwrap_or(shared.max_attempts);
    PollSettings {
        interval,
        max_attempts,
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key).and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDGERC: &str = r#"
; comment
[default]
host = akab-abc.luna.akamaiapis.net
client_token = akab-client
client_secret = c2VjcmV0
access_token = akab-access

[partial]
host = akab-x.luna.akamaiapis.net
"#;

    #[test]
    fn reads_named_section() {
        let creds = Credentials::from_edgerc_str(EDGERC, "default").expect("creds");
        assert_eq!(creds.host, "akab-abc.luna.akamaiapis.net");
        assert_eq!(creds.client_secret, "c2VjcmV0");
        assert_eq!(creds.account_key, None);
        assert_eq!(creds.base_url(), "https://akab-abc.luna.akamaiapis.net");
    }

    #[test]
    fn reports_missing_section_and_fields() {
        assert!(matches!(
            Credentials::from_edgerc_str(EDGERC, "prod"),
            Err(EdgercError::MissingSection(_))
        ));
        assert!(matches!(
            Credentials::from_edgerc_str(EDGERC, "partial"),
            Err(EdgercError::MissingField { field: "client_token", .. })
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let creds = Credentials::from_edgerc_str(EDGERC, "default").expect("creds");
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("c2VjcmV0"));
    }

    #[test]
    fn base_url_keeps_explicit_scheme() {
        let mut creds = Credentials::from_edgerc_str(EDGERC, "default").expect("creds");
        creds.host = "http://127.0.0.1:8080/".to_string();
        assert_eq!(creds.base_url(), "http://127.0.0.1:8080");
    }
}
