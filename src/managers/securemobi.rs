//! SecureMobi tenant administration. SecureMobi is not an EdgeGrid API: it
//! authenticates with OAuth client credentials read from the environment on
//! every call, so the server starts fine without them.

use crate::constants::network::TIMEOUT_CONNECTION_MS;
use crate::constants::securemobi::{DEFAULT_API_URL, TOKEN_SKEW_SECS};
use crate::errors::ToolError;
use crate::services::client::map_reqwest_error;
use crate::services::formatter::{Report, ToolOutput};
use crate::services::logger::Logger;
use crate::services::response::{Expected, ShapeCheck};
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::Validation;
use crate::utils::data_path::{lookup, lookup_items, lookup_str};
use crate::utils::text::display_value;
use crate::utils::tool_errors::unknown_tool_error;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SECUREMOBI_ACTIONS: &[&str] = &[
    "securemobi_tenant_list",
    "securemobi_tenant_get",
    "securemobi_tenant_create",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct SecureMobiCredentials {
    client_id: String,
    client_secret: String,
    api_url: String,
}

impl SecureMobiCredentials {
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ToolError> {
        let read = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let client_id = read("SECUREMOBI_CLIENT_ID");
        let client_secret = read("SECUREMOBI_CLIENT_SECRET");
        let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
            return Err(ToolError::permission("SecureMobi credentials are not configured")
                .with_hint("Set SECUREMOBI_CLIENT_ID and SECUREMOBI_CLIENT_SECRET in the server environment and restart the client."));
        };
        let api_url = read("SECUREMOBI_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client_id,
            client_secret,
            api_url,
        })
    }

    fn from_env() -> Result<Self, ToolError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

struct CachedToken {
    owner: SecureMobiCredentials,
    value: String,
    expires_at: Instant,
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice::<Value>(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}

fn field(item: &Value, path: &str) -> String {
    lookup(item, path)
        .map(display_value)
        .unwrap_or_else(|| "-".to_string())
}

#[derive(Clone)]
pub struct SecureMobiManager {
    logger: Logger,
    validation: Validation,
    http: Client,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl SecureMobiManager {
    pub fn new(logger: Logger, validation: Validation, timeout: Duration) -> Result<Self, ToolError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_millis(TIMEOUT_CONNECTION_MS))
            .user_agent(concat!("akamai-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ToolError::unknown(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self {
            logger: logger.child("securemobi"),
            validation,
            http,
            token: Arc::new(Mutex::new(None)),
        })
    }

    pub async fn handle_action(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
        if !SECUREMOBI_ACTIONS.contains(&action) {
            return Err(unknown_tool_error("securemobi action", action, SECUREMOBI_ACTIONS));
        }
        let credentials = SecureMobiCredentials::from_env()?;
        match action {
            "securemobi_tenant_list" => self.list_tenants(&credentials).await,
            "securemobi_tenant_get" => self.get_tenant(&credentials, &args).await,
            _ => self.create_tenant(&credentials, &args).await,
        }
    }

    async fn access_token(&self, credentials: &SecureMobiCredentials) -> Result<String, ToolError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.owner == *credentials && token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let form = serde_urlencoded::to_string([
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ])
        .map_err(|err| ToolError::unknown(format!("Failed to encode token request: {}", err)))?;
        let response = self
            .http
            .post(format!("{}/oauth/token", credentials.api_url))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = decode_body(&response.bytes().await.map_err(map_reqwest_error)?);
        if !(200..300).contains(&status) {
            return Err(ToolError::from_http_status(status, &body)
                .with_hint("Check SECUREMOBI_CLIENT_ID and SECUREMOBI_CLIENT_SECRET."));
        }
        let value = lookup_str(&body, "access_token")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ToolError::malformed("SecureMobi token response has no access_token"))?
            .to_string();
        let lifetime = lookup(&body, "expires_in").and_then(|v| v.as_u64()).unwrap_or(300);
        self.logger.debug(
            "securemobi token issued",
            Some(&serde_json::json!({"expires_in": lifetime})),
        );
        *guard = Some(CachedToken {
            owner: credentials.clone(),
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime.saturating_sub(TOKEN_SKEW_SECS)),
        });
        Ok(value)
    }

    async fn send(
        &self,
        credentials: &SecureMobiCredentials,
        method: Method,
        path: &str,
        body: Option<Value>,
        shape: &ShapeCheck,
        context: &str,
    ) -> Result<Value, ToolError> {
        let token = self.access_token(credentials).await?;
        let mut builder = self
            .http
            .request(method.clone(), format!("{}{}", credentials.api_url, path))
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let started = Instant::now();
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = decode_body(&response.bytes().await.map_err(map_reqwest_error)?);
        self.logger.debug(
            "securemobi request",
            Some(&serde_json::json!({
                "method": method.as_str(),
                "path": path,
                "status": status,
                "duration_ms": started.elapsed().as_millis() as u64,
            })),
        );
        if status == 401 {
            *self.token.lock().await = None;
        }
        if !(200..300).contains(&status) {
            return Err(ToolError::from_http_status(status, &body));
        }
        shape.check(context, &body)?;
        Ok(body)
    }

    async fn list_tenants(&self, credentials: &SecureMobiCredentials) -> Result<ToolOutput, ToolError> {
        let body = self
            .send(
                credentials,
                Method::GET,
                "/v1/tenants",
                None,
                &ShapeCheck::new().expect("tenants", Expected::Array),
                "securemobi_tenant_list",
            )
            .await?;
        let tenants = lookup_items(&body, "tenants");
        let rows = tenants
            .iter()
            .map(|t| vec![field(t, "tenantId"), field(t, "name"), field(t, "status"), field(t, "contactEmail")])
            .collect();
        let report = Report::new("SecureMobi tenants")
            .summary(format!("{} tenant(s).", tenants.len()))
            .table("Tenants", &["ID", "Name", "Status", "Contact"], rows);
        Ok(ToolOutput::new(serde_json::json!({"tenants": tenants}), report))
    }

    async fn get_tenant(&self, credentials: &SecureMobiCredentials, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let tenant_id = reader.required_string("tenantId");
        reader.finish()?;
        let tenant_id = tenant_id.unwrap_or_default();

        let body = self
            .send(
                credentials,
                Method::GET,
                &format!("/v1/tenants/{}", tenant_id),
                None,
                &ShapeCheck::new().expect("tenantId", Expected::Any),
                "securemobi_tenant_get",
            )
            .await?;
        let report = Report::new(format!("SecureMobi tenant {}", field(&body, "name"))).key_values(
            "Tenant",
            vec![
                ("ID".to_string(), tenant_id.clone()),
                ("Status".to_string(), field(&body, "status")),
                ("Contact".to_string(), field(&body, "contactEmail")),
                ("Created".to_string(), field(&body, "createdAt")),
            ],
        );
        Ok(ToolOutput::new(body, report))
    }

    async fn create_tenant(&self, credentials: &SecureMobiCredentials, args: &Value) -> Result<ToolOutput, ToolError> {
        let mut reader = self.validation.reader(args);
        let name = reader.required_string("name");
        let contact = reader.optional_string("contactEmail");
        if let Some(email) = contact.as_deref() {
            if !email.contains('@') {
                reader.violate("contactEmail", format!("'{}' is not an email address", email));
            }
        }
        let settings = reader.optional_object("settings");
        reader.finish()?;
        let name = name.unwrap_or_default();

        let mut payload = serde_json::json!({"name": name});
        if let Value::Object(map) = &mut payload {
            if let Some(contact) = contact {
                map.insert("contactEmail".to_string(), Value::String(contact));
            }
            if let Some(settings) = settings {
                map.insert("settings".to_string(), Value::Object(settings));
            }
        }
        let body = self
            .send(
                credentials,
                Method::POST,
                "/v1/tenants",
                Some(payload),
                &ShapeCheck::new().expect("tenantId", Expected::Any),
                "securemobi_tenant_create",
            )
            .await?;
        self.logger.info(
            "securemobi tenant created",
            Some(&serde_json::json!({"tenantId": body.get("tenantId")})),
        );
        let report = Report::new(format!("SecureMobi tenant {} created", name))
            .summary(format!("Tenant ID {}.", field(&body, "tenantId")));
        Ok(ToolOutput::new(body, report))
    }
}

#[async_trait::async_trait]
impl ToolHandler for SecureMobiManager {
    async fn handle(&self, action: &str, args: Value) -> Result<ToolOutput, ToolError> {
        self.logger.debug("handle_action", Some(&Value::String(action.to_string())));
        self.handle_action(action, args).await
    }
}
