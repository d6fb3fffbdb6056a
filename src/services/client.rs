use crate::config::Credentials;
use crate::constants::{network, retry as retry_constants};
use crate::errors::ToolError;
use crate::services::edgegrid::{EdgeGridSigner, SigningInput};
use crate::services::logger::Logger;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use url::Url;

/// A vendor API call, relative to the configured API host.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn with_optional_query(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.with_query(key, value),
            None => self,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
        )
    }

    fn describe(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Lower-cased header names.
    pub headers: HashMap<String, String>,
    pub body: Value,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }
}

/// The seam between tool orchestration and HTTP. Implementations return
/// `Ok` only for 2xx responses and classify everything else as a
/// [`ToolError`].
#[async_trait]
pub trait AkamaiApi: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ToolError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
    pub status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry_constants::MAX_ATTEMPTS,
            base_delay_ms: retry_constants::BASE_DELAY_MS,
            max_delay_ms: retry_constants::MAX_DELAY_MS,
            jitter: retry_constants::JITTER,
            status_codes: retry_constants::STATUS_CODES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with jitter; a larger `Retry-After` wins.
    pub fn delay_for(&self, attempt: usize, retry_after: Option<&str>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let mut delay = (self.base_delay_ms as f64 * 2f64.powi(exponent)).min(self.max_delay_ms as f64);
        if self.jitter > 0.0 && delay > 0.0 {
            let spread = delay * self.jitter;
            delay = delay - spread + rand::random::<f64>() * spread * 2.0;
        }
        if let Some(seconds) = retry_after.and_then(|raw| raw.trim().parse::<u64>().ok()) {
            let requested = seconds.saturating_mul(1000).min(retry_constants::MAX_RETRY_AFTER_MS);
            delay = delay.max(requested as f64);
        }
        Duration::from_millis(delay.max(0.0) as u64)
    }
}

/// reqwest-backed [`AkamaiApi`] that signs every call with EdgeGrid.
pub struct EdgeGridClient {
    logger: Logger,
    http: Client,
    credentials: Option<Credentials>,
    signer: Option<EdgeGridSigner>,
    unconfigured_reason: Option<String>,
    retry: RetryPolicy,
}

impl EdgeGridClient {
    pub fn new(
        logger: Logger,
        credentials: Option<Credentials>,
        unconfigured_reason: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_millis(network::TIMEOUT_CONNECTION_MS))
            .user_agent(concat!("akamai-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ToolError::unknown(format!("Failed to build HTTP client: {}", err)))?;
        let signer = credentials.as_ref().map(EdgeGridSigner::new);
        Ok(Self {
            logger: logger.child("http"),
            http,
            credentials,
            signer,
            unconfigured_reason,
            retry: RetryPolicy::default(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn missing_credentials(&self) -> ToolError {
        let reason = self
            .unconfigured_reason
            .as_deref()
            .map(|r| format!(" ({})", r))
            .unwrap_or_default();
        ToolError::permission(format!("Akamai API credentials are not configured{}", reason))
            .with_hint(
                "Create ~/.edgerc with a [default] section (host, client_token, client_secret, access_token), \
                 point AKAMAI_EDGERC at it, or set AKAMAI_HOST, AKAMAI_CLIENT_TOKEN, AKAMAI_CLIENT_SECRET and AKAMAI_ACCESS_TOKEN.",
            )
    }

    fn build_url(&self, credentials: &Credentials, request: &ApiRequest) -> Result<Url, ToolError> {
        let path = if request.path.starts_with('/') {
            request.path.clone()
        } else {
            format!("/{}", request.path)
        };
        let mut url = Url::parse(&format!("{}{}", credentials.base_url(), path))
            .map_err(|err| ToolError::validation(format!("Invalid request URL: {}", err)))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
            if let Some(account) = credentials.account_key.as_deref() {
                if request.query_value("accountSwitchKey").is_none() {
                    pairs.append_pair("accountSwitchKey", account);
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    async fn send_once(
        &self,
        signer: &EdgeGridSigner,
        url: &Url,
        request: &ApiRequest,
        body: Option<&[u8]>,
    ) -> Result<ApiResponse, ToolError> {
        let host = match url.port() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
            None => url.host_str().unwrap_or_default().to_string(),
        };
        let path_and_query = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let authorization = signer.authorization(&SigningInput {
            method: request.method.as_str(),
            scheme: url.scheme(),
            host: &host,
            path_and_query: &path_and_query,
            body,
        })?;

        let mut headers = HeaderMap::new();
        let auth_value = HeaderValue::from_str(&authorization)
            .map_err(|err| ToolError::unknown(format!("Invalid Authorization header: {}", err)))?;
        headers.insert(AUTHORIZATION, auth_value);
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("application/json"));
        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| ToolError::validation(format!("Invalid header name {}: {}", name, err)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| ToolError::validation(format!("Invalid header value: {}", err)))?;
            headers.insert(name, value);
        }

        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .headers(headers);
        if let Some(bytes) = body {
            builder = builder.body(bytes.to_vec());
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect::<HashMap<_, _>>();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice::<Value>(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl AkamaiApi for EdgeGridClient {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ToolError> {
        let (Some(credentials), Some(signer)) = (self.credentials.as_ref(), self.signer.as_ref()) else {
            return Err(self.missing_credentials());
        };
        let url = self.build_url(credentials, &request)?;
        let body = request
            .body
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()?;
        let max_attempts = if request.is_idempotent() {
            self.retry.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let outcome = self.send_once(signer, &url, &request, body.as_deref()).await;
            match outcome {
                Ok(response) if (200..300).contains(&response.status) => {
                    self.logger.debug(
                        "request",
                        Some(&serde_json::json!({
                            "call": request.describe(),
                            "status": response.status,
                            "attempt": attempt,
                            "duration_ms": started.elapsed().as_millis() as u64,
                        })),
                    );
                    return Ok(response);
                }
                Ok(response) => {
                    let retryable = self.retry.status_codes.contains(&response.status);
                    if !retryable || attempt >= max_attempts {
                        return Err(ToolError::from_http_status(response.status, &response.body)
                            .with_details(serde_json::json!({
                                "status": response.status,
                                "request": request.describe(),
                                "problem": response.body,
                                "attempts": attempt,
                            })));
                    }
                    let delay = self.retry.delay_for(attempt, response.header("retry-after"));
                    self.logger.warn(
                        "HTTP retry",
                        Some(&serde_json::json!({
                            "call": request.describe(),
                            "status": response.status,
                            "attempt": attempt,
                            "delay_ms": delay.as_millis() as u64,
                        })),
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if !err.retryable || attempt >= max_attempts {
                        return Err(err);
                    }
                    let delay = self.retry.delay_for(attempt, None);
                    self.logger.warn(
                        "HTTP retry after transport error",
                        Some(&serde_json::json!({
                            "call": request.describe(),
                            "error": err.message,
                            "attempt": attempt,
                        })),
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ToolError {
    if err.is_timeout() {
        return ToolError::network(format!("Request to Akamai timed out: {}", err));
    }
    if err.is_decode() {
        return ToolError::malformed(format!("Could not decode Akamai response: {}", err));
    }
    ToolError::network(format!("Could not reach Akamai: {}", err))
}
