//! EdgeGrid `EG1-HMAC-SHA256` request signing.

use crate::config::Credentials;
use crate::constants::limits::MAX_EDGEGRID_BODY_BYTES;
use crate::errors::ToolError;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; 32], ToolError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| ToolError::unknown(format!("Invalid HMAC key: {}", err)))?;
    mac.update(message);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// The pieces of a request that participate in the signature.
#[derive(Debug, Clone)]
pub struct SigningInput<'a> {
    pub method: &'a str,
    pub scheme: &'a str,
    pub host: &'a str,
    /// Path plus `?query` when present.
    pub path_and_query: &'a str,
    pub body: Option<&'a [u8]>,
}

pub struct EdgeGridSigner {
    client_token: String,
    client_secret: String,
    access_token: String,
}

impl EdgeGridSigner {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            client_token: credentials.client_token.clone(),
            client_secret: credentials.client_secret.clone(),
            access_token: credentials.access_token.clone(),
        }
    }

    pub fn timestamp() -> String {
        chrono::Utc::now().format("%Y%m%dT%H:%M:%S+0000").to_string()
    }

    /// `Authorization` header value with a fresh timestamp and nonce.
    pub fn authorization(&self, input: &SigningInput<'_>) -> Result<String, ToolError> {
        let nonce = uuid::Uuid::new_v4().to_string();
        self.authorization_with(input, &Self::timestamp(), &nonce)
    }

    pub fn authorization_with(
        &self,
        input: &SigningInput<'_>,
        timestamp: &str,
        nonce: &str,
    ) -> Result<String, ToolError> {
        let prefix = format!(
            "EG1-HMAC-SHA256 client_token={};access_token={};timestamp={};nonce={};",
            self.client_token, self.access_token, timestamp, nonce
        );
        let signing_key = B64.encode(hmac_sha256(self.client_secret.as_bytes(), timestamp.as_bytes())?);
        let data = [
            input.method.to_uppercase(),
            input.scheme.to_lowercase(),
            input.host.to_lowercase(),
            input.path_and_query.to_string(),
            String::new(),
            content_hash(input.method, input.body),
            prefix.clone(),
        ]
        .join("\t");
        let signature = B64.encode(hmac_sha256(signing_key.as_bytes(), data.as_bytes())?);
        Ok(format!("{}signature={}", prefix, signature))
    }
}

/// Only POST bodies are hashed, truncated to the EdgeGrid maximum.
fn content_hash(method: &str, body: Option<&[u8]>) -> String {
    match body {
        Some(bytes) if method.eq_ignore_ascii_case("POST") && !bytes.is_empty() => {
            let end = bytes.len().min(MAX_EDGEGRID_BODY_BYTES);
            B64.encode(Sha256::digest(&bytes[..end]))
        }
        _ => String::new(),
    }
}
