//! Request signing for the exchange REST API
//!
//! Signed endpoints take `timestamp` and `recvWindow` parameters and an
//! HMAC-SHA256 `signature` over the url-encoded query; the API key travels in
//! the `X-MBX-APIKEY` header.

use crate::error::{BotError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

#[derive(Clone)]
pub struct RequestSigner {
    api_key: String,
    api_secret: String,
    recv_window: u64,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("api_key", &"....")
            .field("api_secret", &"....")
            .field("recv_window", &self.recv_window)
            .finish()
    }
}

impl RequestSigner {
    pub fn new(api_key: &str, api_secret: &str, recv_window: u64) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            recv_window,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    /// Hex HMAC-SHA256 of `query`
    pub fn sign(&self, query: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| BotError::Auth(format!("Invalid API secret: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Encoded query with `timestamp`, `recvWindow` and `signature` appended
    pub fn signed_query(&self, params: &[(&str, String)], timestamp_ms: i64) -> Result<String> {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in params {
            serializer.append_pair(key, value);
        }
        serializer.append_pair("timestamp", &timestamp_ms.to_string());
        serializer.append_pair("recvWindow", &self.recv_window.to_string());
        let query = serializer.finish();

        let signature = self.sign(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }
}

/// Encoded query for public endpoints
pub fn encode_query(params: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
