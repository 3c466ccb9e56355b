//! Token renewal against the Hailuo web API
//!
//! One renewal is one POST: the old token travels in the `token` header, the
//! query string carries the fixed web-client fingerprint plus two per-call
//! identifiers (a v4 UUID and a random device id), and a successful response
//! looks like `{"data": {"token": "..."}}`.
//!
//! Timeouts, transport errors, non-2xx statuses and malformed bodies are all
//! returned as errors. Nothing is retried here; the pool decides what to do
//! with a failed slot.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::RngExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tracing::debug;

use crate::constants::{
    FETCH_HEADERS, FINGERPRINT_HEAD, FINGERPRINT_TAIL, RENEWAL_ENDPOINT, RENEWAL_TIMEOUT,
    TOKEN_HEADER,
};
use crate::error::{Error, Result};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const DEVICE_ID_LEN: usize = 26;

/// Body returned by the renewal endpoint.
#[derive(Debug, Deserialize)]
pub struct RenewalResponse {
    pub data: RenewalData,
}

#[derive(Debug, Deserialize)]
pub struct RenewalData {
    pub token: String,
}

/// Exchanges one token for a fresh one.
///
/// The pool holds an `Arc<dyn TokenRenewer>` so tests can script outcomes
/// without a network.
pub trait TokenRenewer: Send + Sync {
    fn renew<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// HTTP renewal client for the Hailuo endpoint.
#[derive(Debug, Clone)]
pub struct RenewalClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl RenewalClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: RENEWAL_ENDPOINT.to_string(),
            timeout: RENEWAL_TIMEOUT,
        }
    }

    /// Point the client at a different renewal URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TokenRenewer for RenewalClient {
    fn renew<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(renew_token(&self.http, &self.endpoint, token, self.timeout))
    }
}

/// Perform a single renewal call and return the new token.
pub async fn renew_token(
    client: &reqwest::Client,
    endpoint: &str,
    token: &str,
    timeout: Duration,
) -> Result<String> {
    let query = renewal_query(&correlation_id(), &device_id(), unix_millis());
    let headers = renewal_headers(token)?;

    let response = client
        .post(endpoint)
        .query(&query)
        .headers(headers)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify_transport(e, timeout))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| classify_transport(e, timeout))?;

    if !status.is_success() {
        return Err(Error::Rejected(format!(
            "renewal endpoint returned {status}: {body}"
        )));
    }

    let parsed: RenewalResponse = serde_json::from_str(&body)
        .map_err(|e| Error::InvalidResponse(format!("missing data.token: {e}")))?;

    debug!("renewal call succeeded");
    Ok(parsed.data.token)
}

fn classify_transport(e: reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::Timeout(timeout)
    } else {
        Error::Http(format!("renewal request failed: {e}"))
    }
}

/// Headers for a renewal call. Compression negotiation is left to reqwest.
fn renewal_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static(TOKEN_HEADER),
        HeaderValue::from_str(token).map_err(|e| Error::InvalidToken(e.to_string()))?,
    );
    for (name, value) in FETCH_HEADERS {
        headers.insert(
            HeaderName::from_static(*name),
            HeaderValue::from_static(*value),
        );
    }
    Ok(headers)
}

/// Query string in the order the web client sends it.
pub fn renewal_query(uuid: &str, device_id: &str, unix_millis: u128) -> Vec<(&'static str, String)> {
    let mut query: Vec<(&'static str, String)> = FINGERPRINT_HEAD
        .iter()
        .map(|(k, v)| (*k, v.to_string()))
        .collect();
    query.push(("uuid", uuid.to_string()));
    query.push(("device_id", device_id.to_string()));
    query.extend(FINGERPRINT_TAIL.iter().map(|(k, v)| (*k, v.to_string())));
    query.push(("unix", unix_millis.to_string()));
    query
}

/// Random v4 correlation id (`xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx`).
pub fn correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Random lowercase base36 device identifier.
pub fn device_id() -> String {
    let mut rng = rand::rng();
    (0..DEVICE_ID_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect()
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
