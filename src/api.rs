//! Bridge backend API client.
//!
//! Provides authenticated HTTP communication with the hardware and
//! marketplace bridges. The `Transport` trait is the seam: `HttpTransport`
//! talks to the real backend over reqwest, tests plug in a recording mock.
//! `Bridge` wraps any transport with the per-request timeout, cancellation
//! and the `{ success, message }` envelope check shared by both clients.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::error::{IntegrationError, IntegrationResult};
use crate::storage::TokenSource;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// One request to the bridge. `path` includes the leading slash,
/// e.g. `/api/hardware/status`.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

impl BridgeRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> IntegrationResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| IntegrationError::InvalidRequest(format!("unserializable body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Sends one request and returns the parsed JSON body.
///
/// Implementations report network failures and non-2xx statuses as errors;
/// the `success: false` envelope check happens in `Bridge`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: BridgeRequest) -> IntegrationResult<Value>;
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly error.
fn friendly_error(base: &str, err: &reqwest::Error, timeout: Duration) -> IntegrationError {
    if err.is_timeout() {
        return IntegrationError::Timeout(timeout);
    }
    if err.is_connect() {
        return IntegrationError::Network(format!("Cannot reach bridge at {base}"));
    }
    if err.is_builder() {
        return IntegrationError::Network(format!("Invalid bridge URL: {base}"));
    }
    IntegrationError::Network(format!("Network error communicating with {base}: {err}"))
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session expired, please sign in again".to_string(),
        403 => "Not authorized for this operation".to_string(),
        404 => "Bridge endpoint not found".to_string(),
        s if s >= 500 => "Bridge server error".to_string(),
        _ => "Unexpected response from bridge".to_string(),
    }
}

/// Pull `error`/`message` out of an error body, falling back to the status text.
fn error_message(status: StatusCode, body_text: &str) -> String {
    serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|json| {
            json.get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| status_error(status))
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

pub struct HttpTransport {
    client: Client,
    config: BridgeConfig,
    tokens: Arc<dyn TokenSource>,
}

impl HttpTransport {
    pub fn new(config: BridgeConfig, tokens: Arc<dyn TokenSource>) -> IntegrationResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| IntegrationError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: BridgeRequest) -> IntegrationResult<Value> {
        let base = &self.config.base_url;
        let url = self.config.url_for(&request.path);

        let mut req = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };

        match self.tokens.bearer_token() {
            Some(token) => {
                req = req.bearer_auth(token.as_str());
            }
            None => warn!(path = %request.path, "no bearer token stored, sending unauthenticated"),
        }

        if let Some(body) = &request.body {
            // .json() also sets Content-Type: application/json
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(base, &e, self.config.request_timeout))?;
        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .map_err(|e| friendly_error(base, &e, self.config.request_timeout))?;

        if !status.is_success() {
            let message = error_message(status, &body_text);
            warn!(path = %request.path, status = status.as_u16(), %message, "bridge request failed");
            return Err(IntegrationError::Http {
                status: status.as_u16(),
                message,
            });
        }

        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| {
            IntegrationError::InvalidResponse(format!("body is not JSON: {e}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Bridge: timeout + cancellation + envelope
// ---------------------------------------------------------------------------

const DEFAULT_REJECTION: &str = "Request was rejected by the bridge";

/// Shared request path for the integration clients.
pub struct Bridge {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    cancel: Mutex<CancellationToken>,
}

impl Bridge {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Cancel every call currently in flight. Later calls are unaffected.
    pub fn cancel_pending(&self) {
        let mut guard = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        let old = std::mem::replace(&mut *guard, CancellationToken::new());
        old.cancel();
    }

    fn child_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .child_token()
    }

    /// Send and return the body without checking `success`.
    pub async fn call_raw(&self, request: BridgeRequest) -> IntegrationResult<Value> {
        let token = self.child_token();
        let path = request.path.clone();
        debug!(method = request.method.as_str(), path = %path, "bridge request");

        tokio::select! {
            _ = token.cancelled() => {
                debug!(path = %path, "bridge request cancelled");
                Err(IntegrationError::Cancelled)
            }
            result = tokio::time::timeout(self.timeout, self.transport.send(request)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => {
                        warn!(path = %path, timeout_secs = self.timeout.as_secs(), "bridge request timed out");
                        Err(IntegrationError::Timeout(self.timeout))
                    }
                }
            }
        }
    }

    /// Send and fail with `Rejected` when the body says `success: false`.
    pub async fn call(&self, request: BridgeRequest) -> IntegrationResult<Value> {
        let body = self.call_raw(request).await?;
        check_envelope(&body)?;
        Ok(body)
    }
}

/// `success: false` becomes `Rejected(message)`; a missing flag counts as
/// success (status endpoints return only `data`).
pub fn check_envelope(body: &Value) -> IntegrationResult<()> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = envelope_message(body).unwrap_or_else(|| DEFAULT_REJECTION.to_string());
        return Err(IntegrationError::Rejected(message));
    }
    Ok(())
}

pub fn envelope_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Move `key` out of `map` when its value reads as `T`; otherwise leave it.
pub(crate) fn take_field<T: DeserializeOwned>(
    map: &mut Map<String, Value>,
    key: &str,
) -> Option<T> {
    let parsed = serde_json::from_value(map.get(key)?.clone()).ok()?;
    map.remove(key);
    Some(parsed)
}

/// Outcome of a command the bridge acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ack {
    pub message: Option<String>,
}

impl Ack {
    pub fn from_body(body: &Value) -> Self {
        Self {
            message: envelope_message(body),
        }
    }
}

/// Per-target result of a bulk operation (one device or platform).
///
/// `target` is `None` when the bridge reported only an aggregate result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetOutcome<K> {
    #[serde(alias = "platform", alias = "device")]
    pub target: Option<K>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl<K> TargetOutcome<K> {
    pub fn ok(target: Option<K>, message: Option<String>) -> Self {
        Self {
            target,
            success: true,
            message,
            count: None,
        }
    }

    pub fn failed(target: Option<K>, message: String) -> Self {
        Self {
            target,
            success: false,
            message: Some(message),
            count: None,
        }
    }
}
