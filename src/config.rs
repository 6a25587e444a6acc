//! Bridge client configuration.
//!
//! The base URL and request timeout come from the environment (or are set
//! explicitly by the embedding application). Every request path starts with
//! `/api/...`, so the base URL is stored without a trailing `/api`.

use std::time::Duration;

use tracing::warn;

use crate::error::{IntegrationError, IntegrationResult};

pub const ENV_API_URL: &str = "TRUONGPHAT_API_URL";
pub const ENV_API_TIMEOUT_SECS: &str = "TRUONGPHAT_API_TIMEOUT_SECS";

const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Default timeout for bridge requests (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl BridgeConfig {
    pub fn new(base_url: &str, request_timeout: Duration) -> IntegrationResult<Self> {
        if request_timeout.is_zero() {
            return Err(IntegrationError::InvalidConfig(
                "request timeout must be greater than zero".into(),
            ));
        }
        let base_url = normalize_base_url(base_url);
        if base_url.is_empty() {
            return Err(IntegrationError::missing_field("base_url"));
        }
        Ok(Self {
            base_url,
            request_timeout,
            user_agent: default_user_agent(),
        })
    }

    /// Read `TRUONGPHAT_API_URL` / `TRUONGPHAT_API_TIMEOUT_SECS`, falling back
    /// to defaults for anything missing or unparseable.
    pub fn from_env() -> Self {
        let base_url = std::env::var(ENV_API_URL)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let request_timeout = match std::env::var(ENV_API_TIMEOUT_SECS) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!(
                        value = %raw,
                        var = ENV_API_TIMEOUT_SECS,
                        "invalid request timeout, using default"
                    );
                    DEFAULT_TIMEOUT
                }
            },
            Err(_) => DEFAULT_TIMEOUT,
        };

        Self {
            base_url: normalize_base_url(&base_url),
            request_timeout,
            user_agent: default_user_agent(),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("truongphat-integrations/{}", env!("CARGO_PKG_VERSION"))
}

/// Normalise the bridge base URL:
/// - ensure a scheme is present (http for localhost, https otherwise)
/// - strip trailing slashes
/// - strip a trailing `/api` segment
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    // "/api/" leaves a trailing slash behind
    while url.ends_with('/') {
        url.pop();
    }

    url
}
