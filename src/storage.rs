//! Bearer-token storage using the OS credential store.
//!
//! On Windows this uses the Credential Manager (via the `keyring` crate), on
//! macOS Keychain, and on Linux the Secret Service API. The admin console
//! stores its session token here after login; every bridge request reads it
//! back through `TokenSource`.

use keyring::Entry;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::{IntegrationError, IntegrationResult};

const SERVICE_NAME: &str = "truongphat-admin";

const KEY_AUTH_TOKEN: &str = "auth_token";

/// Anything that can hand out the current bearer token.
pub trait TokenSource: Send + Sync {
    /// `None` when no session token is stored.
    fn bearer_token(&self) -> Option<Zeroizing<String>>;
}

// ---------------------------------------------------------------------------
// Keyring-backed store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Use a different keyring service name (one per environment/tenant).
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self) -> IntegrationResult<Entry> {
        Entry::new(&self.service, KEY_AUTH_TOKEN)
            .map_err(|e| IntegrationError::Credential(e.to_string()))
    }

    pub fn store_token(&self, token: &str) -> IntegrationResult<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(IntegrationError::missing_field("token"));
        }
        self.entry()?
            .set_password(token)
            .map_err(|e| IntegrationError::Credential(e.to_string()))?;
        info!(service = %self.service, "bearer token stored");
        Ok(())
    }

    /// Delete the stored token. Silently succeeds if none exists.
    pub fn clear_token(&self) -> IntegrationResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(IntegrationError::Credential(e.to_string())),
        }
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSource for KeyringTokenStore {
    fn bearer_token(&self) -> Option<Zeroizing<String>> {
        let entry = match self.entry() {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "keyring: failed to create entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(pw) => Some(Zeroizing::new(pw)),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, "keyring: failed to read bearer token");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fixed token
// ---------------------------------------------------------------------------

/// A token supplied up front by the embedding application.
pub struct StaticToken(Zeroizing<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }
}

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> Option<Zeroizing<String>> {
        let token = self.0.trim();
        if token.is_empty() {
            None
        } else {
            Some(Zeroizing::new(token.to_string()))
        }
    }
}
