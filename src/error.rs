//! Error taxonomy shared by the hardware and marketplace clients.
//!
//! Transport failures, application-level rejections (`success: false`) and
//! local precondition failures all surface as one `IntegrationError` so
//! callers can present any of them the same way.

use std::time::Duration;

use thiserror::Error;

use crate::devices::DeviceKind;

/// Result alias used by every command function.
pub type IntegrationResult<T> = Result<T, IntegrationError>;

#[derive(Debug, Error)]
pub enum IntegrationError {
    /// Connect/DNS/TLS failure or a broken response body.
    #[error("{0}")]
    Network(String),

    /// Non-2xx HTTP status from the bridge backend.
    #[error("{message} (HTTP {status})")]
    Http { status: u16, message: String },

    /// The backend answered `success: false`.
    #[error("{0}")]
    Rejected(String),

    /// The operation needs a prior successful connect for this device.
    #[error("{} not connected", .0.label())]
    NotConnected(DeviceKind),

    /// A required config or credential field is missing or blank.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A command argument is out of range (e.g. a non-positive amount).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The per-request deadline elapsed before the bridge answered.
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    /// Another connect/disconnect for the same device or platform is in flight.
    #[error("{0} already has an operation in progress")]
    Busy(String),

    #[error("Invalid response from bridge: {0}")]
    InvalidResponse(String),

    #[error("Credential store error: {0}")]
    Credential(String),
}

impl IntegrationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, IntegrationError::Timeout(_))
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, IntegrationError::NotConnected(_))
    }

    /// Missing-field helper used by config and credential validation.
    pub(crate) fn missing_field(field: &str) -> Self {
        IntegrationError::InvalidConfig(format!("missing required field: {field}"))
    }
}
