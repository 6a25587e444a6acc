//! Truong Phat Computer - integration client layer.
//!
//! Clients used by the admin console to drive POS peripherals and
//! marketplace channels through their bridge backends:
//!
//! - `HardwareClient`: printer, barcode scanner, cash drawer, payment
//!   terminal, customer display and scale
//! - `MarketplaceClient`: Shopee, Lazada, Tiki, Sendo, Facebook Shop and
//!   Instagram Shop
//!
//! Both are plain values built from a `Transport`; nothing is process-global.
//! A typical setup:
//!
//! ```no_run
//! use std::sync::Arc;
//! use truongphat_integrations::{
//!     BridgeConfig, HardwareClient, KeyboardFeed, KeyringTokenStore, PrinterConfig,
//! };
//!
//! # async fn demo() -> Result<(), truongphat_integrations::IntegrationError> {
//! let hardware = HardwareClient::connect_http(
//!     BridgeConfig::from_env(),
//!     Arc::new(KeyringTokenStore::new()),
//!     KeyboardFeed::new(),
//! )?;
//! hardware.connect_thermal_printer(&PrinterConfig::new("COM1")).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod devices;
pub mod error;
pub mod hardware_manager;
pub mod logging;
pub mod marketplace;
pub mod registry;
pub mod scanner;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use api::{Ack, Bridge, BridgeRequest, HttpMethod, HttpTransport, TargetOutcome, Transport};
pub use config::BridgeConfig;
pub use devices::{
    CashDrawerConfig, CustomerDisplayConfig, DeviceKind, PaymentTerminalConfig, PrintJob,
    PrintKind, PrinterConfig, ScaleConfig, ScannerConfig, TransactionType, WeightReading,
    WeightUnit,
};
pub use error::{IntegrationError, IntegrationResult};
pub use hardware_manager::{DeviceConnection, DeviceStatus, DeviceStatusSnapshot, HardwareClient};
pub use logging::{init_logging, LogSettings};
pub use marketplace::{
    FacebookCredentials, InstagramCredentials, IntegrationStatusSnapshot, LazadaCredentials,
    MarketplaceClient, PlatformId, PlatformStatus, SendoCredentials, ShopeeCredentials,
    SyncReport, TikiCredentials,
};
pub use registry::{ConnectionRegistry, SingleFlight};
pub use scanner::{BarcodeScan, KeyEvent, KeyboardFeed, ScanSubscription};
pub use storage::{KeyringTokenStore, StaticToken, TokenSource};
