//! POS peripheral catalogue: device identifiers, per-device connect configs
//! and command payloads sent to the hardware bridge.
//!
//! Configs are serialised camelCase (`baudRate`, `paperWidth`, ...) because
//! that is what the bridge expects. Optional fields carry the bridge's
//! documented defaults so a caller can connect with just a port. Unknown keys
//! are kept in `extra` and forwarded untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{IntegrationError, IntegrationResult};

// ---------------------------------------------------------------------------
// Device identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    ThermalPrinter,
    BarcodeScanner,
    CashDrawer,
    PaymentTerminal,
    CustomerDisplay,
    Scale,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 6] = [
        DeviceKind::ThermalPrinter,
        DeviceKind::BarcodeScanner,
        DeviceKind::CashDrawer,
        DeviceKind::PaymentTerminal,
        DeviceKind::CustomerDisplay,
        DeviceKind::Scale,
    ];

    /// Identifier used in status snapshots (`thermal_printer`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::ThermalPrinter => "thermal_printer",
            DeviceKind::BarcodeScanner => "barcode_scanner",
            DeviceKind::CashDrawer => "cash_drawer",
            DeviceKind::PaymentTerminal => "payment_terminal",
            DeviceKind::CustomerDisplay => "customer_display",
            DeviceKind::Scale => "scale",
        }
    }

    /// URL segment under `/api/hardware/`.
    pub fn path_segment(self) -> &'static str {
        match self {
            DeviceKind::ThermalPrinter => "printer",
            DeviceKind::BarcodeScanner => "scanner",
            DeviceKind::CashDrawer => "cashdrawer",
            DeviceKind::PaymentTerminal => "payment",
            DeviceKind::CustomerDisplay => "display",
            DeviceKind::Scale => "scale",
        }
    }

    /// Human label used in operator-facing messages.
    pub fn label(self) -> &'static str {
        match self {
            DeviceKind::ThermalPrinter => "Thermal printer",
            DeviceKind::BarcodeScanner => "Barcode scanner",
            DeviceKind::CashDrawer => "Cash drawer",
            DeviceKind::PaymentTerminal => "Payment terminal",
            DeviceKind::CustomerDisplay => "Customer display",
            DeviceKind::Scale => "Scale",
        }
    }

    pub fn parse(raw: &str) -> Option<DeviceKind> {
        let raw = raw.trim();
        DeviceKind::ALL
            .into_iter()
            .find(|d| d.as_str() == raw || d.path_segment() == raw)
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_BAUD_RATE: u32 = 9600;
const DEFAULT_PAPER_WIDTH_MM: u32 = 80;
const DEFAULT_DISPLAY_SIZE: &str = "20x2";

/// Standard ESC/POS pulse command: ESC p m t1 t2
///
/// - `0x1B` (ESC)
/// - `0x70` (p): generate pulse
/// - `0x00`: pin 2 (connector pin)
/// - `0x19`: on time  (25 × 2ms = 50ms)
/// - `0xFA`: off time (250 × 2ms = 500ms)
pub const ESCPOS_DRAWER_KICK: [u8; 5] = [0x1B, 0x70, 0x00, 0x19, 0xFA];

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_paper_width() -> u32 {
    DEFAULT_PAPER_WIDTH_MM
}

fn default_true() -> bool {
    true
}

fn default_display_size() -> String {
    DEFAULT_DISPLAY_SIZE.to_string()
}

/// The kick sequence as the string the bridge forwards verbatim to the port.
fn default_kick_code() -> String {
    ESCPOS_DRAWER_KICK.iter().map(|b| char::from(*b)).collect()
}

fn require(field: &str, value: &str) -> IntegrationResult<()> {
    if value.trim().is_empty() {
        Err(IntegrationError::missing_field(field))
    } else {
        Ok(())
    }
}

/// Implemented by every connect config.
pub trait DeviceConfig: Serialize {
    const DEVICE: DeviceKind;

    /// Required-field presence check, run before any network call.
    fn validate(&self) -> IntegrationResult<()>;
}

// ---------------------------------------------------------------------------
// Thermal printer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Paper width in millimetres.
    #[serde(default = "default_paper_width")]
    pub paper_width: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_set: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PrinterConfig {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            paper_width: DEFAULT_PAPER_WIDTH_MM,
            character_set: None,
            extra: Map::new(),
        }
    }
}

impl DeviceConfig for PrinterConfig {
    const DEVICE: DeviceKind = DeviceKind::ThermalPrinter;

    fn validate(&self) -> IntegrationResult<()> {
        require("port", &self.port)
    }
}

// ---------------------------------------------------------------------------
// Barcode scanner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerType {
    #[default]
    UsbHid,
    Serial,
    Bluetooth,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    #[default]
    Continuous,
    Trigger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerConfig {
    pub port: String,
    #[serde(default, rename = "type")]
    pub scanner_type: ScannerType,
    #[serde(default = "default_true")]
    pub auto_scan: bool,
    #[serde(default)]
    pub scan_mode: ScanMode,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScannerConfig {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            scanner_type: ScannerType::default(),
            auto_scan: true,
            scan_mode: ScanMode::default(),
            extra: Map::new(),
        }
    }
}

impl DeviceConfig for ScannerConfig {
    const DEVICE: DeviceKind = DeviceKind::BarcodeScanner;

    fn validate(&self) -> IntegrationResult<()> {
        require("port", &self.port)
    }
}

// ---------------------------------------------------------------------------
// Cash drawer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawerType {
    /// Kicked through the receipt printer's RJ11 DK port.
    #[default]
    Rj11,
    Usb,
    Serial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashDrawerConfig {
    pub port: String,
    #[serde(default, rename = "type")]
    pub drawer_type: DrawerType,
    #[serde(default = "default_kick_code")]
    pub kick_code: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CashDrawerConfig {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            drawer_type: DrawerType::default(),
            kick_code: default_kick_code(),
            extra: Map::new(),
        }
    }
}

impl DeviceConfig for CashDrawerConfig {
    const DEVICE: DeviceKind = DeviceKind::CashDrawer;

    fn validate(&self) -> IntegrationResult<()> {
        require("port", &self.port)
    }
}

// ---------------------------------------------------------------------------
// Payment terminal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTerminalConfig {
    pub port: String,
    pub merchant_id: String,
    pub terminal_id: String,
    /// Terminal vendor/model, e.g. "ingenico", "verifone", "pax".
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub terminal_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PaymentTerminalConfig {
    pub fn new(port: &str, merchant_id: &str, terminal_id: &str) -> Self {
        Self {
            port: port.to_string(),
            merchant_id: merchant_id.to_string(),
            terminal_id: terminal_id.to_string(),
            terminal_type: None,
            extra: Map::new(),
        }
    }
}

impl DeviceConfig for PaymentTerminalConfig {
    const DEVICE: DeviceKind = DeviceKind::PaymentTerminal;

    fn validate(&self) -> IntegrationResult<()> {
        require("port", &self.port)?;
        require("merchantId", &self.merchant_id)?;
        require("terminalId", &self.terminal_id)
    }
}

// ---------------------------------------------------------------------------
// Customer display
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayType {
    #[default]
    Usb,
    Serial,
    Network,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDisplayConfig {
    pub port: String,
    #[serde(default, rename = "type")]
    pub display_type: DisplayType,
    /// Columns x lines, e.g. "20x2".
    #[serde(default = "default_display_size")]
    pub display_size: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CustomerDisplayConfig {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            display_type: DisplayType::default(),
            display_size: default_display_size(),
            extra: Map::new(),
        }
    }
}

impl DeviceConfig for CustomerDisplayConfig {
    const DEVICE: DeviceKind = DeviceKind::CustomerDisplay;

    fn validate(&self) -> IntegrationResult<()> {
        require("port", &self.port)
    }
}

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Kg,
    G,
    Lb,
}

impl WeightUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            WeightUnit::Kg => "kg",
            WeightUnit::G => "g",
            WeightUnit::Lb => "lb",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub unit: WeightUnit,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScaleConfig {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            unit: WeightUnit::default(),
            extra: Map::new(),
        }
    }
}

impl DeviceConfig for ScaleConfig {
    const DEVICE: DeviceKind = DeviceKind::Scale;

    fn validate(&self) -> IntegrationResult<()> {
        require("port", &self.port)
    }
}

// ---------------------------------------------------------------------------
// Command payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintKind {
    #[default]
    Receipt,
    Invoice,
    Label,
    Test,
}

/// Body of `POST /api/hardware/printer/print`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintJob {
    #[serde(rename = "type", default)]
    pub kind: PrintKind,
    pub content: String,
}

impl PrintJob {
    pub fn receipt(content: impl Into<String>) -> Self {
        Self {
            kind: PrintKind::Receipt,
            content: content.into(),
        }
    }
}

/// Card transaction type sent to the payment terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[default]
    Sale,
    Refund,
    Void,
    PreAuth,
}

/// Body of `POST /api/hardware/payment/process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPaymentRequest {
    /// Amount in VND.
    pub amount: i64,
    pub transaction_type: TransactionType,
    /// RFC 3339 timestamp of when the request was issued.
    pub timestamp: String,
}

/// A weight read from the connected scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightReading {
    pub weight: f64,
    pub unit: WeightUnit,
}
