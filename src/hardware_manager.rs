//! Hardware manager: peripheral client for the hardware bridge.
//!
//! Central coordinator for the six POS peripheral classes the admin console
//! drives through the bridge backend (printer, scanner, cash drawer, payment
//! terminal, customer display, scale).
//!
//! Responsibilities:
//! - Connect: validate the config, send it to the device endpoint, record
//!   the connection locally on success
//! - Commands: fail fast with `NotConnected` when the device was never
//!   connected from this client, before any network call
//! - Disconnect: drop the local entry only after the bridge confirms
//! - Status: best-effort server snapshot, never fails
//!
//! Connect and disconnect for the same device never overlap: a second call
//! while one is in flight fails with `Busy`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{
    take_field, Ack, Bridge, BridgeRequest, HttpTransport, TargetOutcome, Transport,
};
use crate::config::BridgeConfig;
use crate::devices::{
    CardPaymentRequest, CashDrawerConfig, CustomerDisplayConfig, DeviceConfig, DeviceKind,
    PaymentTerminalConfig, PrintJob, PrinterConfig, ScaleConfig, ScannerConfig, TransactionType,
    WeightReading, WeightUnit,
};
use crate::error::{IntegrationError, IntegrationResult};
use crate::registry::{ConnectionRegistry, SingleFlight};
use crate::scanner::{KeyboardFeed, ScanSubscription, ScannerListener};
use crate::storage::TokenSource;

const STATUS_PATH: &str = "/api/hardware/status";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Local record of a successful connect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConnection {
    pub device: DeviceKind,
    /// The config exactly as sent to the bridge, defaults included.
    pub config: Value,
    pub session_id: Uuid,
    pub connected_at: DateTime<Utc>,
}

impl DeviceConnection {
    pub fn port(&self) -> Option<&str> {
        self.config.get("port").and_then(Value::as_str)
    }
}

/// Server-reported state of one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub last_activity: Option<String>,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub sessions: Option<u64>,
    #[serde(default)]
    pub errors: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceStatus {
    /// Read one bridge status record. Only `connected` has to make sense;
    /// metadata of an unexpected shape is kept verbatim in `extra`.
    pub fn from_bridge(raw: &Value) -> Option<Self> {
        let record = raw.as_object()?;
        if let Ok(status) = serde_json::from_value::<Self>(raw.clone()) {
            return Some(status);
        }

        let mut extra = record.clone();
        Some(Self {
            connected: take_field(&mut extra, "connected").unwrap_or(false),
            last_activity: take_field(&mut extra, "lastActivity"),
            port: take_field(&mut extra, "port"),
            sessions: take_field(&mut extra, "sessions"),
            errors: take_field(&mut extra, "errors"),
            extra,
        })
    }
}

pub type DeviceStatusSnapshot = BTreeMap<DeviceKind, DeviceStatus>;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct HardwareClient {
    bridge: Bridge,
    registry: ConnectionRegistry<DeviceKind, DeviceConnection>,
    flights: SingleFlight<DeviceKind>,
    keyboard: KeyboardFeed,
    scanner: Mutex<Option<ScannerListener>>,
}

impl HardwareClient {
    pub fn new(transport: Arc<dyn Transport>, config: &BridgeConfig, keyboard: KeyboardFeed) -> Self {
        Self {
            bridge: Bridge::new(transport, config.request_timeout),
            registry: ConnectionRegistry::new(),
            flights: SingleFlight::new(),
            keyboard,
            scanner: Mutex::new(None),
        }
    }

    /// Client talking HTTP to the bridge at `config.base_url`.
    pub fn connect_http(
        config: BridgeConfig,
        tokens: Arc<dyn TokenSource>,
        keyboard: KeyboardFeed,
    ) -> IntegrationResult<Self> {
        let transport = HttpTransport::new(config.clone(), tokens)?;
        Ok(Self::new(Arc::new(transport), &config, keyboard))
    }

    // -- connect ------------------------------------------------------------

    pub async fn connect_thermal_printer(&self, config: &PrinterConfig) -> IntegrationResult<Ack> {
        self.connect(config).await
    }

    /// Connect the scanner and start turning keystrokes into scans.
    ///
    /// The returned subscription ends when the scanner is disconnected or
    /// connected again.
    pub async fn connect_barcode_scanner(
        &self,
        config: &ScannerConfig,
    ) -> IntegrationResult<ScanSubscription> {
        config.validate()?;
        let _flight = self.flights.begin(DeviceKind::BarcodeScanner)?;
        self.register(config).await?;

        let listener = ScannerListener::spawn(&self.keyboard);
        let subscription = listener.subscribe();
        let previous = self
            .scanner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(listener);
        if previous.is_some() {
            debug!("replacing previous scanner listener");
        }
        drop(previous);

        Ok(subscription)
    }

    pub async fn connect_cash_drawer(&self, config: &CashDrawerConfig) -> IntegrationResult<Ack> {
        self.connect(config).await
    }

    pub async fn connect_payment_terminal(
        &self,
        config: &PaymentTerminalConfig,
    ) -> IntegrationResult<Ack> {
        self.connect(config).await
    }

    pub async fn connect_customer_display(
        &self,
        config: &CustomerDisplayConfig,
    ) -> IntegrationResult<Ack> {
        self.connect(config).await
    }

    pub async fn connect_scale(&self, config: &ScaleConfig) -> IntegrationResult<Ack> {
        self.connect(config).await
    }

    async fn connect<C: DeviceConfig>(&self, config: &C) -> IntegrationResult<Ack> {
        config.validate()?;
        let _flight = self.flights.begin(C::DEVICE)?;
        let reply = self.register(config).await?;
        Ok(Ack::from_body(&reply))
    }

    /// Send the connect request and record the connection. Caller holds the
    /// single-flight guard for `C::DEVICE`.
    async fn register<C: DeviceConfig>(&self, config: &C) -> IntegrationResult<Value> {
        let device = C::DEVICE;
        let request = BridgeRequest::post(format!(
            "/api/hardware/{}/connect",
            device.path_segment()
        ))
        .with_json(config)?;
        let sent = request.body.clone().unwrap_or(Value::Null);

        let reply = self.bridge.call(request).await.map_err(|e| {
            warn!(device = %device, error = %e, "device connect failed");
            e
        })?;

        let connection = DeviceConnection {
            device,
            config: sent,
            session_id: Uuid::new_v4(),
            connected_at: Utc::now(),
        };
        let port = connection.port().unwrap_or_default().to_string();
        if let Some(previous) = self.registry.insert(device, connection) {
            // The old session is not disconnected on the bridge side.
            info!(device = %device, previous_session = %previous.session_id, "replaced existing connection");
        }
        info!(device = %device, port = %port, "device connected");
        Ok(reply)
    }

    // -- commands -----------------------------------------------------------

    fn require(&self, device: DeviceKind) -> IntegrationResult<DeviceConnection> {
        self.registry
            .get(device)
            .ok_or(IntegrationError::NotConnected(device))
    }

    pub async fn print_receipt(&self, job: &PrintJob) -> IntegrationResult<Ack> {
        self.require(DeviceKind::ThermalPrinter)?;
        let request = BridgeRequest::post("/api/hardware/printer/print").with_json(job)?;
        let reply = self.bridge.call(request).await?;
        info!(kind = ?job.kind, bytes = job.content.len(), "print job sent");
        Ok(Ack::from_body(&reply))
    }

    pub async fn open_cash_drawer(&self) -> IntegrationResult<Ack> {
        self.require(DeviceKind::CashDrawer)?;
        let reply = self
            .bridge
            .call(BridgeRequest::post("/api/hardware/cashdrawer/open"))
            .await?;
        info!("cash drawer opened");
        Ok(Ack::from_body(&reply))
    }

    pub async fn update_customer_display(&self, text: &str) -> IntegrationResult<Ack> {
        self.require(DeviceKind::CustomerDisplay)?;
        let request =
            BridgeRequest::post("/api/hardware/display/update").with_json(&json!({ "text": text }))?;
        let reply = self.bridge.call(request).await?;
        Ok(Ack::from_body(&reply))
    }

    /// Current weight; the unit comes from the bridge when it reports one,
    /// otherwise from the scale's connect config.
    pub async fn get_weight(&self) -> IntegrationResult<WeightReading> {
        let connection = self.require(DeviceKind::Scale)?;
        let reply = self
            .bridge
            .call(BridgeRequest::get("/api/hardware/scale/weight"))
            .await?;

        let weight = match reply.get("weight") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| IntegrationError::InvalidResponse("missing numeric weight".into()))?;

        let unit = reply
            .get("unit")
            .or_else(|| connection.config.get("unit"))
            .and_then(|u| serde_json::from_value::<WeightUnit>(u.clone()).ok())
            .unwrap_or_default();

        Ok(WeightReading { weight, unit })
    }

    /// Charge (or refund/void) `amount` VND on the payment terminal.
    pub async fn process_card_payment(
        &self,
        amount: i64,
        transaction_type: TransactionType,
    ) -> IntegrationResult<Ack> {
        self.require(DeviceKind::PaymentTerminal)?;
        if amount <= 0 {
            return Err(IntegrationError::InvalidRequest(format!(
                "payment amount must be positive, got {amount}"
            )));
        }
        let payload = CardPaymentRequest {
            amount,
            transaction_type,
            timestamp: Utc::now().to_rfc3339(),
        };
        let request = BridgeRequest::post("/api/hardware/payment/process").with_json(&payload)?;
        let reply = self.bridge.call(request).await.map_err(|e| {
            warn!(amount, ?transaction_type, error = %e, "card payment failed");
            e
        })?;
        info!(amount, ?transaction_type, "card payment processed");
        Ok(Ack::from_body(&reply))
    }

    /// Ask the bridge to run the device's self-test (test page, beep, ...).
    pub async fn test_device(&self, device: DeviceKind) -> IntegrationResult<Ack> {
        self.require(device)?;
        let reply = self
            .bridge
            .call(BridgeRequest::post(format!(
                "/api/hardware/{}/test",
                device.path_segment()
            )))
            .await?;
        Ok(Ack::from_body(&reply))
    }

    // -- disconnect ---------------------------------------------------------

    /// Disconnect on the bridge, then forget the device locally.
    pub async fn disconnect_device(&self, device: DeviceKind) -> IntegrationResult<Ack> {
        let _flight = self.flights.begin(device)?;
        let reply = self
            .bridge
            .call(BridgeRequest::post(format!(
                "/api/hardware/{}/disconnect",
                device.path_segment()
            )))
            .await
            .map_err(|e| {
                warn!(device = %device, error = %e, "device disconnect failed");
                e
            })?;

        self.registry.remove(device);
        if device == DeviceKind::BarcodeScanner {
            let listener = self
                .scanner
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            drop(listener);
        }
        info!(device = %device, "device disconnected");
        Ok(Ack::from_body(&reply))
    }

    /// Disconnect every locally connected device, one outcome per device.
    pub async fn disconnect_all(&self) -> Vec<TargetOutcome<DeviceKind>> {
        info!("Hardware manager: disconnecting all peripherals");
        let mut outcomes = Vec::new();
        for device in self.registry.keys() {
            let outcome = match self.disconnect_device(device).await {
                Ok(ack) => TargetOutcome::ok(Some(device), ack.message),
                Err(e) => TargetOutcome::failed(Some(device), e.to_string()),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    // -- queries ------------------------------------------------------------

    /// Server-reported status of every device. Any failure yields an empty
    /// snapshot so rendering is never blocked.
    pub async fn get_device_status(&self) -> DeviceStatusSnapshot {
        match self.bridge.call(BridgeRequest::get(STATUS_PATH)).await {
            Ok(body) => parse_status_snapshot(&body),
            Err(e) => {
                warn!(error = %e, "hardware status unavailable");
                DeviceStatusSnapshot::new()
            }
        }
    }

    pub fn is_connected(&self, device: DeviceKind) -> bool {
        self.registry.contains(device)
    }

    pub fn connection(&self, device: DeviceKind) -> Option<DeviceConnection> {
        self.registry.get(device)
    }

    pub fn connected_devices(&self) -> Vec<DeviceKind> {
        self.registry.keys()
    }

    /// Another subscription to the current scanner, if one is connected.
    pub fn subscribe_scans(&self) -> Option<ScanSubscription> {
        self.scanner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(ScannerListener::subscribe)
    }

    pub fn keyboard(&self) -> &KeyboardFeed {
        &self.keyboard
    }

    /// Abort every request this client has in flight.
    pub fn cancel_pending(&self) {
        self.bridge.cancel_pending();
    }
}

/// Parse `{ data: { device_id: {...} } }`, skipping unknown or malformed
/// entries.
fn parse_status_snapshot(body: &Value) -> DeviceStatusSnapshot {
    let Some(data) = body.get("data").and_then(Value::as_object) else {
        warn!("hardware status response has no data object");
        return DeviceStatusSnapshot::new();
    };

    data.iter()
        .filter_map(|(id, raw)| {
            let device = DeviceKind::parse(id).or_else(|| {
                debug!(device = %id, "ignoring status for unknown device");
                None
            })?;
            match DeviceStatus::from_bridge(raw) {
                Some(status) => Some((device, status)),
                None => {
                    debug!(device = %id, "ignoring non-object device status");
                    None
                }
            }
        })
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTransport;
    use std::time::Duration;

    fn client() -> (HardwareClient, Arc<MockTransport>) {
        let mock = Arc::new(MockTransport::new());
        let client = HardwareClient::new(mock.clone(), &BridgeConfig::default(), KeyboardFeed::new());
        (client, mock)
    }

    #[tokio::test]
    async fn test_reconnect_keeps_single_entry_last_write_wins() {
        let (hw, _mock) = client();
        hw.connect_scale(&ScaleConfig::new("COM1")).await.unwrap();
        hw.connect_scale(&ScaleConfig::new("COM2")).await.unwrap();

        assert_eq!(hw.connected_devices(), vec![DeviceKind::Scale]);
        assert_eq!(hw.connection(DeviceKind::Scale).unwrap().port(), Some("COM2"));
    }

    #[tokio::test]
    async fn test_commands_fail_fast_when_not_connected() {
        let (hw, mock) = client();

        let errors = vec![
            hw.print_receipt(&PrintJob::receipt("x")).await.unwrap_err(),
            hw.open_cash_drawer().await.unwrap_err(),
            hw.update_customer_display("Xin chao").await.unwrap_err(),
            hw.get_weight().await.unwrap_err(),
            hw.process_card_payment(150_000, TransactionType::Sale)
                .await
                .unwrap_err(),
        ];
        assert!(errors.iter().all(IntegrationError::is_not_connected));
        assert_eq!(errors[1].to_string(), "Cash drawer not connected");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cash_drawer_end_to_end() {
        let (hw, mock) = client();
        hw.connect_cash_drawer(&CashDrawerConfig::new("USB")).await.unwrap();
        assert_eq!(hw.connection(DeviceKind::CashDrawer).unwrap().port(), Some("USB"));

        mock.respond(
            "/api/hardware/cashdrawer/open",
            json!({ "success": true, "message": "Drawer opened" }),
        );
        let ack = hw.open_cash_drawer().await.unwrap();
        assert_eq!(ack.message.as_deref(), Some("Drawer opened"));
        assert!(mock.last_body("/api/hardware/cashdrawer/open").is_none());

        hw.disconnect_device(DeviceKind::CashDrawer).await.unwrap();
        assert!(!hw.is_connected(DeviceKind::CashDrawer));

        let calls_before = mock.calls().len();
        let err = hw.open_cash_drawer().await.unwrap_err();
        assert_eq!(err.to_string(), "Cash drawer not connected");
        assert_eq!(mock.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_printer_connect_fills_defaults() {
        let (hw, mock) = client();
        let config: PrinterConfig = serde_json::from_value(json!({ "port": "COM1" })).unwrap();
        hw.connect_thermal_printer(&config).await.unwrap();

        let body = mock.last_body("/api/hardware/printer/connect").unwrap();
        assert_eq!(body["port"], "COM1");
        assert_eq!(body["baudRate"], 9600);
        assert_eq!(body["paperWidth"], 80);
    }

    #[tokio::test]
    async fn test_failed_connect_registers_nothing() {
        let (hw, mock) = client();
        mock.respond(
            "/api/hardware/display/connect",
            json!({ "success": false, "message": "Port COM4 busy" }),
        );
        let err = hw
            .connect_customer_display(&CustomerDisplayConfig::new("COM4"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Port COM4 busy");
        assert!(!hw.is_connected(DeviceKind::CustomerDisplay));
    }

    #[tokio::test]
    async fn test_invalid_config_makes_no_request() {
        let (hw, mock) = client();
        let err = hw
            .connect_payment_terminal(&PaymentTerminalConfig::new("COM5", "", "T-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidConfig(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_disconnect_keeps_entry() {
        let (hw, mock) = client();
        hw.connect_scale(&ScaleConfig::new("COM3")).await.unwrap();
        mock.fail("/api/hardware/scale/disconnect", || IntegrationError::Http {
            status: 500,
            message: "Bridge server error".into(),
        });
        assert!(hw.disconnect_device(DeviceKind::Scale).await.is_err());
        assert!(hw.is_connected(DeviceKind::Scale));
    }

    #[tokio::test]
    async fn test_get_weight_uses_configured_unit() {
        let (hw, mock) = client();
        let mut config = ScaleConfig::new("COM3");
        config.unit = WeightUnit::G;
        hw.connect_scale(&config).await.unwrap();

        mock.respond("/api/hardware/scale/weight", json!({ "success": true, "weight": 512.5 }));
        let reading = hw.get_weight().await.unwrap();
        assert_eq!(reading, WeightReading { weight: 512.5, unit: WeightUnit::G });

        mock.respond("/api/hardware/scale/weight", json!({ "success": true }));
        assert!(matches!(
            hw.get_weight().await.unwrap_err(),
            IntegrationError::InvalidResponse(_)
        ));
    }

    #[tokio::test]
    async fn test_card_payment_body() {
        let (hw, mock) = client();
        hw.connect_payment_terminal(&PaymentTerminalConfig::new("COM5", "M-001", "T-01"))
            .await
            .unwrap();
        hw.process_card_payment(250_000, TransactionType::Refund)
            .await
            .unwrap();

        let body = mock.last_body("/api/hardware/payment/process").unwrap();
        assert_eq!(body["amount"], 250_000);
        assert_eq!(body["transactionType"], "refund");
        assert!(body["timestamp"].as_str().is_some());

        let err = hw
            .process_card_payment(0, TransactionType::Sale)
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_print_and_display_bodies() {
        let (hw, mock) = client();
        hw.connect_thermal_printer(&PrinterConfig::new("COM1")).await.unwrap();
        hw.connect_customer_display(&CustomerDisplayConfig::new("COM4"))
            .await
            .unwrap();

        hw.print_receipt(&PrintJob::receipt("HD-0001")).await.unwrap();
        hw.update_customer_display("Tong: 150.000d").await.unwrap();

        assert_eq!(
            mock.last_body("/api/hardware/printer/print").unwrap(),
            json!({ "type": "receipt", "content": "HD-0001" })
        );
        assert_eq!(
            mock.last_body("/api/hardware/display/update").unwrap(),
            json!({ "text": "Tong: 150.000d" })
        );
    }

    #[tokio::test]
    async fn test_device_status_degrades_to_empty() {
        let (hw, mock) = client();
        mock.fail(STATUS_PATH, || IntegrationError::Network("Cannot reach bridge".into()));
        assert!(hw.get_device_status().await.is_empty());
    }

    #[tokio::test]
    async fn test_device_status_parses_known_devices() {
        let (hw, mock) = client();
        mock.respond(
            STATUS_PATH,
            json!({ "data": {
                "thermal_printer": { "connected": true, "lastActivity": "2026-10-01T08:00:00Z", "port": "COM1" },
                "scale": { "connected": false, "lastActivity": null, "port": null, "errors": 2 },
                "label_printer": { "connected": true }
            }}),
        );
        let snapshot = hw.get_device_status().await;
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot[&DeviceKind::ThermalPrinter].connected);
        assert_eq!(snapshot[&DeviceKind::ThermalPrinter].port.as_deref(), Some("COM1"));
        assert_eq!(snapshot[&DeviceKind::Scale].errors, Some(2));
    }

    #[tokio::test]
    async fn test_device_status_keeps_devices_with_odd_metadata() {
        let (hw, mock) = client();
        mock.respond(
            STATUS_PATH,
            json!({ "data": {
                "thermal_printer": { "connected": true, "lastActivity": 1760000000000u64, "port": "COM1" },
                "scale": { "connected": true, "port": "COM3", "errors": ["Overload"] },
                "customer_display": "offline"
            }}),
        );
        let snapshot = hw.get_device_status().await;
        assert_eq!(
            snapshot.keys().copied().collect::<Vec<_>>(),
            vec![DeviceKind::ThermalPrinter, DeviceKind::Scale]
        );

        let printer = &snapshot[&DeviceKind::ThermalPrinter];
        assert!(printer.connected);
        assert_eq!(printer.port.as_deref(), Some("COM1"));
        assert_eq!(printer.last_activity, None);
        assert_eq!(printer.extra["lastActivity"], json!(1760000000000u64));

        let scale = &snapshot[&DeviceKind::Scale];
        assert!(scale.connected);
        assert_eq!(scale.errors, None);
        assert_eq!(scale.extra["errors"], json!(["Overload"]));
    }

    #[tokio::test]
    async fn test_concurrent_connect_same_device_is_rejected() {
        let mock = Arc::new(MockTransport::new());
        let hw = Arc::new(HardwareClient::new(
            mock.clone(),
            &BridgeConfig::default(),
            KeyboardFeed::new(),
        ));
        let gate = mock.gate("/api/hardware/scale/connect");

        let first = {
            let hw = hw.clone();
            tokio::spawn(async move { hw.connect_scale(&ScaleConfig::new("COM1")).await })
        };
        while mock.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        let err = hw.connect_scale(&ScaleConfig::new("COM2")).await.unwrap_err();
        assert!(matches!(err, IntegrationError::Busy(_)));
        // Different device is not blocked.
        assert!(hw.connect_cash_drawer(&CashDrawerConfig::new("USB")).await.is_ok());

        gate.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(hw.connection(DeviceKind::Scale).unwrap().port(), Some("COM1"));
    }

    #[tokio::test]
    async fn test_scanner_emits_barcode_after_connect() {
        let (hw, _mock) = client();
        let mut scans = hw
            .connect_barcode_scanner(&ScannerConfig::new("USB"))
            .await
            .unwrap();

        for key in ["1", "2", "3", "Enter"] {
            hw.keyboard().press(key);
        }
        assert_eq!(scans.next().await.unwrap().barcode, "123");

        // Lone Enter: buffer was reset, nothing is emitted for it.
        hw.keyboard().press("Enter");
        hw.keyboard().type_barcode("4");
        assert_eq!(scans.next().await.unwrap().barcode, "4");
    }

    #[tokio::test]
    async fn test_scanner_disconnect_releases_listener() {
        let (hw, _mock) = client();
        let mut scans = hw
            .connect_barcode_scanner(&ScannerConfig::new("USB"))
            .await
            .unwrap();
        assert_eq!(hw.keyboard().listener_count(), 1);

        hw.disconnect_device(DeviceKind::BarcodeScanner).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(1), scans.next())
            .await
            .unwrap();
        assert!(next.is_none());
        assert!(hw.subscribe_scans().is_none());
    }

    #[tokio::test]
    async fn test_scanner_reconnect_replaces_listener() {
        let (hw, _mock) = client();
        let mut first = hw
            .connect_barcode_scanner(&ScannerConfig::new("USB"))
            .await
            .unwrap();
        let mut second = hw
            .connect_barcode_scanner(&ScannerConfig::new("USB"))
            .await
            .unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(1), first.next())
            .await
            .unwrap();
        assert!(closed.is_none());

        hw.keyboard().type_barcode("8931234567890");
        assert_eq!(second.next().await.unwrap().barcode, "8931234567890");
    }

    #[tokio::test]
    async fn test_disconnect_all_reports_per_device() {
        let (hw, mock) = client();
        hw.connect_scale(&ScaleConfig::new("COM3")).await.unwrap();
        hw.connect_cash_drawer(&CashDrawerConfig::new("USB")).await.unwrap();
        mock.fail("/api/hardware/scale/disconnect", || {
            IntegrationError::Network("Cannot reach bridge".into())
        });

        let outcomes = hw.disconnect_all().await;
        assert_eq!(outcomes.len(), 2);
        let drawer = outcomes
            .iter()
            .find(|o| o.target == Some(DeviceKind::CashDrawer))
            .unwrap();
        assert!(drawer.success);
        let scale = outcomes
            .iter()
            .find(|o| o.target == Some(DeviceKind::Scale))
            .unwrap();
        assert!(!scale.success);
        assert_eq!(hw.connected_devices(), vec![DeviceKind::Scale]);
    }

    #[tokio::test]
    async fn test_device_self_test_requires_connection() {
        let (hw, mock) = client();
        assert!(hw.test_device(DeviceKind::ThermalPrinter).await.is_err());
        hw.connect_thermal_printer(&PrinterConfig::new("COM1")).await.unwrap();
        hw.test_device(DeviceKind::ThermalPrinter).await.unwrap();
        assert_eq!(mock.calls_to("/api/hardware/printer/test").len(), 1);
    }
}
