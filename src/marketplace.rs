//! Marketplace and social-shop integrations through the marketplace bridge.
//!
//! Covers Shopee, Lazada, Tiki, Sendo, Facebook Shop and Instagram Shop.
//! Unlike the hardware client there is no local registry: whether a platform
//! is connected is whatever `/api/integrations/status` says. Connect and
//! disconnect still go through a per-platform single-flight guard.
//!
//! Bulk sync calls return one outcome per platform when the bridge reports
//! them, so a caller can tell "some failed" from "all failed".

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::api::{
    check_envelope, envelope_message, take_field, Ack, Bridge, BridgeRequest, HttpTransport,
    TargetOutcome, Transport,
};
use crate::config::BridgeConfig;
use crate::error::{IntegrationError, IntegrationResult};
use crate::registry::SingleFlight;
use crate::storage::TokenSource;

const STATUS_PATH: &str = "/api/integrations/status";

// ---------------------------------------------------------------------------
// Platforms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    Shopee,
    Lazada,
    Tiki,
    Sendo,
    Facebook,
    Instagram,
}

impl PlatformId {
    pub const ALL: [PlatformId; 6] = [
        PlatformId::Shopee,
        PlatformId::Lazada,
        PlatformId::Tiki,
        PlatformId::Sendo,
        PlatformId::Facebook,
        PlatformId::Instagram,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformId::Shopee => "shopee",
            PlatformId::Lazada => "lazada",
            PlatformId::Tiki => "tiki",
            PlatformId::Sendo => "sendo",
            PlatformId::Facebook => "facebook",
            PlatformId::Instagram => "instagram",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PlatformId::Shopee => "Shopee",
            PlatformId::Lazada => "Lazada",
            PlatformId::Tiki => "Tiki",
            PlatformId::Sendo => "Sendo",
            PlatformId::Facebook => "Facebook Shop",
            PlatformId::Instagram => "Instagram Shop",
        }
    }

    /// Social shops sell from a product catalog rather than a seller center.
    pub fn is_social(self) -> bool {
        matches!(self, PlatformId::Facebook | PlatformId::Instagram)
    }

    pub fn parse(raw: &str) -> Option<PlatformId> {
        let raw = raw.trim().to_ascii_lowercase();
        PlatformId::ALL.into_iter().find(|p| p.as_str() == raw)
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

fn require(field: &str, value: &str) -> IntegrationResult<()> {
    if value.trim().is_empty() {
        Err(IntegrationError::missing_field(field))
    } else {
        Ok(())
    }
}

/// Implemented by every per-platform credential bundle.
pub trait PlatformCredentials: Serialize {
    const PLATFORM: PlatformId;

    fn validate(&self) -> IntegrationResult<()>;
}

/// Shopee Open Platform partner credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopeeCredentials {
    pub partner_id: String,
    pub partner_key: String,
    pub shop_id: String,
    pub access_token: String,
}

impl PlatformCredentials for ShopeeCredentials {
    const PLATFORM: PlatformId = PlatformId::Shopee;

    fn validate(&self) -> IntegrationResult<()> {
        require("partner_id", &self.partner_id)?;
        require("partner_key", &self.partner_key)?;
        require("shop_id", &self.shop_id)?;
        require("access_token", &self.access_token)
    }
}

/// Lazada Open Platform app credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LazadaCredentials {
    pub app_key: String,
    pub app_secret: String,
    pub seller_id: String,
    pub access_token: String,
}

impl PlatformCredentials for LazadaCredentials {
    const PLATFORM: PlatformId = PlatformId::Lazada;

    fn validate(&self) -> IntegrationResult<()> {
        require("app_key", &self.app_key)?;
        require("app_secret", &self.app_secret)?;
        require("seller_id", &self.seller_id)?;
        require("access_token", &self.access_token)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TikiCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub store_id: String,
    pub access_token: String,
}

impl PlatformCredentials for TikiCredentials {
    const PLATFORM: PlatformId = PlatformId::Tiki;

    fn validate(&self) -> IntegrationResult<()> {
        require("client_id", &self.client_id)?;
        require("client_secret", &self.client_secret)?;
        require("store_id", &self.store_id)?;
        require("access_token", &self.access_token)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendoCredentials {
    pub shop_key: String,
    pub secret_key: String,
    pub shop_id: String,
    pub access_token: String,
}

impl PlatformCredentials for SendoCredentials {
    const PLATFORM: PlatformId = PlatformId::Sendo;

    fn validate(&self) -> IntegrationResult<()> {
        require("shop_key", &self.shop_key)?;
        require("secret_key", &self.secret_key)?;
        require("shop_id", &self.shop_id)?;
        require("access_token", &self.access_token)
    }
}

/// Facebook Shop: page + commerce catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookCredentials {
    pub app_id: String,
    pub app_secret: String,
    pub page_id: String,
    pub access_token: String,
    pub catalog_id: String,
}

impl PlatformCredentials for FacebookCredentials {
    const PLATFORM: PlatformId = PlatformId::Facebook;

    fn validate(&self) -> IntegrationResult<()> {
        require("app_id", &self.app_id)?;
        require("app_secret", &self.app_secret)?;
        require("page_id", &self.page_id)?;
        require("access_token", &self.access_token)?;
        require("catalog_id", &self.catalog_id)
    }
}

/// Instagram Shop: business account + the catalog it sells from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstagramCredentials {
    pub app_id: String,
    pub app_secret: String,
    pub business_account_id: String,
    pub access_token: String,
    pub catalog_id: String,
}

impl PlatformCredentials for InstagramCredentials {
    const PLATFORM: PlatformId = PlatformId::Instagram;

    fn validate(&self) -> IntegrationResult<()> {
        require("app_id", &self.app_id)?;
        require("app_secret", &self.app_secret)?;
        require("business_account_id", &self.business_account_id)?;
        require("access_token", &self.access_token)?;
        require("catalog_id", &self.catalog_id)
    }
}

// ---------------------------------------------------------------------------
// Status + sync results
// ---------------------------------------------------------------------------

/// Server-reported state of one platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub sync_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlatformStatus {
    /// Lenient counterpart of the derived reader: a record is kept as long
    /// as it is an object, odd-shaped fields land in `extra`.
    pub fn from_bridge(raw: &Value) -> Option<Self> {
        let record = raw.as_object()?;
        if let Ok(status) = serde_json::from_value::<Self>(raw.clone()) {
            return Some(status);
        }

        let mut extra = record.clone();
        Some(Self {
            connected: take_field(&mut extra, "connected").unwrap_or(false),
            last_sync: take_field(&mut extra, "lastSync"),
            sync_count: take_field(&mut extra, "syncCount"),
            extra,
        })
    }
}

pub type IntegrationStatusSnapshot = BTreeMap<PlatformId, PlatformStatus>;

/// Result of a bulk sync across the connected platforms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub results: Vec<TargetOutcome<PlatformId>>,
    /// Total items synced, when the bridge reports it.
    pub count: Option<u64>,
}

impl SyncReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetOutcome<PlatformId>> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Use per-platform `results` when present; otherwise fold the envelope
    /// into a single aggregate outcome.
    ///
    /// A top-level `success: false` that no per-platform failure explains
    /// is kept as an extra failed outcome with no target.
    fn from_body(body: &Value) -> IntegrationResult<Self> {
        let count = body.get("count").and_then(Value::as_u64);

        if let Some(raw) = body.get("results").and_then(Value::as_array) {
            let mut results: Vec<TargetOutcome<PlatformId>> =
                raw.iter().map(parse_sync_entry).collect();

            let rejected = body.get("success").and_then(Value::as_bool) == Some(false);
            if rejected && results.iter().all(|r| r.success) {
                let message = envelope_message(body)
                    .unwrap_or_else(|| "Sync was rejected by the bridge".to_string());
                results.push(TargetOutcome::failed(None, message));
            }
            return Ok(Self { results, count });
        }

        check_envelope(body)?;
        let mut outcome = TargetOutcome::ok(None, envelope_message(body));
        outcome.count = count;
        Ok(Self {
            results: vec![outcome],
            count,
        })
    }

    /// Single-platform sync: an aggregate outcome belongs to that platform.
    fn attribute_to(mut self, platform: PlatformId) -> Self {
        for outcome in &mut self.results {
            outcome.target.get_or_insert(platform);
        }
        self
    }
}

/// A result entry the bridge sent but we cannot read still counts as a
/// failure, attributed to its platform when that much is recognisable.
fn parse_sync_entry(entry: &Value) -> TargetOutcome<PlatformId> {
    match serde_json::from_value::<TargetOutcome<PlatformId>>(entry.clone()) {
        Ok(outcome) => outcome,
        Err(e) => {
            let raw_target = entry
                .get("platform")
                .or_else(|| entry.get("target"))
                .and_then(Value::as_str);
            debug!(platform = ?raw_target, error = %e, "malformed sync result");
            let target = raw_target.and_then(PlatformId::parse);
            let message = match (raw_target, target) {
                (Some(name), None) => format!("Unrecognised sync result for platform '{name}'"),
                _ => format!("Unreadable sync result: {e}"),
            };
            TargetOutcome::failed(target, message)
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct MarketplaceClient {
    bridge: Bridge,
    flights: SingleFlight<PlatformId>,
}

impl MarketplaceClient {
    pub fn new(transport: Arc<dyn Transport>, config: &BridgeConfig) -> Self {
        Self {
            bridge: Bridge::new(transport, config.request_timeout),
            flights: SingleFlight::new(),
        }
    }

    pub fn connect_http(
        config: BridgeConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> IntegrationResult<Self> {
        let transport = HttpTransport::new(config.clone(), tokens)?;
        Ok(Self::new(Arc::new(transport), &config))
    }

    // -- connect ------------------------------------------------------------

    pub async fn connect_shopee(&self, credentials: &ShopeeCredentials) -> IntegrationResult<Ack> {
        self.connect(credentials).await
    }

    pub async fn connect_lazada(&self, credentials: &LazadaCredentials) -> IntegrationResult<Ack> {
        self.connect(credentials).await
    }

    pub async fn connect_tiki(&self, credentials: &TikiCredentials) -> IntegrationResult<Ack> {
        self.connect(credentials).await
    }

    pub async fn connect_sendo(&self, credentials: &SendoCredentials) -> IntegrationResult<Ack> {
        self.connect(credentials).await
    }

    pub async fn connect_facebook_shop(
        &self,
        credentials: &FacebookCredentials,
    ) -> IntegrationResult<Ack> {
        self.connect(credentials).await
    }

    pub async fn connect_instagram_shop(
        &self,
        credentials: &InstagramCredentials,
    ) -> IntegrationResult<Ack> {
        self.connect(credentials).await
    }

    async fn connect<C: PlatformCredentials>(&self, credentials: &C) -> IntegrationResult<Ack> {
        let platform = C::PLATFORM;
        credentials.validate()?;
        let _flight = self.flights.begin(platform)?;

        let request = BridgeRequest::post(format!("/api/integrations/{platform}/connect"))
            .with_json(credentials)?;
        let reply = self.bridge.call(request).await.map_err(|e| {
            warn!(platform = %platform, error = %e, "platform connect failed");
            e
        })?;
        info!(platform = %platform, "platform connected");
        Ok(Ack::from_body(&reply))
    }

    pub async fn disconnect_platform(&self, platform: PlatformId) -> IntegrationResult<Ack> {
        let _flight = self.flights.begin(platform)?;
        let reply = self
            .bridge
            .call(BridgeRequest::post(format!(
                "/api/integrations/{platform}/disconnect"
            )))
            .await?;
        info!(platform = %platform, "platform disconnected");
        Ok(Ack::from_body(&reply))
    }

    /// Ask the bridge to verify the stored credentials still work.
    pub async fn test_connection(&self, platform: PlatformId) -> IntegrationResult<Ack> {
        let reply = self
            .bridge
            .call(BridgeRequest::post(format!("/api/integrations/{platform}/test")))
            .await?;
        Ok(Ack::from_body(&reply))
    }

    // -- bulk sync ----------------------------------------------------------

    pub async fn sync_all_products(&self) -> IntegrationResult<SyncReport> {
        self.sync(BridgeRequest::post("/api/integrations/sync-all-products"))
            .await
    }

    pub async fn sync_all_orders(&self) -> IntegrationResult<SyncReport> {
        self.sync(BridgeRequest::post("/api/integrations/sync-all-orders"))
            .await
    }

    /// Push a product's on-hand quantity to every connected marketplace.
    pub async fn sync_inventory_to_marketplaces(
        &self,
        product_id: &str,
        quantity: i64,
    ) -> IntegrationResult<SyncReport> {
        require("product_id", product_id)?;
        if quantity < 0 {
            return Err(IntegrationError::InvalidRequest(format!(
                "quantity cannot be negative, got {quantity}"
            )));
        }
        let request = BridgeRequest::post("/api/integrations/sync-inventory")
            .with_json(&json!({ "product_id": product_id, "quantity": quantity }))?;
        self.sync(request).await
    }

    /// Push a product's selling price (VND) to every connected marketplace.
    pub async fn sync_prices_to_marketplaces(
        &self,
        product_id: &str,
        price: i64,
    ) -> IntegrationResult<SyncReport> {
        require("product_id", product_id)?;
        if price <= 0 {
            return Err(IntegrationError::InvalidRequest(format!(
                "price must be positive, got {price}"
            )));
        }
        let request = BridgeRequest::post("/api/integrations/sync-prices")
            .with_json(&json!({ "product_id": product_id, "price": price }))?;
        self.sync(request).await
    }

    pub async fn sync_platform_products(&self, platform: PlatformId) -> IntegrationResult<SyncReport> {
        self.sync(BridgeRequest::post(format!(
            "/api/integrations/{platform}/sync-products"
        )))
        .await
        .map(|report| report.attribute_to(platform))
    }

    pub async fn sync_platform_orders(&self, platform: PlatformId) -> IntegrationResult<SyncReport> {
        self.sync(BridgeRequest::post(format!(
            "/api/integrations/{platform}/sync-orders"
        )))
        .await
        .map(|report| report.attribute_to(platform))
    }

    async fn sync(&self, request: BridgeRequest) -> IntegrationResult<SyncReport> {
        let path = request.path.clone();
        let body = self.bridge.call_raw(request).await.map_err(|e| {
            warn!(path = %path, error = %e, "sync request failed");
            e
        })?;
        let report = SyncReport::from_body(&body)?;
        let failed = report.failures().count();
        if failed > 0 {
            warn!(path = %path, failed, total = report.results.len(), "sync partially failed");
        } else {
            info!(path = %path, count = ?report.count, "sync completed");
        }
        Ok(report)
    }

    // -- queries ------------------------------------------------------------

    /// Server-reported status of every platform; empty on any failure.
    pub async fn get_integration_status(&self) -> IntegrationStatusSnapshot {
        match self.bridge.call(BridgeRequest::get(STATUS_PATH)).await {
            Ok(body) => parse_status_snapshot(&body),
            Err(e) => {
                warn!(error = %e, "integration status unavailable");
                IntegrationStatusSnapshot::new()
            }
        }
    }

    pub async fn connected_platforms(&self) -> Vec<PlatformId> {
        self.get_integration_status()
            .await
            .into_iter()
            .filter(|(_, status)| status.connected)
            .map(|(platform, _)| platform)
            .collect()
    }

    pub fn cancel_pending(&self) {
        self.bridge.cancel_pending();
    }
}

fn parse_status_snapshot(body: &Value) -> IntegrationStatusSnapshot {
    let Some(data) = body.get("data").and_then(Value::as_object) else {
        warn!("integration status response has no data object");
        return IntegrationStatusSnapshot::new();
    };

    data.iter()
        .filter_map(|(id, raw)| {
            let platform = PlatformId::parse(id)?;
            let status = PlatformStatus::from_bridge(raw).or_else(|| {
                debug!(platform = %id, "ignoring non-object platform status");
                None
            })?;
            Some((platform, status))
        })
        .collect()
}
