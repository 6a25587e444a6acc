//! Keyboard-wedge barcode scanner bridge.
//!
//! USB-HID scanners type the barcode as keystrokes followed by Enter. The
//! host pushes every key event into a `KeyboardFeed`; while a scanner is
//! connected, a `ScannerListener` task turns those keystrokes into discrete
//! `BarcodeScan` events.
//!
//! Buffer states:
//! - idle: buffer empty
//! - accumulating: one or more characters buffered
//! - Enter emits the buffer (if non-empty) and returns to idle
//!
//! Multi-character key names other than Enter (Shift, Tab, ArrowUp, ...) are
//! ignored. There is no debounce, minimum length or stall timeout.
//!
//! The listener is owned by the hardware client and dropped on disconnect or
//! reconnect. Dropping it cancels the task, which closes every
//! `ScanSubscription` handed out for that connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Queue depth for both the keyboard feed and scan notifications.
const CHANNEL_CAPACITY: usize = 256;

const ENTER: &str = "Enter";

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One keypress, named the way browsers name `KeyboardEvent.key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn enter() -> Self {
        Self::new(ENTER)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarcodeScan {
    pub barcode: String,
    pub scanned_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Host keyboard stream
// ---------------------------------------------------------------------------

/// Host-wide key event stream. Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct KeyboardFeed {
    tx: broadcast::Sender<KeyEvent>,
}

impl KeyboardFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Push one key event. Returns how many listeners received it.
    pub fn press(&self, key: impl Into<String>) -> usize {
        self.tx.send(KeyEvent::new(key)).unwrap_or(0)
    }

    /// Type a whole string followed by Enter, the way a wedge scanner does.
    pub fn type_barcode(&self, barcode: &str) {
        for ch in barcode.chars() {
            self.press(ch.to_string());
        }
        self.press(ENTER);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeyEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for KeyboardFeed {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Buffer state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScanBuffer {
    buf: String,
}

impl ScanBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one key. Returns the finished barcode on Enter.
    pub fn push(&mut self, event: &KeyEvent) -> Option<String> {
        if event.key == ENTER {
            if self.buf.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.buf));
        }

        let mut chars = event.key.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            self.buf.push(ch);
        }
        None
    }

    pub fn is_idle(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn pending(&self) -> &str {
        &self.buf
    }
}

// ---------------------------------------------------------------------------
// Listener + subscriptions
// ---------------------------------------------------------------------------

/// Running keystroke-to-barcode task for one scanner connection.
pub struct ScannerListener {
    scans: broadcast::Sender<BarcodeScan>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ScannerListener {
    /// Subscribes to `feed` before returning, so no key pressed after this
    /// call is missed.
    pub fn spawn(feed: &KeyboardFeed) -> Self {
        let keys = feed.subscribe();
        let (scans, _) = broadcast::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_listener(keys, scans.clone(), cancel.clone()));
        info!("barcode scanner listener started");
        Self {
            scans,
            cancel,
            task,
        }
    }

    pub fn subscribe(&self) -> ScanSubscription {
        ScanSubscription {
            rx: self.scans.subscribe(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ScannerListener {
    fn drop(&mut self) {
        self.cancel.cancel();
        info!("barcode scanner listener released");
    }
}

async fn run_listener(
    mut keys: broadcast::Receiver<KeyEvent>,
    scans: broadcast::Sender<BarcodeScan>,
    cancel: CancellationToken,
) {
    let mut buffer = ScanBuffer::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = keys.recv() => match received {
                Ok(event) => {
                    if let Some(barcode) = buffer.push(&event) {
                        debug!(barcode = %barcode, "barcode scanned");
                        // No subscribers is fine; the scan is simply dropped.
                        let _ = scans.send(BarcodeScan {
                            barcode,
                            scanned_at: Utc::now(),
                        });
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "scanner listener lagged, discarding partial scan");
                    buffer = ScanBuffer::new();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    // `scans` drops here, which closes every subscription.
}

/// Receives scans for one scanner connection.
pub struct ScanSubscription {
    rx: broadcast::Receiver<BarcodeScan>,
}

impl ScanSubscription {
    /// Next scan, or `None` once the scanner was disconnected.
    pub async fn next(&mut self) -> Option<BarcodeScan> {
        loop {
            match self.rx.recv().await {
                Ok(scan) => return Some(scan),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "scan subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
