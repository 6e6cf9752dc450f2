//! Transport abstraction for board links
//!
//! Every transport turns a physical or network connection into the same
//! stream of `TransportEvent`s and accepts raw host command bytes.
//! Connection state is published on a watch channel owned by the transport.

use crate::protocol::BoardMessage;
use async_trait::async_trait;
use eboard_core::{BoardCapabilities, BoardKind, ConnectionState, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Capacity of the per-connection event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something that happened on an open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw bytes for the framer
    Data(Vec<u8>),
    /// Already-decoded message (network bridge, which has no byte framing)
    Message(BoardMessage),
    /// Connection went away, with the reason if it was an error
    Closed(Option<String>),
}

/// Which transport to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Serial,
    Ble,
    Socket,
}

impl TransportKind {
    /// Capabilities of the board usually found behind this transport
    pub fn default_capabilities(self) -> BoardCapabilities {
        match self {
            TransportKind::Serial => BoardCapabilities::new(BoardKind::PieceIdentifying, false),
            TransportKind::Ble => BoardCapabilities::new(BoardKind::OccupancyOnly, true),
            TransportKind::Socket => BoardCapabilities::new(BoardKind::PieceIdentifying, false),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Serial => "serial",
            TransportKind::Ble => "ble",
            TransportKind::Socket => "socket",
        })
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" | "usb" => Ok(TransportKind::Serial),
            "ble" | "bluetooth" => Ok(TransportKind::Ble),
            "socket" | "websocket" | "ws" => Ok(TransportKind::Socket),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

/// Trait for a board connection
#[async_trait]
pub trait Transport: Send {
    /// Kind of this transport
    fn kind(&self) -> TransportKind;

    /// What the board behind this transport can do
    fn capabilities(&self) -> BoardCapabilities;

    /// Observe connection state changes
    fn state(&self) -> watch::Receiver<ConnectionState>;

    /// Open the connection and complete any handshake.
    ///
    /// On error every partially acquired resource has been released.
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Send host command bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self);
}

/// Connection-state publisher shared by the transport implementations
#[derive(Debug)]
pub struct StateCell {
    label: &'static str,
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    pub fn new(label: &'static str) -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { label, tx }
    }

    pub fn set(&self, state: ConnectionState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            debug!("[{}] {:?} -> {:?}", self.label, previous, state);
        }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

/// Per-transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Serial device path
    pub serial_port: String,
    pub baud_rate: u32,
    pub serial_handshake_ms: u64,
    /// Advertised name prefix of the BLE board
    pub ble_name_prefix: String,
    pub ble_scan_ms: u64,
    pub ble_handshake_ms: u64,
    /// Vendor bridge endpoint
    pub websocket_url: String,
    pub websocket_handshake_ms: u64,
    /// Override the capabilities implied by the transport kind
    pub capabilities: Option<BoardCapabilities>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".into(),
            baud_rate: 9600,
            serial_handshake_ms: 5_000,
            ble_name_prefix: "DGT_PEGASUS".into(),
            ble_scan_ms: 10_000,
            ble_handshake_ms: 15_000,
            websocket_url: "ws://127.0.0.1:1982/api/v1.0".into(),
            websocket_handshake_ms: 10_000,
            capabilities: None,
        }
    }
}

impl TransportConfig {
    pub fn capabilities_for(&self, kind: TransportKind) -> BoardCapabilities {
        self.capabilities
            .unwrap_or_else(|| kind.default_capabilities())
    }

    pub fn handshake_timeout(&self, kind: TransportKind) -> Duration {
        Duration::from_millis(match kind {
            TransportKind::Serial => self.serial_handshake_ms,
            TransportKind::Ble => self.ble_handshake_ms,
            TransportKind::Socket => self.websocket_handshake_ms,
        })
    }
}

/// Build the transport for `kind`
pub fn build_transport(kind: TransportKind, config: &TransportConfig) -> Box<dyn Transport> {
    match kind {
        TransportKind::Serial => Box::new(crate::serial::SerialTransport::new(config)),
        TransportKind::Ble => Box::new(crate::ble::BleTransport::new(config)),
        TransportKind::Socket => Box::new(crate::socket::SocketTransport::new(config)),
    }
}
