//! Bluetooth LE transport
//!
//! The board exposes a UART-like GATT service: the host writes commands to
//! one characteristic and receives frames as notifications on another.
//! Notifications are concatenated into the same byte stream the serial
//! transport produces. The board ignores commands until it has received
//! the device key followed by a reset.
//!
//! Native Bluetooth stacks plug in through `BleBackend`; the default backend
//! uses btleplug.

use crate::protocol::{command, hex_preview};
use crate::transport::{
    EVENT_CHANNEL_CAPACITY, StateCell, Transport, TransportConfig, TransportEvent, TransportKind,
};
use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use eboard_core::{BoardCapabilities, ConnectionState, LinkError, Result};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::{Uuid, uuid};

/// UART service
pub const UART_SERVICE_UUID: Uuid = uuid!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");

/// Host → board (write)
pub const UART_RX_CHAR_UUID: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");

/// Board → host (notify)
pub const UART_TX_CHAR_UUID: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");

/// Unlock sequence the board expects before it accepts commands
pub const DEVICE_KEY: [u8; 7] = [0x63, 0x07, 0xBE, 0xF5, 0xAE, 0x3A, 0xF5];

const SCAN_POLL: Duration = Duration::from_millis(500);

/// A native Bluetooth bridge exposing the board's UART service
#[async_trait]
pub trait BleBackend: Send {
    /// Find a board whose name starts with `name_prefix`, connect and
    /// subscribe to notifications.
    async fn connect(
        &mut self,
        name_prefix: &str,
        scan_timeout: Duration,
    ) -> Result<mpsc::Receiver<Vec<u8>>>;

    /// Write to the host → board characteristic
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Drop the connection and notification subscription
    async fn disconnect(&mut self);
}

fn ble_error(e: btleplug::Error) -> LinkError {
    LinkError::Io(format!("Bluetooth: {}", e))
}

/// btleplug central backend
#[derive(Default)]
pub struct BtleplugBackend {
    peripheral: Option<Peripheral>,
    write_char: Option<Characteristic>,
    notify_task: Option<JoinHandle<()>>,
}

impl BtleplugBackend {
    pub fn new() -> Self {
        Self::default()
    }

    async fn adapter() -> Result<Adapter> {
        let manager = Manager::new()
            .await
            .map_err(|e| LinkError::TransportUnavailable(format!("Bluetooth: {}", e)))?;
        manager
            .adapters()
            .await
            .map_err(|e| LinkError::TransportUnavailable(format!("Bluetooth: {}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| LinkError::TransportUnavailable("no Bluetooth adapter".into()))
    }

    async fn find_board(
        adapter: &Adapter,
        name_prefix: &str,
        scan_timeout: Duration,
    ) -> Result<Peripheral> {
        adapter
            .start_scan(ScanFilter {
                services: vec![UART_SERVICE_UUID],
            })
            .await
            .map_err(ble_error)?;

        let found = scan_until(scan_timeout, SCAN_POLL, || Self::scan_once(adapter, name_prefix)).await;
        // Scanning stops on every path, including a failed peripheral listing
        let _ = adapter.stop_scan().await;
        found?.ok_or(LinkError::DeviceNotSelected)
    }

    /// One pass over the peripherals seen so far
    async fn scan_once(adapter: &Adapter, name_prefix: &str) -> Result<Option<Peripheral>> {
        for peripheral in adapter.peripherals().await.map_err(ble_error)? {
            let name = peripheral
                .properties()
                .await
                .ok()
                .flatten()
                .and_then(|p| p.local_name);
            if name.as_deref().is_some_and(|n| n.starts_with(name_prefix)) {
                info!("Found board {:?}", name);
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }
}

/// Repeat `scan` every `interval` until it finds a board or fails, giving
/// up after `timeout` with `Ok(None)`.
async fn scan_until<T, F, Fut>(timeout: Duration, interval: Duration, mut scan: F) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match scan().await {
            Ok(None) if Instant::now() < deadline => tokio::time::sleep(interval).await,
            outcome => return outcome,
        }
    }
}

#[async_trait]
impl BleBackend for BtleplugBackend {
    async fn connect(
        &mut self,
        name_prefix: &str,
        scan_timeout: Duration,
    ) -> Result<mpsc::Receiver<Vec<u8>>> {
        let adapter = Self::adapter().await?;
        let peripheral = Self::find_board(&adapter, name_prefix, scan_timeout).await?;

        peripheral.connect().await.map_err(ble_error)?;
        // From here on the peripheral is stored so disconnect() can release it
        self.peripheral = Some(peripheral.clone());

        peripheral.discover_services().await.map_err(ble_error)?;
        let chars = peripheral.characteristics();
        let write_char = chars.iter().find(|c| c.uuid == UART_RX_CHAR_UUID).cloned();
        let notify_char = chars.iter().find(|c| c.uuid == UART_TX_CHAR_UUID).cloned();
        let (Some(write_char), Some(notify_char)) = (write_char, notify_char) else {
            return Err(LinkError::Protocol(
                "board does not expose the UART service".into(),
            ));
        };

        peripheral.subscribe(&notify_char).await.map_err(ble_error)?;
        let mut notifications = peripheral.notifications().await.map_err(ble_error)?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.notify_task = Some(tokio::spawn(async move {
            while let Some(n) = notifications.next().await {
                if n.uuid != UART_TX_CHAR_UUID {
                    continue;
                }
                if tx.send(n.value).await.is_err() {
                    break;
                }
            }
            debug!("BLE notification stream ended");
        }));
        self.write_char = Some(write_char);
        Ok(rx)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let (Some(peripheral), Some(ch)) = (&self.peripheral, &self.write_char) else {
            return Err(LinkError::NotConnected);
        };
        peripheral
            .write(ch, data, WriteType::WithoutResponse)
            .await
            .map_err(ble_error)
    }

    async fn disconnect(&mut self) {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        self.write_char = None;
        if let Some(peripheral) = self.peripheral.take() {
            if let Err(e) = peripheral.disconnect().await {
                warn!("BLE disconnect failed: {}", e);
            }
        }
    }
}

/// Bluetooth LE connection to a board
pub struct BleTransport {
    backend: Box<dyn BleBackend>,
    name_prefix: String,
    scan_timeout: Duration,
    handshake_timeout: Duration,
    capabilities: BoardCapabilities,
    state: StateCell,
    forwarder: Option<JoinHandle<()>>,
    open: bool,
}

impl BleTransport {
    /// BLE transport using the btleplug backend
    pub fn new(config: &TransportConfig) -> Self {
        Self::with_backend(Box::new(BtleplugBackend::new()), config)
    }

    /// BLE transport over another native bridge
    pub fn with_backend(backend: Box<dyn BleBackend>, config: &TransportConfig) -> Self {
        Self {
            backend,
            name_prefix: config.ble_name_prefix.clone(),
            scan_timeout: Duration::from_millis(config.ble_scan_ms),
            handshake_timeout: config.handshake_timeout(TransportKind::Ble),
            capabilities: config.capabilities_for(TransportKind::Ble),
            state: StateCell::new("ble"),
            forwarder: None,
            open: false,
        }
    }

    /// Unlock, reset and ask for the board; wait for the first notification
    async fn authenticate(&mut self, notifications: &mut mpsc::Receiver<Vec<u8>>) -> Result<Vec<u8>> {
        self.state.set(ConnectionState::Authenticating);
        let sequence: [&[u8]; 4] = [
            &DEVICE_KEY,
            &[command::RESET],
            &[command::ENABLE_UPDATES],
            &[command::REQUEST_BOARD],
        ];
        for cmd in sequence {
            debug!("[Host→Board] {}", hex_preview(cmd));
            self.backend.write(cmd).await?;
        }

        match tokio::time::timeout(self.handshake_timeout, notifications.recv()).await {
            Ok(Some(first)) => Ok(first),
            Ok(None) => Err(LinkError::Io("BLE notifications closed during handshake".into())),
            Err(_) => Err(LinkError::ConnectionTimeout(self.handshake_timeout)),
        }
    }

    async fn release(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
        self.backend.disconnect().await;
        self.open = false;
        self.state.set(ConnectionState::Disconnected);
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    fn capabilities(&self) -> BoardCapabilities {
        self.capabilities
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        self.release().await;
        self.state.set(ConnectionState::Connecting);
        info!("Scanning for BLE board '{}'", self.name_prefix);

        let mut notifications = match self
            .backend
            .connect(&self.name_prefix, self.scan_timeout)
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                self.release().await;
                return Err(e);
            }
        };

        let first = match self.authenticate(&mut notifications).await {
            Ok(first) => first,
            Err(e) => {
                warn!("BLE handshake failed: {}", e);
                self.release().await;
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let _ = tx.send(TransportEvent::Data(first)).await;
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(packet) = notifications.recv().await {
                debug!("[Board→Host] {}", hex_preview(&packet));
                if tx.send(TransportEvent::Data(packet)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(TransportEvent::Closed(None)).await;
        }));
        self.open = true;
        self.state.set(ConnectionState::Connected);
        info!("BLE board connected");
        Ok(rx)
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(LinkError::NotConnected);
        }
        debug!("[Host→Board] {}", hex_preview(data));
        self.backend.write(data).await
    }

    async fn close(&mut self) {
        if self.open {
            info!("Closing BLE connection");
        }
        self.release().await;
    }
}
