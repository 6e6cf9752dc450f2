//! Wired serial transport
//!
//! The board streams frames at a fixed baud rate. The handshake asks for the
//! serial number and waits for any well-formed frame in reply.

use crate::protocol::{Framer, command, hex_preview};
use crate::transport::{
    EVENT_CHANNEL_CAPACITY, StateCell, Transport, TransportConfig, TransportEvent, TransportKind,
};
use async_trait::async_trait;
use eboard_core::{BoardCapabilities, ConnectionState, LinkError, Result};
use serial2_tokio::SerialPort;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 256;

/// Serial port connection to a board
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    handshake_timeout: Duration,
    capabilities: BoardCapabilities,
    state: StateCell,
    port: Option<Arc<SerialPort>>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            path: config.serial_port.clone(),
            baud_rate: config.baud_rate,
            handshake_timeout: config.handshake_timeout(TransportKind::Serial),
            capabilities: config.capabilities_for(TransportKind::Serial),
            state: StateCell::new("serial"),
            port: None,
            reader: None,
        }
    }

    /// Write every byte, looping over short writes
    async fn write_all(port: &SerialPort, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = port
                .write(data)
                .await
                .map_err(|e| LinkError::Io(format!("Serial write failed: {}", e)))?;
            if n == 0 {
                return Err(LinkError::Io("Serial write returned 0 bytes".into()));
            }
            data = &data[n..];
        }
        Ok(())
    }

    /// Request the serial number and read until a complete frame arrives.
    ///
    /// Returns every byte read so nothing is lost to the session.
    async fn handshake(port: &SerialPort) -> Result<Vec<u8>> {
        Self::write_all(port, &[command::REQUEST_SERIAL]).await?;

        let mut framer = Framer::new();
        let mut received = Vec::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = port
                .read(&mut buf)
                .await
                .map_err(|e| LinkError::Io(format!("Serial read failed: {}", e)))?;
            if n == 0 {
                return Err(LinkError::Io("Serial port closed during handshake".into()));
            }
            received.extend_from_slice(&buf[..n]);
            if framer.feed(&buf[..n]).into_iter().next().is_some() {
                return Ok(received);
            }
        }
    }

    fn release(&mut self) {
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }
        self.port = None;
        self.state.set(ConnectionState::Disconnected);
    }
}

/// Background task pushing raw chunks to the session
async fn read_loop(port: Arc<SerialPort>, tx: mpsc::Sender<TransportEvent>) {
    let mut buf = [0u8; READ_CHUNK];
    let reason = loop {
        match port.read(&mut buf).await {
            Ok(0) => break None,
            Ok(n) => {
                debug!("[Board→Host] {}", hex_preview(&buf[..n]));
                if tx.send(TransportEvent::Data(buf[..n].to_vec())).await.is_err() {
                    debug!("Serial event receiver dropped, reader exiting");
                    return;
                }
            }
            Err(e) => {
                warn!("Serial read failed: {}", e);
                break Some(e.to_string());
            }
        }
    };
    let _ = tx.send(TransportEvent::Closed(reason)).await;
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn capabilities(&self) -> BoardCapabilities {
        self.capabilities
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        self.release();
        self.state.set(ConnectionState::Connecting);
        info!("Opening serial port {} at {} baud", self.path, self.baud_rate);

        let port = match SerialPort::open(&self.path, self.baud_rate) {
            Ok(port) => Arc::new(port),
            Err(e) => {
                self.state.set(ConnectionState::Disconnected);
                return Err(match e.kind() {
                    ErrorKind::NotFound => LinkError::DeviceNotSelected,
                    ErrorKind::PermissionDenied | ErrorKind::Unsupported => {
                        LinkError::TransportUnavailable(format!("{}: {}", self.path, e))
                    }
                    _ => LinkError::Io(format!("Failed to open {}: {}", self.path, e)),
                });
            }
        };

        let initial = match tokio::time::timeout(self.handshake_timeout, Self::handshake(&port))
            .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                self.release();
                return Err(e);
            }
            Err(_) => {
                warn!("No handshake response from {} within {:?}", self.path, self.handshake_timeout);
                self.release();
                return Err(LinkError::ConnectionTimeout(self.handshake_timeout));
            }
        };

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let _ = tx.send(TransportEvent::Data(initial)).await;
        self.reader = Some(tokio::spawn(read_loop(port.clone(), tx)));
        self.port = Some(port);
        self.state.set(ConnectionState::Connected);
        info!("Serial board connected on {}", self.path);
        Ok(rx)
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_ref().ok_or(LinkError::NotConnected)?;
        debug!("[Host→Board] {}", hex_preview(data));
        Self::write_all(port, data).await
    }

    async fn close(&mut self) {
        if self.port.is_some() {
            info!("Closing serial port {}", self.path);
        }
        self.release();
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }
    }
}
