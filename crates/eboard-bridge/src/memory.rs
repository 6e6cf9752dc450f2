//! In-process transport for tests and replays
//!
//! `memory_pair` returns a transport and the `MemoryBoard` standing on the
//! other side of it. The board handle injects bytes or decoded messages and
//! records every command the host sent.

use crate::protocol::{BoardMessage, encode_frame, hex_preview};
use crate::transport::{
    EVENT_CHANNEL_CAPACITY, StateCell, Transport, TransportEvent, TransportKind,
};
use async_trait::async_trait;
use eboard_core::{BoardCapabilities, ConnectionState, LinkError, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::debug;

#[derive(Default)]
struct Shared {
    events: Option<mpsc::Sender<TransportEvent>>,
    sent: Vec<Vec<u8>>,
    open_error: Option<LinkError>,
    opens: usize,
}

fn lock(shared: &Mutex<Shared>) -> std::sync::MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transport half of a memory pair
pub struct MemoryTransport {
    kind: TransportKind,
    capabilities: BoardCapabilities,
    state: StateCell,
    shared: Arc<Mutex<Shared>>,
}

/// Board half of a memory pair
#[derive(Clone)]
pub struct MemoryBoard {
    shared: Arc<Mutex<Shared>>,
}

/// Create a connected transport/board pair
pub fn memory_pair(kind: TransportKind, capabilities: BoardCapabilities) -> (MemoryTransport, MemoryBoard) {
    let shared = Arc::new(Mutex::new(Shared::default()));
    let transport = MemoryTransport {
        kind,
        capabilities,
        state: StateCell::new("memory"),
        shared: shared.clone(),
    };
    (transport, MemoryBoard { shared })
}

impl MemoryBoard {
    async fn push(&self, event: TransportEvent) -> bool {
        let tx = lock(&self.shared).events.clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Deliver raw bytes. Returns false when the transport is not open.
    pub async fn inject(&self, bytes: &[u8]) -> bool {
        self.push(TransportEvent::Data(bytes.to_vec())).await
    }

    /// Deliver one well-formed frame
    pub async fn inject_frame(&self, id: u8, payload: &[u8]) -> bool {
        self.inject(&encode_frame(id, payload)).await
    }

    /// Deliver an already-decoded message
    pub async fn inject_message(&self, msg: BoardMessage) -> bool {
        self.push(TransportEvent::Message(msg)).await
    }

    /// Simulate the board going away
    pub async fn hang_up(&self, reason: Option<&str>) {
        let tx = lock(&self.shared).events.take();
        if let Some(tx) = tx {
            let _ = tx.send(TransportEvent::Closed(reason.map(str::to_string))).await;
        }
    }

    /// Make the next `open` fail with `err`
    pub fn fail_next_open(&self, err: LinkError) {
        lock(&self.shared).open_error = Some(err);
    }

    /// Everything the host sent so far
    pub fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.shared).sent.clone()
    }

    /// Drain the send log
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut lock(&self.shared).sent)
    }

    /// Number of successful opens
    pub fn opens(&self) -> usize {
        lock(&self.shared).opens
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared).events.is_some()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn capabilities(&self) -> BoardCapabilities {
        self.capabilities
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        self.state.set(ConnectionState::Connecting);
        let mut shared = lock(&self.shared);
        if let Some(err) = shared.open_error.take() {
            shared.events = None;
            drop(shared);
            self.state.set(ConnectionState::Disconnected);
            return Err(err);
        }
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        shared.events = Some(tx);
        shared.opens += 1;
        drop(shared);
        self.state.set(ConnectionState::Connected);
        Ok(rx)
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.events.is_none() {
            return Err(LinkError::NotConnected);
        }
        debug!("[Host→Board] {}", hex_preview(data));
        shared.sent.push(data.to_vec());
        Ok(())
    }

    async fn close(&mut self) {
        lock(&self.shared).events = None;
        self.state.set(ConnectionState::Disconnected);
    }
}
