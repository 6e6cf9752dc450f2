//! WebSocket transport to the vendor's local bridge service
//!
//! The service owns the physical board and speaks JSON. Handshake: list the
//! connected boards, subscribe to the first one's change feed, wait for the
//! subscription to be confirmed. Feed events carry full placements and are
//! forwarded as already-decoded board dumps.

use crate::network::{EboardInfo, NetworkCall, NetworkEvent, parse_event, snapshot_from_fen};
use crate::protocol::{BoardMessage, command};
use crate::transport::{
    EVENT_CHANNEL_CAPACITY, StateCell, Transport, TransportConfig, TransportEvent, TransportKind,
};
use async_trait::async_trait;
use eboard_core::{BoardCapabilities, ConnectionState, LinkError, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection to the bridge service
pub struct SocketTransport {
    url: String,
    handshake_timeout: Duration,
    capabilities: BoardCapabilities,
    state: StateCell,
    sink: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
    serial: Option<String>,
    next_id: u64,
}

impl SocketTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            url: config.websocket_url.clone(),
            handshake_timeout: config.handshake_timeout(TransportKind::Socket),
            capabilities: config.capabilities_for(TransportKind::Socket),
            state: StateCell::new("socket"),
            sink: None,
            reader: None,
            serial: None,
            next_id: 1,
        }
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn call(sink: &mut SplitSink<WsStream, Message>, call: &NetworkCall) -> Result<()> {
        let json = call.to_json()?;
        debug!("[Host→Bridge] {}", json);
        sink.send(Message::Text(json))
            .await
            .map_err(|e| LinkError::Io(format!("WebSocket send failed: {}", e)))
    }

    /// Pick a board and subscribe to it. Returns the serial and any boards
    /// already reported during the handshake.
    async fn handshake(
        &mut self,
        sink: &mut SplitSink<WsStream, Message>,
        stream: &mut SplitStream<WsStream>,
    ) -> Result<(String, Vec<BoardMessage>)> {
        let list_id = self.take_id();
        Self::call(sink, &NetworkCall::eboards(list_id)).await?;

        let mut serial: Option<String> = None;
        let mut subscribe_id = None;
        let mut pending = Vec::new();

        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => return Err(LinkError::Io(format!("WebSocket read failed: {}", e))),
            };
            debug!("[Bridge→Host] {}", text);
            match parse_event(&text) {
                Ok(NetworkEvent::Boards(boards)) if serial.is_none() => {
                    let Some(board) = pick_board(&boards) else {
                        return Err(LinkError::DeviceNotSelected);
                    };
                    info!("Bridge reports board {}", board.serial);
                    if let Some(msg) = board.board.as_deref().and_then(|fen| snapshot_from_fen(fen).ok()) {
                        pending.push(BoardMessage::BoardDump(msg));
                    }
                    let id = self.take_id();
                    Self::call(sink, &NetworkCall::subscribe(id, &board.serial)).await?;
                    serial = Some(board.serial.clone());
                    subscribe_id = Some(id);
                }
                Ok(NetworkEvent::CallResult { id }) if Some(id) == subscribe_id => {
                    if let Some(serial) = serial {
                        return Ok((serial, pending));
                    }
                }
                Ok(event) if serial.as_deref().is_none_or(|s| event.is_for(s)) => {
                    pending.extend(event.into_message())
                }
                Ok(_) => debug!("Ignoring event for another board during handshake"),
                Err(e) => debug!("Ignoring bridge message during handshake: {}", e),
            }
        }
        Err(LinkError::Io("Bridge closed the connection during handshake".into()))
    }

    async fn release(&mut self) {
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.close().await;
        }
        self.serial = None;
        self.state.set(ConnectionState::Disconnected);
    }
}

/// Prefer an active board, otherwise the first one listed
fn pick_board(boards: &[EboardInfo]) -> Option<&EboardInfo> {
    boards
        .iter()
        .find(|b| b.state.as_deref() == Some("ACTIVE"))
        .or_else(|| boards.first())
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    serial: String,
    tx: mpsc::Sender<TransportEvent>,
) {
    let reason = loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break None,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!("WebSocket read failed: {}", e);
                break Some(e.to_string());
            }
        };
        debug!("[Bridge→Host] {}", text);

        let msg = match parse_event(&text) {
            Ok(NetworkEvent::Boards(boards)) => boards
                .into_iter()
                .find(|b| b.serial == serial)
                .and_then(|b| b.board)
                .and_then(|fen| snapshot_from_fen(&fen).ok())
                .map(BoardMessage::BoardDump),
            Ok(event) if event.is_for(&serial) => event.into_message(),
            Ok(_) => {
                debug!("Ignoring event for another board");
                None
            }
            Err(e) => {
                debug!("Ignoring bridge message: {}", e);
                None
            }
        };
        if let Some(msg) = msg {
            if tx.send(TransportEvent::Message(msg)).await.is_err() {
                return;
            }
        }
    };
    let _ = tx.send(TransportEvent::Closed(reason)).await;
}

#[async_trait]
impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
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
        info!("Connecting to board bridge at {}", self.url);

        let (ws, _) = connect_async(self.url.as_str()).await.map_err(|e| {
            self.state.set(ConnectionState::Disconnected);
            LinkError::TransportUnavailable(format!("bridge service at {} ({})", self.url, e))
        })?;
        let (mut sink, mut stream) = ws.split();

        self.state.set(ConnectionState::Authenticating);
        let timeout = self.handshake_timeout;
        let outcome = tokio::time::timeout(timeout, self.handshake(&mut sink, &mut stream)).await;
        let (serial, pending) = match outcome {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                let _ = sink.close().await;
                self.release().await;
                return Err(e);
            }
            Err(_) => {
                warn!("Bridge handshake timed out after {:?}", timeout);
                let _ = sink.close().await;
                self.release().await;
                return Err(LinkError::ConnectionTimeout(timeout));
            }
        };

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        for msg in pending {
            let _ = tx.send(TransportEvent::Message(msg)).await;
        }
        self.reader = Some(tokio::spawn(read_loop(stream, serial.clone(), tx)));
        self.sink = Some(sink);
        info!("Subscribed to board {}", serial);
        self.serial = Some(serial);
        self.state.set(ConnectionState::Connected);
        Ok(rx)
    }

    /// The bridge owns the board; only a board request has a JSON equivalent
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.sink.is_none() {
            return Err(LinkError::NotConnected);
        }
        if data != [command::REQUEST_BOARD] {
            debug!("Bridge has no equivalent for command {:02x?}, skipped", data);
            return Ok(());
        }
        let call = NetworkCall::eboards(self.take_id());
        match self.sink.as_mut() {
            Some(sink) => Self::call(sink, &call).await,
            None => Err(LinkError::NotConnected),
        }
    }

    async fn close(&mut self) {
        if self.sink.is_some() {
            info!("Closing bridge connection");
        }
        self.release().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal bridge service: answers eboards/subscribe, then pushes a feed
    /// event for another board followed by one for the subscribed board
    async fn fake_bridge(listener: TcpListener, answer_subscribe: bool) {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let call: NetworkCall = serde_json::from_str(&text).unwrap();
            match call.call.as_str() {
                "eboards" => {
                    let reply = serde_json::json!({
                        "response": "call",
                        "id": call.id,
                        "param": [{"serialnr": "24958", "state": "ACTIVE", "board": "8/8/8/8/8/8/8/8"}],
                    });
                    ws.send(Message::Text(reply.to_string())).await.unwrap();
                }
                "subscribe" if answer_subscribe => {
                    let reply = serde_json::json!({"response": "call", "id": call.id, "param": null});
                    ws.send(Message::Text(reply.to_string())).await.unwrap();
                    let other = serde_json::json!({
                        "response": "feed",
                        "id": call.id,
                        "param": {"serialnr": "10001", "board": "8/8/8/8/8/8/8/3QK3"},
                    });
                    ws.send(Message::Text(other.to_string())).await.unwrap();
                    let feed = serde_json::json!({
                        "response": "feed",
                        "id": call.id,
                        "param": {"serialnr": "24958", "board": "8/8/8/8/8/8/8/4K3"},
                    });
                    ws.send(Message::Text(feed.to_string())).await.unwrap();
                }
                _ => {}
            }
        }
    }

    async fn transport_for(answer_subscribe: bool) -> SocketTransport {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(fake_bridge(listener, answer_subscribe));
        let config = TransportConfig {
            websocket_url: format!("ws://{}", addr),
            websocket_handshake_ms: 300,
            ..Default::default()
        };
        SocketTransport::new(&config)
    }

    #[tokio::test]
    async fn test_subscribe_and_receive_board() {
        let mut transport = transport_for(true).await;
        let mut rx = transport.open().await.unwrap();

        // Board from the eboards listing, then the subscribed board's feed
        // event; the other board's event in between is dropped
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, TransportEvent::Message(BoardMessage::BoardDump(ref s)) if s.piece_count() == 0));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, TransportEvent::Message(BoardMessage::BoardDump(ref s)) if s.piece_count() == 1));

        transport.close().await;
        assert!(matches!(transport.send(&[0x42]).await, Err(LinkError::NotConnected)));
    }

    #[tokio::test]
    async fn test_unconfirmed_subscription_times_out() {
        let mut transport = transport_for(false).await;
        let state = transport.state();
        let err = transport.open().await.unwrap_err();
        assert!(matches!(err, LinkError::ConnectionTimeout(_)));
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_no_service_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let config = TransportConfig {
            websocket_url: format!("ws://{}", addr),
            ..Default::default()
        };
        let mut transport = SocketTransport::new(&config);
        assert!(matches!(
            transport.open().await,
            Err(LinkError::TransportUnavailable(_))
        ));
    }
}
