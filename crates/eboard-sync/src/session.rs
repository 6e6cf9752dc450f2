//! Async session driver
//!
//! Binds one transport to one `BoardLink` and runs until the board goes
//! away or the application asks to disconnect. A single task owns both, so
//! events are handled strictly in arrival order.

use crate::config::LinkConfig;
use crate::service::BoardLink;
use eboard_bridge::{Transport, TransportEvent};
use eboard_core::{BoardMove, ChessPosition, LinkEvent, Result};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Commands from the application to a running session
#[derive(Debug, Clone)]
pub enum LinkCommand<P> {
    /// New game or any other jump; resyncs the board
    SyncToPosition(P),
    /// Position changed in software and the board already shows it
    SetPosition(P),
    /// Move the user should replay on the board, `None` to cancel
    SetPendingGuidance(Option<BoardMove>),
    ClearLeds,
    Disconnect,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Send every queued command to the board
async fn flush<P: ChessPosition>(link: &mut BoardLink<P>, transport: &mut dyn Transport) -> Result<()> {
    for bytes in link.take_outbound() {
        transport.send(&bytes).await?;
    }
    Ok(())
}

/// Open `transport` and run a board session on it.
///
/// `initial` is the position the board should be synced to once connected.
/// Returns when the transport closes, a send fails, `Disconnect` is received
/// or the command channel is dropped. Every exit path closes the transport
/// and resets the link.
pub async fn run_session<P: ChessPosition>(
    mut transport: Box<dyn Transport>,
    config: LinkConfig,
    initial: Option<P>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand<P>>,
    events: mpsc::UnboundedSender<LinkEvent>,
) -> Result<()> {
    let mut link = BoardLink::new(transport.capabilities(), config, events);
    if let Some(position) = initial {
        link.sync_to_position(position, now());
    }

    // Handshake progress is only visible through the state watch
    let mut state = transport.state();
    info!("Opening {} transport", transport.kind());
    let opened = {
        let open = transport.open();
        tokio::pin!(open);
        loop {
            tokio::select! {
                result = &mut open => break result,
                Ok(()) = state.changed() => {
                    let current = *state.borrow_and_update();
                    link.on_connection_state(current);
                }
            }
        }
    };
    let mut incoming = match opened {
        Ok(rx) => rx,
        Err(e) => {
            warn!("Failed to open {} transport: {}", transport.kind(), e);
            link.open_failed(&e);
            return Err(e);
        }
    };
    link.connected();

    let result = loop {
        if let Err(e) = flush(&mut link, transport.as_mut()).await {
            warn!("Send to board failed: {}", e);
            break Err(e);
        }

        tokio::select! {
            event = incoming.recv() => match event {
                Some(TransportEvent::Data(bytes)) => link.on_bytes(&bytes, now()),
                Some(TransportEvent::Message(msg)) => link.on_message(msg, now()),
                Some(TransportEvent::Closed(reason)) => {
                    match reason {
                        Some(reason) => warn!("Board connection lost: {}", reason),
                        None => info!("Board connection closed"),
                    }
                    break Ok(());
                }
                None => break Ok(()),
            },
            command = commands.recv() => match command {
                Some(LinkCommand::SyncToPosition(position)) => link.sync_to_position(position, now()),
                Some(LinkCommand::SetPosition(position)) => link.set_position(position),
                Some(LinkCommand::SetPendingGuidance(mv)) => link.set_pending_guidance(mv, now()),
                Some(LinkCommand::ClearLeds) => link.clear_leds(),
                Some(LinkCommand::Disconnect) | None => {
                    info!("Disconnect requested");
                    break Ok(());
                }
            },
            _ = sleep_until(link.next_deadline()) => link.tick(now()),
        }
    };

    transport.close().await;
    link.disconnect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ScriptedPosition, mv, opening_moves};
    use eboard_bridge::protocol::{command, message_id};
    use eboard_bridge::{MemoryBoard, TransportKind, memory_pair};
    use eboard_core::{BoardCapabilities, BoardKind, BoardSnapshot, LinkError, Placement};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    struct Harness {
        board: MemoryBoard,
        commands: mpsc::UnboundedSender<LinkCommand<ScriptedPosition>>,
        events: mpsc::UnboundedReceiver<LinkEvent>,
        session: JoinHandle<Result<()>>,
    }

    fn start_session(fail_open: Option<LinkError>) -> Harness {
        let (transport, board) = memory_pair(
            TransportKind::Ble,
            BoardCapabilities::new(BoardKind::OccupancyOnly, true),
        );
        if let Some(err) = fail_open {
            board.fail_next_open(err);
        }
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let config = LinkConfig {
            debounce_ms: 20,
            ..Default::default()
        };
        let position = ScriptedPosition::starting(vec![opening_moves()]);
        let session = tokio::spawn(run_session(
            Box::new(transport),
            config,
            Some(position),
            cmd_rx,
            event_tx,
        ));
        Harness {
            board,
            commands: cmd_tx,
            events: event_rx,
            session,
        }
    }

    /// Next event, failing the test after a second
    async fn next_event(events: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn wait_for(events: &mut mpsc::UnboundedReceiver<LinkEvent>, wanted: &LinkEvent) {
        loop {
            if &next_event(events).await == wanted {
                return;
            }
        }
    }

    fn start_dump() -> BoardSnapshot {
        BoardSnapshot::encode(&Placement::starting(), BoardKind::OccupancyOnly)
    }

    async fn wait_until_open(board: &MemoryBoard) {
        for _ in 0..100 {
            if board.is_open() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("transport never opened");
    }

    #[tokio::test]
    async fn test_session_detects_move_end_to_end() {
        let mut h = start_session(None);
        wait_until_open(&h.board).await;
        wait_for(&mut h.events, &LinkEvent::ConnectionChanged { connected: true }).await;

        h.board
            .inject_frame(message_id::BOARD_DUMP, start_dump().cells())
            .await;
        wait_for(&mut h.events, &LinkEvent::status("Board synced")).await;

        let e2 = "e2".parse::<eboard_core::Square>().unwrap().index() as u8;
        let e4 = "e4".parse::<eboard_core::Square>().unwrap().index() as u8;
        h.board.inject_frame(message_id::FIELD_UPDATE, &[e2, 0]).await;
        h.board.inject_frame(message_id::FIELD_UPDATE, &[e4, 1]).await;
        wait_for(&mut h.events, &LinkEvent::MoveDetected { mv: mv("e2e4") }).await;

        h.commands.send(LinkCommand::Disconnect).unwrap();
        assert!(h.session.await.unwrap().is_ok());
        wait_for(&mut h.events, &LinkEvent::ConnectionChanged { connected: false }).await;

        let sent = h.board.sent();
        assert!(sent.contains(&vec![command::ENABLE_UPDATES]));
        assert!(sent.contains(&vec![command::REQUEST_BOARD]));
        assert!(sent.contains(&vec![command::REQUEST_VERSION]));
        assert!(!h.board.is_open());
    }

    #[tokio::test]
    async fn test_guidance_command_reaches_board() {
        let mut h = start_session(None);
        wait_until_open(&h.board).await;
        h.board
            .inject_frame(message_id::BOARD_DUMP, start_dump().cells())
            .await;
        wait_for(&mut h.events, &LinkEvent::status("Board synced")).await;
        h.board.take_sent();

        h.commands
            .send(LinkCommand::SetPendingGuidance(Some(mv("b1c3"))))
            .unwrap();
        h.commands.send(LinkCommand::ClearLeds).unwrap();
        h.commands.send(LinkCommand::Disconnect).unwrap();
        tokio_test::assert_ok!(h.session.await.unwrap());

        let sent = h.board.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0][0], command::LED);
        assert_eq!(sent[1], eboard_bridge::protocol::led_off());
    }

    #[tokio::test]
    async fn test_board_hang_up_ends_session() {
        let mut h = start_session(None);
        wait_until_open(&h.board).await;
        wait_for(&mut h.events, &LinkEvent::ConnectionChanged { connected: true }).await;

        h.board.hang_up(Some("unplugged")).await;
        assert!(h.session.await.unwrap().is_ok());
        wait_for(&mut h.events, &LinkEvent::ConnectionChanged { connected: false }).await;
        wait_for(&mut h.events, &LinkEvent::status("Disconnected")).await;
    }

    #[tokio::test]
    async fn test_open_failure_reports_status() {
        let mut h = start_session(Some(LinkError::DeviceNotSelected));
        let result = h.session.await.unwrap();
        assert!(matches!(result, Err(LinkError::DeviceNotSelected)));
        wait_for(&mut h.events, &LinkEvent::status(LinkError::DeviceNotSelected.status_text())).await;
    }
}
