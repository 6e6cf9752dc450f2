//! Board link session
//!
//! `BoardLink` owns every piece of per-connection state: framer, tracker,
//! calibration, resolver and LED guidance. It is a plain state machine. The
//! driver feeds it bytes, commands and the current time, sends whatever it
//! queues for the board, and sleeps until `next_deadline`. Events go out on
//! a single channel.

use crate::calibration::{Calibration, SyncOutcome};
use crate::config::LinkConfig;
use crate::guidance::GuidanceController;
use crate::resolver::{MoveResolver, Resolution};
use crate::timer::{Timer, earliest};
use crate::tracker::{BoardTracker, DeviceInfo};
use eboard_bridge::protocol::command;
use eboard_bridge::{BoardMessage, Framer, LedCommand};
use eboard_core::{
    BoardCapabilities, BoardMove, BoardSnapshot, ChessPosition, ConnectionState, GuidanceMove,
    LinkError, LinkEvent, SensorGaps,
};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Session state for one board
pub struct BoardLink<P: ChessPosition> {
    config: LinkConfig,
    capabilities: BoardCapabilities,
    state: ConnectionState,
    framer: Framer,
    tracker: BoardTracker,
    calibration: Calibration,
    resolver: MoveResolver,
    guidance: GuidanceController,
    position: Option<P>,
    mismatch_timer: Timer,
    mismatch_reported: bool,
    status: Option<String>,
    outbound: Vec<Vec<u8>>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl<P: ChessPosition> BoardLink<P> {
    pub fn new(
        capabilities: BoardCapabilities,
        config: LinkConfig,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        Self {
            framer: Framer::new(),
            tracker: BoardTracker::new(config.debounce()),
            calibration: Calibration::new(config.sync_tolerance, config.start_position_window()),
            resolver: MoveResolver::new(capabilities.kind, config.max_move_diff),
            guidance: GuidanceController::new(
                capabilities.leds,
                config.auto_guidance_phase,
                config.castling_phase(),
                config.confirm_flash_duration(),
            ),
            config,
            capabilities,
            state: ConnectionState::Disconnected,
            position: None,
            mismatch_timer: Timer::new(),
            mismatch_reported: false,
            status: None,
            outbound: Vec::new(),
            events,
        }
    }

    fn emit(&self, event: LinkEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    /// Emit a status line unless it is already showing
    fn set_status(&mut self, text: String) {
        if self.status.as_deref() == Some(text.as_str()) {
            return;
        }
        info!("Status: {}", text);
        self.status = Some(text.clone());
        self.emit(LinkEvent::status(text));
    }

    fn queue(&mut self, bytes: Vec<u8>) {
        if self.state.is_connected() {
            self.outbound.push(bytes);
        }
    }

    fn queue_led(&mut self, cmd: Option<LedCommand>) {
        if let Some(cmd) = cmd {
            if self.capabilities.leds {
                let bytes = cmd.encode(self.config.led_speed, self.config.led_intensity);
                self.queue(bytes);
            }
        }
    }

    fn expected_snapshot(&self) -> Option<BoardSnapshot> {
        let position = self.position.as_ref()?;
        Some(BoardSnapshot::encode(&position.placement(), self.capabilities.kind))
    }

    // --- lifecycle ---

    /// Report a transport state change that is not connect/disconnect
    pub fn on_connection_state(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connecting | ConnectionState::Authenticating => {
                self.state = state;
                self.set_status(state.to_string());
            }
            ConnectionState::Connected | ConnectionState::Disconnected => {}
        }
    }

    /// The transport could not be opened
    pub fn open_failed(&mut self, err: &LinkError) {
        self.state = ConnectionState::Disconnected;
        self.set_status(err.status_text());
    }

    /// The transport finished its handshake
    pub fn connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.emit(LinkEvent::ConnectionChanged { connected: true });
        self.set_status(ConnectionState::Connected.to_string());

        self.queue(vec![command::ENABLE_UPDATES]);
        self.queue(vec![command::REQUEST_BOARD]);
        self.queue(vec![command::REQUEST_VERSION]);
        if let Some(expected) = self.expected_snapshot() {
            self.calibration.begin(expected);
        }
    }

    /// Tear down all per-connection state. Safe to call any number of times.
    pub fn disconnect(&mut self) {
        let was_connected = self.state != ConnectionState::Disconnected;
        self.state = ConnectionState::Disconnected;
        self.framer.clear();
        self.tracker.reset();
        self.calibration.reset();
        self.resolver.rebase(BoardSnapshot::empty());
        self.guidance.reset();
        self.mismatch_timer.cancel();
        self.mismatch_reported = false;
        self.outbound.clear();

        if was_connected {
            info!("Board disconnected");
            self.emit(LinkEvent::ConnectionChanged { connected: false });
            self.set_status(ConnectionState::Disconnected.to_string());
        }
        self.status = None;
    }

    // --- commands ---

    /// Sync the board to a new authoritative position (new game, takeback, load)
    pub fn sync_to_position(&mut self, position: P, now: Instant) {
        let cmd = self.guidance.set_pending(None, &position.placement(), now);
        self.position = Some(position);
        self.mismatch_timer.cancel();
        self.mismatch_reported = false;
        if let Some(expected) = self.expected_snapshot() {
            self.calibration.begin(expected);
        }
        self.queue_led(cmd);
        self.queue(vec![command::REQUEST_BOARD]);
    }

    /// Replace the authoritative position when the board already shows it.
    ///
    /// Before the board is synced this retargets the open sync cycle and asks
    /// for a fresh dump.
    pub fn set_position(&mut self, position: P) {
        self.position = Some(position);
        if self.calibration.is_synced() {
            self.resolver.rebase(*self.tracker.snapshot());
        } else if let Some(expected) = self.expected_snapshot() {
            self.calibration.begin(expected);
            self.queue(vec![command::REQUEST_BOARD]);
        }
    }

    /// Set or clear the move the user should replay
    pub fn set_pending_guidance(&mut self, mv: Option<BoardMove>, now: Instant) {
        let placement = self
            .position
            .as_ref()
            .map(|p| p.placement())
            .unwrap_or_default();
        let cmd = self.guidance.set_pending(mv, &placement, now);
        self.queue_led(cmd);
    }

    pub fn clear_leds(&mut self) {
        let cmd = self.guidance.clear();
        self.queue_led(cmd);
    }

    // --- inputs ---

    /// Raw bytes from a framed transport
    pub fn on_bytes(&mut self, data: &[u8], now: Instant) {
        for msg in self.framer.feed(data) {
            self.on_message(msg, now);
        }
    }

    /// One decoded message
    pub fn on_message(&mut self, msg: BoardMessage, now: Instant) {
        if self.tracker.apply(&msg, now) {
            self.on_settled(now);
        } else if self.tracker.is_settling() {
            self.calibration.check_live(self.tracker.snapshot());
        }
    }

    /// Fire every timer that is due
    pub fn tick(&mut self, now: Instant) {
        if self.tracker.poll(now) {
            self.on_settled(now);
        }
        if self.calibration.poll(now) {
            info!("Starting position detected");
            self.emit(LinkEvent::StartingPositionDetected);
        }
        let cmd = self.guidance.poll(now);
        self.queue_led(cmd);
        if self.mismatch_timer.fire_if_due(now) {
            self.report_mismatch();
        }
    }

    fn on_settled(&mut self, now: Instant) {
        if !self.tracker.has_snapshot() {
            debug!("Board settled before its first dump, waiting for the dump");
            return;
        }
        let snapshot = *self.tracker.snapshot();
        debug!("Board settled: {:?}", snapshot);

        if !self.calibration.is_synced() {
            match self.calibration.evaluate(&snapshot) {
                Some(SyncOutcome::Synced { gaps }) => {
                    self.resolver.rebase(snapshot);
                    if gaps.is_empty() {
                        self.set_status("Board synced".to_string());
                    } else {
                        self.set_status(format!("Board synced ({} sensor gaps)", gaps.len()));
                    }
                }
                Some(SyncOutcome::Mismatch { differing }) => {
                    self.set_status(format!(
                        "Board doesn't match: arrange pieces ({} squares differ)",
                        differing
                    ));
                    return;
                }
                None => return,
            }
        }

        self.calibration.watch_start(&snapshot, now);
        let gaps = *self.calibration.gaps();
        let cmd = self.guidance.on_snapshot(&snapshot, &gaps);
        self.queue_led(cmd);

        let Some(position) = self.position.as_ref() else {
            return;
        };
        match self.resolver.resolve(position, &snapshot, &gaps) {
            Resolution::Move(mv) => {
                self.back_in_sync();
                self.on_move(mv, now);
            }
            Resolution::NoMove => {
                if self.resolver.differing(&snapshot, &gaps) == 0 {
                    self.back_in_sync();
                }
            }
            Resolution::Ambiguous(candidates) => {
                debug!("Waiting for more data, {} candidates", candidates.len());
            }
            Resolution::OutOfSync { differing } => {
                debug!("{} squares differ from the last stable board", differing);
                if !self.mismatch_timer.is_pending() && !self.mismatch_reported {
                    self.mismatch_timer.schedule(now, self.config.mismatch_grace());
                }
            }
        }
    }

    fn on_move(&mut self, mv: BoardMove, now: Instant) {
        info!("Move detected: {}", mv);
        let next = self.position.as_ref().and_then(|p| p.play(&mv));
        match next {
            Some(next) => self.position = Some(next),
            None => warn!("Rules engine rejected detected move {}", mv),
        }
        self.emit(LinkEvent::MoveDetected { mv });
        let cmd = self.guidance.on_move(&mv, self.config.confirm_flash, now);
        self.queue_led(cmd);
    }

    fn back_in_sync(&mut self) {
        self.mismatch_timer.cancel();
        if self.mismatch_reported {
            self.mismatch_reported = false;
            self.set_status("Board synced".to_string());
        }
    }

    fn report_mismatch(&mut self) {
        let snapshot = *self.tracker.snapshot();
        let gaps = *self.calibration.gaps();
        if self.resolver.differing(&snapshot, &gaps) <= self.config.max_move_diff {
            return;
        }
        let expected = self
            .expected_snapshot()
            .unwrap_or(*self.resolver.last_stable())
            .piece_count();
        self.mismatch_reported = true;
        self.set_status(format!(
            "Board has {} pieces, expected {}: please correct",
            snapshot.piece_count(),
            expected
        ));
    }

    // --- outputs and accessors ---

    /// Commands queued for the board since the last call
    pub fn take_outbound(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbound)
    }

    /// Earliest pending timer
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.tracker.next_deadline(),
            self.calibration.next_deadline(),
            self.guidance.next_deadline(),
            self.mismatch_timer.deadline(),
        ])
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn capabilities(&self) -> BoardCapabilities {
        self.capabilities
    }

    pub fn device_info(&self) -> &DeviceInfo {
        self.tracker.device_info()
    }

    pub fn snapshot(&self) -> &BoardSnapshot {
        self.tracker.snapshot()
    }

    pub fn gaps(&self) -> &SensorGaps {
        self.calibration.gaps()
    }

    pub fn is_synced(&self) -> bool {
        self.calibration.is_synced()
    }

    pub fn position(&self) -> Option<&P> {
        self.position.as_ref()
    }

    pub fn pending_guidance(&self) -> Option<&GuidanceMove> {
        self.guidance.pending()
    }
}
