//! Board state tracker
//!
//! Owns the live 64-cell snapshot. Full dumps overwrite everything and count
//! as settled straight away. Single-square updates arrive in bursts (a move
//! is a lift then a place), so each one restarts the debounce timer and the
//! board is only settled once the timer runs out.

use crate::timer::Timer;
use eboard_bridge::BoardMessage;
use eboard_core::BoardSnapshot;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Identity reported by the board
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub serial: Option<String>,
    pub version: Option<(u8, u8)>,
}

/// Live snapshot plus debounce state
#[derive(Debug)]
pub struct BoardTracker {
    snapshot: BoardSnapshot,
    has_snapshot: bool,
    debounce: Timer,
    debounce_delay: Duration,
    device: DeviceInfo,
}

impl BoardTracker {
    pub fn new(debounce_delay: Duration) -> Self {
        Self {
            snapshot: BoardSnapshot::empty(),
            has_snapshot: false,
            debounce: Timer::new(),
            debounce_delay,
            device: DeviceInfo::default(),
        }
    }

    /// Apply one board message. Returns true if the board is settled now.
    pub fn apply(&mut self, msg: &BoardMessage, now: Instant) -> bool {
        match msg {
            BoardMessage::BoardDump(snapshot) => {
                self.snapshot = *snapshot;
                self.has_snapshot = true;
                self.debounce.cancel();
                true
            }
            BoardMessage::FieldUpdate { square, code } => {
                debug!("Square {} -> {:#04x}", square, code);
                self.snapshot.set(*square, *code);
                self.debounce.schedule(now, self.debounce_delay);
                false
            }
            BoardMessage::SerialNumber(serial) => {
                info!("Board serial number {}", serial);
                self.device.serial = Some(serial.clone());
                false
            }
            BoardMessage::Version { major, minor } => {
                info!("Board firmware {}.{}", major, minor);
                self.device.version = Some((*major, *minor));
                false
            }
            BoardMessage::Unknown { id, payload } => {
                debug!("Ignoring message {:#04x} ({} bytes)", id, payload.len());
                false
            }
        }
    }

    /// Returns true when the debounce window has just elapsed
    pub fn poll(&mut self, now: Instant) -> bool {
        self.debounce.fire_if_due(now)
    }

    pub fn snapshot(&self) -> &BoardSnapshot {
        &self.snapshot
    }

    /// Whether any full dump has been seen on this connection
    pub fn has_snapshot(&self) -> bool {
        self.has_snapshot
    }

    pub fn is_settling(&self) -> bool {
        self.debounce.is_pending()
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn reset(&mut self) {
        self.snapshot = BoardSnapshot::empty();
        self.has_snapshot = false;
        self.debounce.cancel();
        self.device = DeviceInfo::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eboard_core::Square;
    use proptest::prelude::*;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    fn update(name: &str, code: u8) -> BoardMessage {
        BoardMessage::FieldUpdate { square: sq(name), code }
    }

    #[test]
    fn test_burst_settles_once_from_last_update() {
        let t0 = Instant::now();
        let mut tracker = BoardTracker::new(DEBOUNCE);

        assert!(!tracker.apply(&update("e2", 0), t0));
        assert!(!tracker.apply(&update("e3", 1), t0 + Duration::from_millis(200)));
        assert!(!tracker.apply(&update("e3", 0), t0 + Duration::from_millis(250)));
        assert!(!tracker.apply(&update("e4", 1), t0 + Duration::from_millis(400)));

        // 300ms after the first update is not enough
        assert!(!tracker.poll(t0 + Duration::from_millis(300)));
        assert!(!tracker.poll(t0 + Duration::from_millis(699)));
        assert!(tracker.poll(t0 + Duration::from_millis(700)));
        assert!(!tracker.poll(t0 + Duration::from_secs(5)));

        assert!(!tracker.snapshot().is_occupied(sq("e2")));
        assert!(!tracker.snapshot().is_occupied(sq("e3")));
        assert!(tracker.snapshot().is_occupied(sq("e4")));
    }

    #[test]
    fn test_dump_settles_immediately_and_cancels_debounce() {
        let t0 = Instant::now();
        let mut tracker = BoardTracker::new(DEBOUNCE);
        tracker.apply(&update("a1", 1), t0);
        assert!(tracker.is_settling());

        let mut cells = [0u8; 64];
        cells[0] = 8;
        assert!(tracker.apply(&BoardMessage::BoardDump(BoardSnapshot::from_cells(cells)), t0));
        assert!(!tracker.is_settling());
        assert!(tracker.has_snapshot());
        assert_eq!(tracker.next_deadline(), None);
        assert_eq!(tracker.snapshot().cells()[0], 8);
    }

    #[test]
    fn test_device_info_and_reset() {
        let t0 = Instant::now();
        let mut tracker = BoardTracker::new(DEBOUNCE);
        tracker.apply(&BoardMessage::SerialNumber("24958".into()), t0);
        tracker.apply(&BoardMessage::Version { major: 1, minor: 7 }, t0);
        assert_eq!(tracker.device_info().serial.as_deref(), Some("24958"));
        assert_eq!(tracker.device_info().version, Some((1, 7)));

        tracker.apply(&update("h1", 2), t0);
        tracker.reset();
        assert_eq!(tracker.device_info(), &DeviceInfo::default());
        assert_eq!(tracker.snapshot(), &BoardSnapshot::empty());
        assert!(!tracker.poll(t0 + Duration::from_secs(1)));
    }

    proptest! {
        #[test]
        fn prop_dump_is_copied_byte_for_byte(payload in proptest::collection::vec(any::<u8>(), 64)) {
            let mut tracker = BoardTracker::new(DEBOUNCE);
            let snapshot = BoardSnapshot::from_slice(&payload).unwrap();
            prop_assert!(tracker.apply(&BoardMessage::BoardDump(snapshot), Instant::now()));
            prop_assert_eq!(&tracker.snapshot().cells()[..], &payload[..]);
        }
    }
}
