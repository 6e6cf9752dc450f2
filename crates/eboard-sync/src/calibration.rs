//! Sync and calibration
//!
//! Reconciles the settled snapshot with the position the application says is
//! on the board. A handful of mismatching squares is put down to faulty
//! sensors and recorded as gaps; anything more means the pieces need to be
//! rearranged. Once synced, the board is also watched for a return to the
//! starting layout.

use crate::timer::Timer;
use eboard_core::{BoardSnapshot, SensorGaps};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result of comparing a settled snapshot with the expected one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Accepted; the listed squares are now sensor gaps
    Synced { gaps: SensorGaps },
    /// Too many squares differ
    Mismatch { differing: usize },
}

#[derive(Debug)]
pub struct Calibration {
    expected: Option<BoardSnapshot>,
    synced: bool,
    gaps: SensorGaps,
    tolerance: usize,
    start_window: Duration,
    start_timer: Timer,
    start_fired: bool,
}

impl Calibration {
    pub fn new(tolerance: usize, start_window: Duration) -> Self {
        Self {
            expected: None,
            synced: false,
            gaps: SensorGaps::new(),
            tolerance,
            start_window,
            start_timer: Timer::new(),
            start_fired: false,
        }
    }

    /// Start a sync cycle against `expected`. Drops the previous gaps.
    pub fn begin(&mut self, expected: BoardSnapshot) {
        self.expected = Some(expected);
        self.synced = false;
        self.gaps.clear();
        self.start_timer.cancel();
    }

    /// Compare a settled snapshot while a sync cycle is open.
    ///
    /// Returns `None` when already synced or nothing is expected.
    pub fn evaluate(&mut self, snapshot: &BoardSnapshot) -> Option<SyncOutcome> {
        if self.synced {
            return None;
        }
        let expected = self.expected?;
        let differing = expected.diff(snapshot, &SensorGaps::new());
        if differing.len() > self.tolerance {
            debug!("Sync rejected: {} squares differ", differing.len());
            return Some(SyncOutcome::Mismatch {
                differing: differing.len(),
            });
        }

        self.gaps = differing.into_iter().collect();
        self.synced = true;
        if !self.gaps.is_empty() {
            let names: Vec<String> = self.gaps.iter().map(|sq| sq.to_string()).collect();
            info!("Sensor gaps recorded: {}", names.join(", "));
        }
        Some(SyncOutcome::Synced { gaps: self.gaps })
    }

    /// Track the starting layout on a settled snapshot.
    ///
    /// The notification is one-shot: it re-arms only after the board has
    /// left the starting layout.
    pub fn watch_start(&mut self, snapshot: &BoardSnapshot, now: Instant) {
        if !self.synced {
            return;
        }
        if snapshot.is_starting_layout(&self.gaps) {
            if !self.start_fired && !self.start_timer.is_pending() {
                debug!("Starting layout seen, waiting {:?}", self.start_window);
                self.start_timer.schedule(now, self.start_window);
            }
        } else {
            self.start_timer.cancel();
            self.start_fired = false;
        }
    }

    /// Check the live, not yet settled board.
    ///
    /// Leaving the starting layout cancels a running window at once, so a
    /// change still inside the debounce window cannot be missed.
    pub fn check_live(&mut self, live: &BoardSnapshot) {
        if self.start_timer.is_pending() && !live.is_starting_layout(&self.gaps) {
            debug!("Starting layout left before the window elapsed");
            self.start_timer.cancel();
        }
    }

    /// Returns true when the starting layout has held for the whole window
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.start_timer.fire_if_due(now) {
            self.start_fired = true;
            return true;
        }
        false
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn gaps(&self) -> &SensorGaps {
        &self.gaps
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.start_timer.deadline()
    }

    pub fn reset(&mut self) {
        self.expected = None;
        self.synced = false;
        self.gaps.clear();
        self.start_timer.cancel();
        self.start_fired = false;
    }
}
