//! Link tuning
//!
//! All durations are in milliseconds so the struct maps directly onto a
//! JSON config file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and tolerance settings for a board session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Quiet period after the last square update before the board counts as settled
    pub debounce_ms: u64,
    /// How long a large mismatch must persist before it is reported
    pub mismatch_grace_ms: u64,
    /// How long the starting layout must hold before it is reported
    pub start_position_window_ms: u64,
    /// Lifetime of the confirmation flash
    pub confirm_flash_ms: u64,
    /// Delay before the castling animation lights the rook squares
    pub castling_phase_ms: u64,
    /// Mismatching squares accepted as sensor gaps when syncing
    pub sync_tolerance: usize,
    /// Differing squares beyond which the board is out of sync
    pub max_move_diff: usize,
    pub led_speed: u8,
    pub led_intensity: u8,
    /// Flash the squares of each detected move
    pub confirm_flash: bool,
    /// Switch guidance from source to destination once the piece is lifted
    pub auto_guidance_phase: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            mismatch_grace_ms: 3_000,
            start_position_window_ms: 2_000,
            confirm_flash_ms: 1_000,
            castling_phase_ms: 2_000,
            sync_tolerance: 2,
            max_move_diff: 4,
            led_speed: 0x0a,
            led_intensity: 0x02,
            confirm_flash: true,
            auto_guidance_phase: true,
        }
    }
}

impl LinkConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn mismatch_grace(&self) -> Duration {
        Duration::from_millis(self.mismatch_grace_ms)
    }

    pub fn start_position_window(&self) -> Duration {
        Duration::from_millis(self.start_position_window_ms)
    }

    pub fn confirm_flash_duration(&self) -> Duration {
        Duration::from_millis(self.confirm_flash_ms)
    }

    pub fn castling_phase(&self) -> Duration {
        Duration::from_millis(self.castling_phase_ms)
    }
}
