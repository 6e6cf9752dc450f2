//! LED guidance
//!
//! Lights the squares of a move made in software so the user can replay it
//! on the board. An ordinary move is shown in two phases: the source square
//! until the piece is lifted, then the destination. Castling gets its own
//! animation instead: the king's squares first, then after a delay king and
//! rook together. A short confirmation flash marks moves the user played.
//!
//! Boards without LEDs get no commands at all.

use crate::timer::Timer;
use eboard_bridge::{BlinkMode, LedCommand};
use eboard_core::{BoardMove, BoardSnapshot, GuidanceMove, GuidancePhase, Placement, Role, SensorGaps, Square};
use std::time::{Duration, Instant};
use tracing::debug;

/// Whether `mv` is a castling move in `placement` (the king hops two files)
pub fn is_castling(mv: &BoardMove, placement: &Placement) -> bool {
    mv.file_distance() == 2
        && mv.from.rank() == mv.to.rank()
        && placement
            .piece_at(mv.from)
            .is_some_and(|piece| piece.role == Role::King)
}

/// King and rook squares of a castling move: king from/to, rook from/to
pub fn castling_squares(mv: &BoardMove) -> Option<[Square; 4]> {
    let rank = mv.from.rank();
    let (rook_from, rook_to) = if mv.to.file() > mv.from.file() {
        (7, 5)
    } else {
        (0, 3)
    };
    Some([
        mv.from,
        mv.to,
        Square::from_coords(rook_from, rank)?,
        Square::from_coords(rook_to, rank)?,
    ])
}

#[derive(Debug)]
pub struct GuidanceController {
    enabled: bool,
    auto_phase: bool,
    pending: Option<GuidanceMove>,
    castling_timer: Timer,
    castling_delay: Duration,
    flash_timer: Timer,
    flash_duration: Duration,
}

impl GuidanceController {
    pub fn new(enabled: bool, auto_phase: bool, castling_delay: Duration, flash_duration: Duration) -> Self {
        Self {
            enabled,
            auto_phase,
            pending: None,
            castling_timer: Timer::new(),
            castling_delay,
            flash_timer: Timer::new(),
            flash_duration,
        }
    }

    pub fn pending(&self) -> Option<&GuidanceMove> {
        self.pending.as_ref()
    }

    fn emit(&self, cmd: LedCommand) -> Option<LedCommand> {
        self.enabled.then_some(cmd)
    }

    /// LEDs for the pending move in its current phase
    fn current_lights(&self) -> LedCommand {
        match self.pending {
            Some(GuidanceMove { mv, phase: GuidancePhase::From }) => LedCommand::light([mv.from]),
            Some(GuidanceMove { mv, phase: GuidancePhase::To }) => LedCommand::light([mv.to]),
            Some(GuidanceMove { mv, phase: GuidancePhase::None }) => {
                if self.castling_timer.is_pending() {
                    LedCommand::light([mv.from, mv.to])
                } else {
                    LedCommand::light(castling_squares(&mv).into_iter().flatten())
                }
            }
            None => LedCommand::Off,
        }
    }

    /// Replace the pending guidance move; `None` clears it
    pub fn set_pending(&mut self, mv: Option<BoardMove>, placement: &Placement, now: Instant) -> Option<LedCommand> {
        self.castling_timer.cancel();
        self.flash_timer.cancel();
        self.pending = mv.map(|mv| {
            if is_castling(&mv, placement) {
                if self.enabled {
                    self.castling_timer.schedule(now, self.castling_delay);
                }
                GuidanceMove { mv, phase: GuidancePhase::None }
            } else {
                GuidanceMove::new(mv)
            }
        });
        if let Some(guidance) = &self.pending {
            debug!("Guiding {} ({:?})", guidance.mv, guidance.phase);
        }
        self.emit(self.current_lights())
    }

    /// Advance from the source to the destination once the source is empty
    pub fn on_snapshot(&mut self, current: &BoardSnapshot, gaps: &SensorGaps) -> Option<LedCommand> {
        if !self.auto_phase {
            return None;
        }
        let guidance = self.pending.as_mut()?;
        if guidance.phase != GuidancePhase::From
            || gaps.contains(guidance.mv.from)
            || current.is_occupied(guidance.mv.from)
        {
            return None;
        }
        guidance.phase = GuidancePhase::To;
        debug!("Guidance for {} advanced to destination", guidance.mv);
        if self.flash_timer.is_pending() {
            return None;
        }
        self.emit(self.current_lights())
    }

    /// A move was detected on the board.
    ///
    /// Completes the pending guidance when it is that move; otherwise the
    /// move is confirmed with a flash if `flash` is set.
    pub fn on_move(&mut self, mv: &BoardMove, flash: bool, now: Instant) -> Option<LedCommand> {
        if self.pending.is_some_and(|g| g.mv.same_action(mv)) {
            debug!("Guidance for {} completed", mv);
            return self.clear();
        }
        if !flash || !self.enabled {
            return None;
        }
        self.flash_timer.schedule(now, self.flash_duration);
        self.emit(LedCommand::Light {
            squares: vec![mv.from, mv.to],
            mode: BlinkMode::SingleFlash,
        })
    }

    /// Advance the castling animation or end a flash
    pub fn poll(&mut self, now: Instant) -> Option<LedCommand> {
        let castling = self.castling_timer.fire_if_due(now);
        let flash_over = self.flash_timer.fire_if_due(now);
        if (castling && !self.flash_timer.is_pending()) || flash_over {
            return self.emit(self.current_lights());
        }
        None
    }

    /// Drop the pending move and switch the LEDs off
    pub fn clear(&mut self) -> Option<LedCommand> {
        self.reset();
        self.emit(LedCommand::Off)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        crate::timer::earliest([self.castling_timer.deadline(), self.flash_timer.deadline()])
    }

    /// Forget everything without touching the LEDs
    pub fn reset(&mut self) {
        self.pending = None;
        self.castling_timer.cancel();
        self.flash_timer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{mv, sq};

    const DELAY: Duration = Duration::from_secs(2);
    const FLASH: Duration = Duration::from_secs(1);

    fn controller() -> GuidanceController {
        GuidanceController::new(true, true, DELAY, FLASH)
    }

    fn lit(squares: &[&str]) -> Option<LedCommand> {
        Some(LedCommand::light(squares.iter().map(|s| sq(s))))
    }

    #[test]
    fn test_two_phase_guidance() {
        let t0 = Instant::now();
        let start = Placement::starting();
        let mut leds = controller();

        assert_eq!(leds.set_pending(Some(mv("g1f3")), &start, t0), lit(&["g1"]));
        assert_eq!(leds.pending().unwrap().phase, GuidancePhase::From);

        let mut board = BoardSnapshot::encode(&start, eboard_core::BoardKind::OccupancyOnly);
        // Source still occupied
        assert_eq!(leds.on_snapshot(&board, &SensorGaps::new()), None);

        board.set(sq("g1"), 0);
        assert_eq!(leds.on_snapshot(&board, &SensorGaps::new()), lit(&["f3"]));
        assert_eq!(leds.pending().unwrap().phase, GuidancePhase::To);
        assert_eq!(leds.on_snapshot(&board, &SensorGaps::new()), None);

        assert_eq!(leds.on_move(&mv("g1f3"), true, t0), Some(LedCommand::Off));
        assert!(leds.pending().is_none());
        assert_eq!(leds.next_deadline(), None);
    }

    #[test]
    fn test_castling_animation() {
        let t0 = Instant::now();
        let placement = Placement::from_board_fen("r3k2r/8/8/8/8/8/8/R3K2R").unwrap();
        let mut leds = controller();

        assert_eq!(leds.set_pending(Some(mv("e8c8")), &placement, t0), lit(&["e8", "c8"]));
        assert_eq!(leds.pending().unwrap().phase, GuidancePhase::None);
        assert_eq!(leds.poll(t0 + Duration::from_millis(1999)), None);
        assert_eq!(leds.poll(t0 + DELAY), lit(&["e8", "c8", "a8", "d8"]));
        assert_eq!(leds.next_deadline(), None);

        // Lifting the king does not switch phases
        let board = BoardSnapshot::empty();
        assert_eq!(leds.on_snapshot(&board, &SensorGaps::new()), None);
    }

    #[test]
    fn test_rook_two_files_is_not_castling() {
        let placement = Placement::from_board_fen("4k3/8/8/8/8/8/8/R3K3").unwrap();
        assert!(!is_castling(&mv("a1c1"), &placement));
        assert!(is_castling(&mv("e1c1"), &placement));
        assert!(!is_castling(&mv("e1e3"), &placement));
    }

    #[test]
    fn test_confirmation_flash_clears_itself() {
        let t0 = Instant::now();
        let mut leds = controller();
        assert_eq!(
            leds.on_move(&mv("e2e4"), true, t0),
            Some(LedCommand::Light {
                squares: vec![sq("e2"), sq("e4")],
                mode: BlinkMode::SingleFlash,
            })
        );
        assert_eq!(leds.poll(t0 + Duration::from_millis(500)), None);
        assert_eq!(leds.poll(t0 + FLASH), Some(LedCommand::Off));
        assert_eq!(leds.poll(t0 + FLASH * 2), None);
        assert_eq!(leds.on_move(&mv("e2e4"), false, t0), None);
    }

    #[test]
    fn test_flash_restores_guidance() {
        let t0 = Instant::now();
        let mut leds = controller();
        leds.set_pending(Some(mv("d7d5")), &Placement::starting(), t0);
        assert!(leds.on_move(&mv("e2e4"), true, t0).is_some());
        assert_eq!(leds.poll(t0 + FLASH), lit(&["d7"]));
    }

    #[test]
    fn test_no_leds_means_no_commands() {
        let t0 = Instant::now();
        let placement = Placement::from_board_fen("r3k2r/8/8/8/8/8/8/R3K2R").unwrap();
        let mut leds = GuidanceController::new(false, true, DELAY, FLASH);
        assert_eq!(leds.set_pending(Some(mv("e1g1")), &placement, t0), None);
        assert_eq!(leds.next_deadline(), None);
        assert_eq!(leds.on_move(&mv("a1b1"), true, t0), None);
        assert_eq!(leds.clear(), None);
        // The guidance move itself is still tracked
        leds.set_pending(Some(mv("a1b1")), &placement, t0);
        assert!(leds.pending().is_some());
    }
}
