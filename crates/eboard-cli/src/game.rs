//! Interactive game state
//!
//! Mirrors the position the session advances on its own, turns lines typed
//! on stdin into session commands and reacts to board events.

use crate::rules::ShakmatyPosition;
use eboard_core::{BoardMove, ChessPosition, LinkEvent};
use eboard_sync::LinkCommand;
use tracing::{info, warn};

pub const HELP: &str = "commands: <uci move> to guide, cancel, clear, new, fen <FEN>, quit";

pub struct Game {
    position: ShakmatyPosition,
    plies: usize,
}

impl Game {
    pub fn new(position: ShakmatyPosition) -> Self {
        Self { position, plies: 0 }
    }

    pub fn position(&self) -> &ShakmatyPosition {
        &self.position
    }

    fn reset(&mut self, position: ShakmatyPosition) -> LinkCommand<ShakmatyPosition> {
        self.position = position.clone();
        self.plies = 0;
        LinkCommand::SyncToPosition(position)
    }

    /// Translate one line of input. `Ok(None)` means nothing to send.
    pub fn handle_input(&mut self, line: &str) -> Result<Option<LinkCommand<ShakmatyPosition>>, String> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let command = match word {
            "" => return Ok(None),
            "help" | "?" => return Err(HELP.to_string()),
            "quit" | "exit" => LinkCommand::Disconnect,
            "clear" => LinkCommand::ClearLeds,
            "cancel" => LinkCommand::SetPendingGuidance(None),
            "new" => self.reset(ShakmatyPosition::starting()),
            "fen" => {
                let position = ShakmatyPosition::from_fen(rest).map_err(|e| e.to_string())?;
                self.reset(position)
            }
            uci => {
                let mv = BoardMove::from_uci(uci).map_err(|e| e.to_string())?;
                if self.position.play(&mv).is_none() {
                    return Err(format!("{} is not legal here", mv));
                }
                LinkCommand::SetPendingGuidance(Some(mv))
            }
        };
        Ok(Some(command))
    }

    /// Follow a board event; may answer with a command
    pub fn handle_event(&mut self, event: &LinkEvent) -> Option<LinkCommand<ShakmatyPosition>> {
        match event {
            LinkEvent::MoveDetected { mv } => {
                match self.position.play(mv) {
                    Some(next) => {
                        self.position = next;
                        self.plies += 1;
                        if self.position.is_game_over() {
                            info!("Game over after {} plies", self.plies);
                        }
                    }
                    None => warn!("Board reported {} which is not legal in the local game", mv),
                }
                None
            }
            LinkEvent::StartingPositionDetected if self.plies > 0 => {
                info!("Pieces set up for a new game");
                Some(self.reset(ShakmatyPosition::starting()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(uci: &str) -> BoardMove {
        BoardMove::from_uci(uci).unwrap()
    }

    #[test]
    fn test_input_commands() {
        let mut game = Game::new(ShakmatyPosition::starting());
        assert!(matches!(game.handle_input("  "), Ok(None)));
        assert!(matches!(game.handle_input("quit"), Ok(Some(LinkCommand::Disconnect))));
        assert!(matches!(game.handle_input("clear"), Ok(Some(LinkCommand::ClearLeds))));
        assert!(matches!(
            game.handle_input("e2e4"),
            Ok(Some(LinkCommand::SetPendingGuidance(Some(m)))) if m == mv("e2e4")
        ));
        assert!(game.handle_input("e2e5").is_err());
        assert!(game.handle_input("zz").is_err());
        assert!(game.handle_input("fen garbage").is_err());
    }

    #[test]
    fn test_follow_detected_moves_and_reset() {
        let mut game = Game::new(ShakmatyPosition::starting());
        // Already at the start: nothing to do
        assert!(game.handle_event(&LinkEvent::StartingPositionDetected).is_none());

        assert!(game.handle_event(&LinkEvent::MoveDetected { mv: mv("d2d4") }).is_none());
        assert!(game.position().placement().piece_at("d4".parse().unwrap()).is_some());

        assert!(matches!(
            game.handle_event(&LinkEvent::StartingPositionDetected),
            Some(LinkCommand::SyncToPosition(_))
        ));
        assert_eq!(game.position().legal_moves().len(), 20);
    }

    #[test]
    fn test_fen_command_resets_game() {
        let mut game = Game::new(ShakmatyPosition::starting());
        let command = game
            .handle_input("fen 4k3/8/8/8/8/8/8/4K2R w K - 0 1")
            .unwrap();
        assert!(matches!(command, Some(LinkCommand::SyncToPosition(_))));
        assert!(game.handle_input("e1g1").is_ok());
    }
}
