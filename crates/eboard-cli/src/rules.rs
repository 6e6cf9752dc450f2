//! shakmaty-backed rules engine

use eboard_core::{BoardMove, ChessPosition, LinkError, Placement, Result};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Move, Position};

/// A game position with legal moves from shakmaty
#[derive(Debug, Clone, Default)]
pub struct ShakmatyPosition(Chess);

impl ShakmatyPosition {
    pub fn starting() -> Self {
        Self(Chess::default())
    }

    /// Parse a full FEN
    pub fn from_fen(fen: &str) -> Result<Self> {
        let fen = Fen::from_ascii(fen.trim().as_bytes())
            .map_err(|e| LinkError::InvalidPlacement(format!("{}: {}", fen, e)))?;
        let position: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| LinkError::InvalidPlacement(e.to_string()))?;
        Ok(Self(position))
    }

    pub fn is_game_over(&self) -> bool {
        self.0.is_game_over()
    }

    fn find(&self, mv: &BoardMove) -> Option<Move> {
        let uci = mv.to_uci();
        self.0
            .legal_moves()
            .into_iter()
            .find(|m| m.to_uci(CastlingMode::Standard).to_string() == uci)
    }
}

fn board_move(m: &Move) -> Option<BoardMove> {
    let mv = BoardMove::from_uci(&m.to_uci(CastlingMode::Standard).to_string()).ok()?;
    Some(if m.is_capture() { mv.with_capture() } else { mv })
}

impl ChessPosition for ShakmatyPosition {
    fn legal_moves(&self) -> Vec<BoardMove> {
        self.0.legal_moves().iter().filter_map(board_move).collect()
    }

    fn play(&self, mv: &BoardMove) -> Option<Self> {
        let m = self.find(mv)?;
        self.0.clone().play(m).ok().map(Self)
    }

    fn placement(&self) -> Placement {
        Placement::from_board_fen(&self.0.board().to_string()).unwrap_or_default()
    }
}
