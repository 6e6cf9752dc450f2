//! Scripted positions for tests
//!
//! `ScriptedPosition` stands in for a rules engine: legal moves come from a
//! hand-written script, one list per ply, and playing a move relocates the
//! pieces on the placement.

use eboard_core::{BoardMove, ChessPosition, Piece, Placement, Role, Square};

#[derive(Debug, Clone)]
pub struct ScriptedPosition {
    placement: Placement,
    script: Vec<Vec<BoardMove>>,
}

impl ScriptedPosition {
    /// `script[0]` is legal now, `script[1]` after one move, and so on
    pub fn new(placement: Placement, script: Vec<Vec<BoardMove>>) -> Self {
        Self { placement, script }
    }

    pub fn from_fen(fen: &str, script: Vec<Vec<BoardMove>>) -> Self {
        Self::new(Placement::from_board_fen(fen).unwrap(), script)
    }

    pub fn starting(script: Vec<Vec<BoardMove>>) -> Self {
        Self::new(Placement::starting(), script)
    }
}

/// Square from file/rank of the given squares
fn at(file_of: Square, rank_of: Square) -> Square {
    Square::from_coords(file_of.file(), rank_of.rank()).unwrap()
}

impl ChessPosition for ScriptedPosition {
    fn legal_moves(&self) -> Vec<BoardMove> {
        self.script.first().cloned().unwrap_or_default()
    }

    fn play(&self, mv: &BoardMove) -> Option<Self> {
        if !self.legal_moves().iter().any(|m| m.same_action(mv)) {
            return None;
        }
        let mut placement = self.placement.clone();
        let piece = placement.take(mv.from)?;

        if piece.role == Role::King && mv.file_distance() == 2 {
            let (rook_from, rook_to) = if mv.to.file() > mv.from.file() {
                (Square::from_coords(7, mv.from.rank())?, Square::from_coords(5, mv.from.rank())?)
            } else {
                (Square::from_coords(0, mv.from.rank())?, Square::from_coords(3, mv.from.rank())?)
            };
            let rook = placement.take(rook_from);
            placement.set(rook_to, rook);
        }
        if piece.role == Role::Pawn
            && mv.from.file() != mv.to.file()
            && placement.piece_at(mv.to).is_none()
        {
            placement.take(at(mv.to, mv.from));
        }
        let landed = match mv.promotion {
            Some(role) => Piece::new(piece.color, role),
            None => piece,
        };
        placement.set(mv.to, Some(landed));

        Some(Self {
            placement,
            script: self.script.iter().skip(1).cloned().collect(),
        })
    }

    fn placement(&self) -> Placement {
        self.placement.clone()
    }
}

pub fn sq(name: &str) -> Square {
    name.parse().unwrap()
}

pub fn mv(uci: &str) -> BoardMove {
    BoardMove::from_uci(uci).unwrap()
}

/// The twenty legal first moves for White
pub fn opening_moves() -> Vec<BoardMove> {
    let mut moves: Vec<BoardMove> = "abcdefgh"
        .chars()
        .flat_map(|f| [format!("{f}2{f}3"), format!("{f}2{f}4")])
        .map(|uci| mv(&uci))
        .collect();
    moves.extend(["b1a3", "b1c3", "g1f3", "g1h3"].map(mv));
    moves
}
