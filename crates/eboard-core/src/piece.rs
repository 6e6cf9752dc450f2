//! Pieces, wire piece codes and piece placement

use crate::error::{LinkError, Result};
use crate::square::{SQUARE_COUNT, Square};
use serde::{Deserialize, Serialize};

/// Wire code for an empty cell
pub const EMPTY: u8 = 0x00;

/// Wire code for an occupied cell on occupancy-only boards
pub const OCCUPIED: u8 = 0x01;

/// Piece-placement field of the standard starting position
pub const STARTING_BOARD_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";

/// Piece color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

/// Piece type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Pawn,
    Rook,
    Knight,
    Bishop,
    King,
    Queen,
}

impl Role {
    /// Lowercase letter used in FEN and UCI
    pub fn char(self) -> char {
        match self {
            Role::Pawn => 'p',
            Role::Rook => 'r',
            Role::Knight => 'n',
            Role::Bishop => 'b',
            Role::King => 'k',
            Role::Queen => 'q',
        }
    }

    /// Role from a FEN/UCI letter (either case)
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'p' => Some(Role::Pawn),
            'r' => Some(Role::Rook),
            'n' => Some(Role::Knight),
            'b' => Some(Role::Bishop),
            'k' => Some(Role::King),
            'q' => Some(Role::Queen),
            _ => None,
        }
    }

    // Wire order within one color: pawn, rook, knight, bishop, king, queen
    fn ordinal(self) -> u8 {
        match self {
            Role::Pawn => 0,
            Role::Rook => 1,
            Role::Knight => 2,
            Role::Bishop => 3,
            Role::King => 4,
            Role::Queen => 5,
        }
    }
}

/// A colored piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub color: Color,
    pub role: Role,
}

impl Piece {
    pub fn new(color: Color, role: Role) -> Self {
        Self { color, role }
    }

    /// Wire code on piece-identifying boards (0x01-0x06 white, 0x07-0x0C black)
    pub fn code(self) -> u8 {
        let base = match self.color {
            Color::White => 0x01,
            Color::Black => 0x07,
        };
        base + self.role.ordinal()
    }

    /// Piece from a wire code, `None` for empty or unknown codes
    pub fn from_code(code: u8) -> Option<Self> {
        const ROLES: [Role; 6] = [
            Role::Pawn,
            Role::Rook,
            Role::Knight,
            Role::Bishop,
            Role::King,
            Role::Queen,
        ];
        match code {
            0x01..=0x06 => Some(Piece::new(Color::White, ROLES[(code - 0x01) as usize])),
            0x07..=0x0C => Some(Piece::new(Color::Black, ROLES[(code - 0x07) as usize])),
            _ => None,
        }
    }

    /// FEN letter (uppercase for white)
    pub fn fen_char(self) -> char {
        match self.color {
            Color::White => self.role.char().to_ascii_uppercase(),
            Color::Black => self.role.char(),
        }
    }
}

/// Piece placement of a position, indexed by wire order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    cells: [Option<Piece>; SQUARE_COUNT],
}

impl Default for Placement {
    fn default() -> Self {
        Self::empty()
    }
}

impl Placement {
    /// Placement with no pieces
    pub fn empty() -> Self {
        Self {
            cells: [None; SQUARE_COUNT],
        }
    }

    /// The standard starting position
    pub fn starting() -> Self {
        // The constant is well-formed, parsing cannot fail
        Self::from_board_fen(STARTING_BOARD_FEN).unwrap_or_default()
    }

    /// Parse the piece-placement field of a FEN string.
    ///
    /// A full FEN is accepted too; everything after the first space is ignored.
    pub fn from_board_fen(fen: &str) -> Result<Self> {
        let board = fen.split_whitespace().next().unwrap_or("");
        let ranks: Vec<&str> = board.split('/').collect();
        if ranks.len() != 8 {
            return Err(LinkError::InvalidPlacement(format!(
                "expected 8 ranks, got {}",
                ranks.len()
            )));
        }

        let mut placement = Self::empty();
        // FEN lists rank 8 first, same as the wire order
        for (row, rank) in ranks.iter().enumerate() {
            let mut col = 0usize;
            for c in rank.chars() {
                if let Some(skip) = c.to_digit(10) {
                    if !(1..=8).contains(&skip) {
                        return Err(LinkError::InvalidPlacement(format!(
                            "bad empty run '{}' in rank {}",
                            c,
                            8 - row
                        )));
                    }
                    col += skip as usize;
                } else {
                    let role = Role::from_char(c).ok_or_else(|| {
                        LinkError::InvalidPlacement(format!("unknown piece '{}'", c))
                    })?;
                    let color = if c.is_ascii_uppercase() {
                        Color::White
                    } else {
                        Color::Black
                    };
                    if col >= 8 {
                        return Err(LinkError::InvalidPlacement(format!(
                            "rank {} is too long",
                            8 - row
                        )));
                    }
                    placement.cells[row * 8 + col] = Some(Piece::new(color, role));
                    col += 1;
                }
            }
            if col != 8 {
                return Err(LinkError::InvalidPlacement(format!(
                    "rank {} has {} files",
                    8 - row,
                    col
                )));
            }
        }
        Ok(placement)
    }

    /// Piece-placement field in FEN notation
    pub fn to_board_fen(&self) -> String {
        let mut out = String::with_capacity(72);
        for row in 0..8 {
            let mut run = 0;
            for col in 0..8 {
                match self.cells[row * 8 + col] {
                    Some(piece) => {
                        if run > 0 {
                            out.push(char::from(b'0' + run));
                            run = 0;
                        }
                        out.push(piece.fen_char());
                    }
                    None => run += 1,
                }
            }
            if run > 0 {
                out.push(char::from(b'0' + run));
            }
            if row < 7 {
                out.push('/');
            }
        }
        out
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.cells[sq.index()]
    }

    pub fn set(&mut self, sq: Square, piece: Option<Piece>) {
        self.cells[sq.index()] = piece;
    }

    /// Remove and return the piece on a square
    pub fn take(&mut self, sq: Square) -> Option<Piece> {
        self.cells[sq.index()].take()
    }

    /// Cells in wire order
    pub fn cells(&self) -> &[Option<Piece>; SQUARE_COUNT] {
        &self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_codes() {
        assert_eq!(Piece::new(Color::White, Role::Pawn).code(), 0x01);
        assert_eq!(Piece::new(Color::White, Role::Queen).code(), 0x06);
        assert_eq!(Piece::new(Color::Black, Role::Pawn).code(), 0x07);
        assert_eq!(Piece::new(Color::Black, Role::King).code(), 0x0B);
        assert_eq!(Piece::new(Color::Black, Role::Queen).code(), 0x0C);

        for code in 0x01..=0x0C {
            assert_eq!(Piece::from_code(code).unwrap().code(), code);
        }
        assert_eq!(Piece::from_code(EMPTY), None);
        assert_eq!(Piece::from_code(0x0D), None);
    }

    #[test]
    fn test_starting_placement() {
        let start = Placement::starting();
        let e1: Square = "e1".parse().unwrap();
        let d8: Square = "d8".parse().unwrap();
        assert_eq!(start.piece_at(e1), Some(Piece::new(Color::White, Role::King)));
        assert_eq!(start.piece_at(d8), Some(Piece::new(Color::Black, Role::Queen)));
        assert_eq!(start.cells().iter().filter(|c| c.is_some()).count(), 32);
        assert_eq!(start.to_board_fen(), STARTING_BOARD_FEN);
    }

    #[test]
    fn test_full_fen_accepted() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        let placement = Placement::from_board_fen(fen).unwrap();
        assert_eq!(
            placement.to_board_fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR"
        );
    }

    #[test]
    fn test_invalid_fen() {
        assert!(Placement::from_board_fen("8/8/8").is_err());
        assert!(Placement::from_board_fen("9/8/8/8/8/8/8/8").is_err());
        assert!(Placement::from_board_fen("rnbqkbnrr/8/8/8/8/8/8/8").is_err());
        assert!(Placement::from_board_fen("x7/8/8/8/8/8/8/8").is_err());
        assert!(Placement::from_board_fen("7/8/8/8/8/8/8/8").is_err());
    }
}
