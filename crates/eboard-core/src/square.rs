//! Square addressing
//!
//! Boards report cells in row-major order starting from the top-left corner
//! as seen from White: index 0 is a8, index 7 is h8, index 56 is a1 and
//! index 63 is h1.

use crate::error::LinkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of cells on the board
pub const SQUARE_COUNT: usize = 64;

/// A board square, stored as its wire index (0 = a8, 63 = h1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Square(u8);

impl Square {
    /// Square from a wire index, `None` when out of range
    pub fn from_index(index: usize) -> Option<Self> {
        (index < SQUARE_COUNT).then_some(Square(index as u8))
    }

    /// Square from zero-based file (a = 0) and rank (rank 1 = 0)
    pub fn from_coords(file: u8, rank: u8) -> Option<Self> {
        if file < 8 && rank < 8 {
            Some(Square((7 - rank) * 8 + file))
        } else {
            None
        }
    }

    /// Wire index (0 = a8, 63 = h1)
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Zero-based file, a = 0
    pub fn file(self) -> u8 {
        self.0 % 8
    }

    /// Zero-based rank, rank 1 = 0
    pub fn rank(self) -> u8 {
        7 - self.0 / 8
    }

    /// All 64 squares in wire order
    pub fn all() -> impl Iterator<Item = Square> {
        (0..SQUARE_COUNT as u8).map(Square)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = (b'a' + self.file()) as char;
        let rank = (b'1' + self.rank()) as char;
        write!(f, "{}{}", file, rank)
    }
}

impl FromStr for Square {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            [file @ b'a'..=b'h', rank @ b'1'..=b'8'] => {
                Square::from_coords(file - b'a', rank - b'1')
                    .ok_or_else(|| LinkError::InvalidSquare(s.to_string()))
            }
            _ => Err(LinkError::InvalidSquare(s.to_string())),
        }
    }
}

impl TryFrom<String> for Square {
    type Error = LinkError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Square> for String {
    fn from(sq: Square) -> Self {
        sq.to_string()
    }
}
