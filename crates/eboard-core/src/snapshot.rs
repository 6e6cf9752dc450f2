//! Sensor snapshots and sensor gaps

use crate::piece::{EMPTY, OCCUPIED, Piece, Placement};
use crate::square::{SQUARE_COUNT, Square};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the board's sensors can tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardKind {
    /// Reports the color and type of each piece
    PieceIdentifying,
    /// Reports only whether a square is occupied
    OccupancyOnly,
}

/// Capability flags of the connected board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardCapabilities {
    pub kind: BoardKind,
    /// Board has addressable per-square LEDs
    pub leds: bool,
}

impl BoardCapabilities {
    pub fn new(kind: BoardKind, leds: bool) -> Self {
        Self { kind, leds }
    }
}

/// Set of squares whose sensors are unreliable on the connected unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorGaps(u64);

impl SensorGaps {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, sq: Square) {
        self.0 |= 1 << sq.index();
    }

    pub fn contains(&self, sq: Square) -> bool {
        self.0 & (1 << sq.index()) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = Square> + '_ {
        Square::all().filter(move |sq| self.contains(*sq))
    }
}

impl FromIterator<Square> for SensorGaps {
    fn from_iter<I: IntoIterator<Item = Square>>(iter: I) -> Self {
        let mut gaps = SensorGaps::new();
        for sq in iter {
            gaps.insert(sq);
        }
        gaps
    }
}

/// One 64-cell reading of the physical board in wire order
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoardSnapshot([u8; SQUARE_COUNT]);

impl Default for BoardSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoardSnapshot {
    /// All cells empty
    pub fn empty() -> Self {
        Self([EMPTY; SQUARE_COUNT])
    }

    pub fn from_cells(cells: [u8; SQUARE_COUNT]) -> Self {
        Self(cells)
    }

    /// Snapshot from a payload slice, `None` unless exactly 64 bytes
    pub fn from_slice(cells: &[u8]) -> Option<Self> {
        cells.try_into().ok().map(Self)
    }

    /// Encode a placement the way a board of the given kind reports it
    pub fn encode(placement: &Placement, kind: BoardKind) -> Self {
        let mut cells = [EMPTY; SQUARE_COUNT];
        for (cell, piece) in cells.iter_mut().zip(placement.cells()) {
            *cell = match (piece, kind) {
                (None, _) => EMPTY,
                (Some(p), BoardKind::PieceIdentifying) => p.code(),
                (Some(_), BoardKind::OccupancyOnly) => OCCUPIED,
            };
        }
        Self(cells)
    }

    pub fn cells(&self) -> &[u8; SQUARE_COUNT] {
        &self.0
    }

    pub fn get(&self, sq: Square) -> u8 {
        self.0[sq.index()]
    }

    pub fn set(&mut self, sq: Square, code: u8) {
        self.0[sq.index()] = code;
    }

    pub fn is_occupied(&self, sq: Square) -> bool {
        self.0[sq.index()] != EMPTY
    }

    /// Piece on a square, for piece-identifying boards
    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        Piece::from_code(self.0[sq.index()])
    }

    /// Number of occupied cells
    pub fn piece_count(&self) -> usize {
        self.0.iter().filter(|&&c| c != EMPTY).count()
    }

    /// Squares that differ from `other`, skipping sensor gaps
    pub fn diff(&self, other: &BoardSnapshot, gaps: &SensorGaps) -> Vec<Square> {
        Square::all()
            .filter(|sq| !gaps.contains(*sq) && self.get(*sq) != other.get(*sq))
            .collect()
    }

    /// Equality ignoring sensor gaps
    pub fn matches(&self, other: &BoardSnapshot, gaps: &SensorGaps) -> bool {
        Square::all().all(|sq| gaps.contains(sq) || self.get(sq) == other.get(sq))
    }

    /// Whether occupancy equals the starting layout (ranks 1-2 and 7-8 full), skipping gaps
    pub fn is_starting_layout(&self, gaps: &SensorGaps) -> bool {
        Square::all().all(|sq| {
            let expected = matches!(sq.rank(), 0 | 1 | 6 | 7);
            gaps.contains(sq) || self.is_occupied(sq) == expected
        })
    }
}

impl fmt::Debug for BoardSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BoardSnapshot [")?;
        for row in self.0.chunks(8) {
            let line: Vec<String> = row.iter().map(|c| format!("{:02x}", c)).collect();
            writeln!(f, "  {}", line.join(" "))?;
        }
        write!(f, "]")
    }
}
