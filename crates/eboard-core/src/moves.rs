//! Moves, UCI text and guidance moves

use crate::error::{LinkError, Result};
use crate::piece::Role;
use crate::square::Square;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A chess move in board coordinates.
///
/// Castling is expressed as the king's two-file hop (e1g1, e8c8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardMove {
    pub from: Square,
    pub to: Square,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<Role>,
    #[serde(default)]
    pub capture: bool,
}

impl BoardMove {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
            capture: false,
        }
    }

    pub fn with_promotion(mut self, role: Role) -> Self {
        self.promotion = Some(role);
        self
    }

    pub fn with_capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Same squares, ignoring promotion and capture flag
    pub fn same_squares(&self, other: &BoardMove) -> bool {
        self.from == other.from && self.to == other.to
    }

    /// Same squares and promotion, ignoring the capture flag
    pub fn same_action(&self, other: &BoardMove) -> bool {
        self.same_squares(other) && self.promotion == other.promotion
    }

    /// Number of files the piece travels
    pub fn file_distance(&self) -> u8 {
        self.from.file().abs_diff(self.to.file())
    }

    /// Parse UCI text such as `e2e4` or `e7e8q`
    pub fn from_uci(text: &str) -> Result<Self> {
        let text = text.trim();
        if !text.is_ascii() || !(4..=5).contains(&text.len()) {
            return Err(LinkError::InvalidMove(text.to_string()));
        }
        let from: Square = text[0..2]
            .parse()
            .map_err(|_| LinkError::InvalidMove(text.to_string()))?;
        let to: Square = text[2..4]
            .parse()
            .map_err(|_| LinkError::InvalidMove(text.to_string()))?;
        let mut mv = BoardMove::new(from, to);
        if let Some(c) = text[4..].chars().next() {
            match Role::from_char(c) {
                Some(role) if !matches!(role, Role::Pawn | Role::King) => {
                    mv.promotion = Some(role);
                }
                _ => return Err(LinkError::InvalidMove(text.to_string())),
            }
        }
        Ok(mv)
    }

    /// UCI text for this move
    pub fn to_uci(&self) -> String {
        let mut s = format!("{}{}", self.from, self.to);
        if let Some(role) = self.promotion {
            s.push(role.char());
        }
        s
    }
}

impl fmt::Display for BoardMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci())
    }
}

impl FromStr for BoardMove {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        BoardMove::from_uci(s)
    }
}

/// LED sub-state of a guidance move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuidancePhase {
    /// Waiting for the piece to be lifted from the source square
    From,
    /// Waiting for the piece to be placed on the destination square
    To,
    /// Not sequenced (castling animation)
    None,
}

/// A move made in software that the user still has to replay on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidanceMove {
    pub mv: BoardMove,
    pub phase: GuidancePhase,
}

impl GuidanceMove {
    pub fn new(mv: BoardMove) -> Self {
        Self {
            mv,
            phase: GuidancePhase::From,
        }
    }
}
