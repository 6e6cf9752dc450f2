//! Rules engine seam
//!
//! Legal-move generation and move simulation live outside this workspace.
//! Anything that can enumerate legal moves and play one of them can drive
//! move detection.

use crate::moves::BoardMove;
use crate::piece::Placement;

/// An authoritative game position supplied by an external rules engine
pub trait ChessPosition: Clone + Send + 'static {
    /// Legal moves in this position. Castling is reported as the king's hop.
    fn legal_moves(&self) -> Vec<BoardMove>;

    /// Position after playing `mv`, or `None` if it is not legal here
    fn play(&self, mv: &BoardMove) -> Option<Self>;

    /// Piece placement of this position
    fn placement(&self) -> Placement;
}
