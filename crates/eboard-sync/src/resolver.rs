//! Move resolution
//!
//! Turns the transition between two settled snapshots into a legal move.
//! Every legal move of the authoritative position is played out, encoded the
//! way the connected board would report the result, and compared with what
//! the sensors actually show. Occupancy-only boards can leave several
//! candidates standing; those are narrowed down with what the sensors saw
//! change.

use eboard_core::{BoardKind, BoardMove, BoardSnapshot, ChessPosition, Piece, Role, SensorGaps};
use tracing::debug;

/// What a settled snapshot means for the game
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one legal move explains the board
    Move(BoardMove),
    /// No legal move explains the board yet (mid-move, or nothing changed)
    NoMove,
    /// Several candidates remain; wait for the next settled snapshot
    Ambiguous(Vec<BoardMove>),
    /// Too many squares changed for a single move
    OutOfSync { differing: usize },
}

/// Move resolution against the last stable snapshot
#[derive(Debug)]
pub struct MoveResolver {
    kind: BoardKind,
    max_diff: usize,
    last_stable: BoardSnapshot,
}

impl MoveResolver {
    pub fn new(kind: BoardKind, max_diff: usize) -> Self {
        Self {
            kind,
            max_diff,
            last_stable: BoardSnapshot::empty(),
        }
    }

    /// Snapshot the next move is measured from
    pub fn last_stable(&self) -> &BoardSnapshot {
        &self.last_stable
    }

    /// Start measuring from `snapshot`, e.g. after a sync
    pub fn rebase(&mut self, snapshot: BoardSnapshot) {
        self.last_stable = snapshot;
    }

    /// Squares that changed since the last stable snapshot
    pub fn differing(&self, current: &BoardSnapshot, gaps: &SensorGaps) -> usize {
        self.last_stable.diff(current, gaps).len()
    }

    /// Resolve `current` against the legal moves of `position`.
    ///
    /// On a detected move the last stable snapshot becomes `current`, so
    /// resolving the same snapshot again yields `NoMove`.
    pub fn resolve<P: ChessPosition>(
        &mut self,
        position: &P,
        current: &BoardSnapshot,
        gaps: &SensorGaps,
    ) -> Resolution {
        let differing = self.differing(current, gaps);
        if differing > self.max_diff {
            return Resolution::OutOfSync { differing };
        }
        if differing == 0 {
            return Resolution::NoMove;
        }

        let candidates: Vec<BoardMove> = position
            .legal_moves()
            .into_iter()
            .filter(|mv| {
                position.play(mv).is_some_and(|next| {
                    BoardSnapshot::encode(&next.placement(), self.kind).matches(current, gaps)
                })
            })
            .collect();

        let detected = match candidates.as_slice() {
            [] => return Resolution::NoMove,
            [only] => *only,
            _ => match disambiguate(&candidates, &self.last_stable, current, self.kind) {
                Some(mv) => mv,
                None => {
                    debug!("Ambiguous board change, {} candidates", candidates.len());
                    return Resolution::Ambiguous(candidates);
                }
            },
        };
        self.last_stable = *current;
        Resolution::Move(detected)
    }
}

/// Pick one of several candidates that all explain the current snapshot.
///
/// Candidates that share from/to differ only in promotion: a
/// piece-identifying board tells us the promoted piece, otherwise it is a
/// queen. Candidates with different squares are narrowed to the one whose
/// source square went from occupied to empty. `None` means guessing would be
/// needed.
pub fn disambiguate(
    candidates: &[BoardMove],
    previous: &BoardSnapshot,
    current: &BoardSnapshot,
    kind: BoardKind,
) -> Option<BoardMove> {
    let first = candidates.first()?;
    if candidates.iter().all(|mv| mv.same_squares(first)) {
        return pick_promotion(candidates, current, kind);
    }

    let vacated: Vec<BoardMove> = candidates
        .iter()
        .filter(|mv| previous.is_occupied(mv.from) && !current.is_occupied(mv.from))
        .copied()
        .collect();
    match vacated.as_slice() {
        [] => None,
        [only] => Some(*only),
        [first, ..] if vacated.iter().all(|mv| mv.same_squares(first)) => {
            pick_promotion(&vacated, current, kind)
        }
        _ => None,
    }
}

fn pick_promotion(candidates: &[BoardMove], current: &BoardSnapshot, kind: BoardKind) -> Option<BoardMove> {
    let first = candidates.first()?;
    let role = match kind {
        BoardKind::PieceIdentifying => Piece::from_code(current.get(first.to))?.role,
        BoardKind::OccupancyOnly => Role::Queen,
    };
    candidates.iter().copied().find(|mv| mv.promotion == Some(role))
}
