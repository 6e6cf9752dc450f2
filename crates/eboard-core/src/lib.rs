//! # eboard-core
//!
//! Core types for linking a sensor-equipped chessboard to a chess application.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - Square addressing in the boards' wire order
//! - Piece codes and piece placement
//! - Sensor snapshots and sensor gaps
//! - Moves and guidance moves
//! - The rules-engine seam (`ChessPosition`)
//! - Outbound events and errors

pub mod error;
pub mod event;
pub mod moves;
pub mod piece;
pub mod position;
pub mod snapshot;
pub mod square;

pub use error::{LinkError, Result};
pub use event::{ConnectionState, LinkEvent};
pub use moves::{BoardMove, GuidanceMove, GuidancePhase};
pub use piece::{Color, EMPTY, OCCUPIED, Piece, Placement, Role, STARTING_BOARD_FEN};
pub use position::ChessPosition;
pub use snapshot::{BoardCapabilities, BoardKind, BoardSnapshot, SensorGaps};
pub use square::{SQUARE_COUNT, Square};
