//! Events reported to the orchestrator

use crate::moves::BoardMove;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of the active transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting…",
            ConnectionState::Authenticating => "Authenticating…",
            ConnectionState::Connected => "Connected",
        };
        f.write_str(text)
    }
}

/// Everything the board link tells the application, on one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkEvent {
    /// Board connected or disconnected
    ConnectionChanged { connected: bool },
    /// Human-readable status line
    StatusChanged { text: String },
    /// A move was played on the physical board
    MoveDetected { mv: BoardMove },
    /// Board has been set up in the starting layout and left alone
    StartingPositionDetected,
}

impl LinkEvent {
    pub fn status(text: impl Into<String>) -> Self {
        LinkEvent::StatusChanged { text: text.into() }
    }
}
