//! Error types for the board link

use std::time::Duration;
use thiserror::Error;

/// Result type for board link operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Board link error types
#[derive(Debug, Error)]
pub enum LinkError {
    /// Host lacks the API or hardware the transport needs
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// User cancelled the device picker, or no device was found
    #[error("No device selected")]
    DeviceNotSelected,

    /// Transport opened but the board never answered the handshake
    #[error("Connection timeout: no response within {0:?}")]
    ConnectionTimeout(Duration),

    /// Read/write failure on an open transport
    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed message from the board or vendor service
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Square name or index out of range
    #[error("Invalid square: {0}")]
    InvalidSquare(String),

    /// Piece placement string could not be parsed
    #[error("Invalid placement: {0}")]
    InvalidPlacement(String),

    /// Move text could not be parsed
    #[error("Invalid move: {0}")]
    InvalidMove(String),

    /// Operation needs an open transport
    #[error("Not connected")]
    NotConnected,
}

impl LinkError {
    /// Status text shown to the user for this error
    pub fn status_text(&self) -> String {
        match self {
            LinkError::TransportUnavailable(what) => format!("Not supported on this device: {}", what),
            LinkError::DeviceNotSelected => "No board selected".to_string(),
            LinkError::ConnectionTimeout(_) => {
                "Board did not respond. Check it is switched on and try again".to_string()
            }
            LinkError::NotConnected => "Disconnected".to_string(),
            other => format!("Connection error: {}", other),
        }
    }

    /// Whether the user may reasonably retry the connect attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, LinkError::ConnectionTimeout(_) | LinkError::Io(_))
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}
