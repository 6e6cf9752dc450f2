//! Board transports and wire protocol
//!
//! This crate provides:
//! - Framing and decoding of the board's binary protocol, and LED commands
//! - The JSON model of the vendor's WebSocket bridge
//! - The `Transport` trait and its serial, BLE, WebSocket and in-memory
//!   implementations

pub mod ble;
pub mod memory;
pub mod network;
pub mod protocol;
pub mod serial;
pub mod socket;
pub mod transport;

pub use ble::{BleBackend, BleTransport, BtleplugBackend};
pub use memory::{MemoryBoard, MemoryTransport, memory_pair};
pub use network::{NetworkCall, NetworkEvent, parse_event};
pub use protocol::{BlinkMode, BoardMessage, Framer, LedCommand, encode_frame, hex_preview};
pub use serial::SerialTransport;
pub use socket::SocketTransport;
pub use transport::{
    StateCell, Transport, TransportConfig, TransportEvent, TransportKind, build_transport,
};
