//! Binary wire protocol for serial and BLE boards
//!
//! Board-originated frames:
//! ```text
//! +------+-----------+-----------+------------------+
//! | type | len[13:7] | len[6:0]  | payload (len-3)  |
//! +------+-----------+-----------+------------------+
//! ```
//! The type byte has bit 7 set, both length bytes have bit 7 clear, and the
//! length counts the three header bytes. Host commands are single bytes,
//! except the LED command which carries its own length byte.

use eboard_core::{BoardSnapshot, SQUARE_COUNT, Square};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Board-originated message ids
pub mod message_id {
    /// Full board dump, 64 cells
    pub const BOARD_DUMP: u8 = 0x86;
    /// Single-square update: index, code
    pub const FIELD_UPDATE: u8 = 0x8E;
    /// Serial number, ASCII
    pub const SERIAL_NUMBER: u8 = 0x91;
    /// Firmware version: major, minor
    pub const VERSION: u8 = 0x93;
}

/// Host command bytes
pub mod command {
    pub const RESET: u8 = 0x40;
    pub const REQUEST_BOARD: u8 = 0x42;
    pub const ENABLE_UPDATES: u8 = 0x44;
    pub const REQUEST_SERIAL: u8 = 0x45;
    pub const REQUEST_VERSION: u8 = 0x4D;
    pub const LED: u8 = 0x60;
    /// LED sub-opcode for lighting a list of squares
    pub const LED_SQUARES: u8 = 0x05;
}

/// Header size in bytes
pub const HEADER_LEN: usize = 3;

/// Frames of unrecognized types longer than this are treated as noise
pub const MAX_UNKNOWN_FRAME_LEN: usize = 128;

/// Receive buffer is trimmed from the front beyond this size
const MAX_BUFFERED: usize = 4096;

/// A decoded board message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardMessage {
    /// Full 64-cell dump
    BoardDump(BoardSnapshot),
    /// One cell changed
    FieldUpdate { square: Square, code: u8 },
    /// Serial number response
    SerialNumber(String),
    /// Firmware version response
    Version { major: u8, minor: u8 },
    /// Well-formed frame of a type we do not interpret
    Unknown { id: u8, payload: Vec<u8> },
}

/// Expected total frame length for known message ids
fn expected_len(id: u8) -> Option<usize> {
    match id {
        message_id::BOARD_DUMP => Some(HEADER_LEN + SQUARE_COUNT),
        message_id::FIELD_UPDATE => Some(HEADER_LEN + 2),
        message_id::VERSION => Some(HEADER_LEN + 2),
        _ => None,
    }
}

/// Encode a board-originated frame (used by loopback boards and tests)
pub fn encode_frame(id: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() + HEADER_LEN;
    let mut frame = Vec::with_capacity(len);
    frame.push(id | 0x80);
    frame.push(((len >> 7) & 0x7F) as u8);
    frame.push((len & 0x7F) as u8);
    frame.extend_from_slice(payload);
    frame
}

/// Incremental frame parser over an append-only receive buffer.
///
/// Never blocks: a partial frame stays buffered until more bytes arrive.
#[derive(Debug, Default)]
pub struct Framer {
    buffer: Vec<u8>,
    discarded: usize,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_BUFFERED {
            let excess = self.buffer.len() - MAX_BUFFERED;
            self.buffer.drain(..excess);
            self.discarded += excess;
        }
    }

    /// Append bytes and decode every complete frame now available
    pub fn feed(&mut self, data: &[u8]) -> Vec<BoardMessage> {
        self.push(data);
        std::iter::from_fn(|| self.next_message()).collect()
    }

    /// Decode the next complete frame, if any.
    ///
    /// Bytes that cannot start a valid header are dropped one at a time.
    pub fn next_message(&mut self) -> Option<BoardMessage> {
        loop {
            let &id = self.buffer.first()?;
            if id & 0x80 == 0 {
                self.skip_byte();
                continue;
            }

            match self.buffer.get(1) {
                None => return None,
                Some(b) if b & 0x80 != 0 => {
                    self.skip_byte();
                    continue;
                }
                Some(_) => {}
            }
            let &lo = self.buffer.get(2)?;
            if lo & 0x80 != 0 {
                self.skip_byte();
                continue;
            }

            let len = ((self.buffer[1] as usize) << 7) | lo as usize;
            let plausible = match expected_len(id) {
                Some(expected) => len == expected,
                None if id == message_id::SERIAL_NUMBER => {
                    (HEADER_LEN..=HEADER_LEN + 32).contains(&len)
                }
                None => (HEADER_LEN..=MAX_UNKNOWN_FRAME_LEN).contains(&len),
            };
            if !plausible {
                self.skip_byte();
                continue;
            }

            if self.buffer.len() < len {
                return None;
            }

            let frame: Vec<u8> = self.buffer.drain(..len).collect();
            match decode(id, &frame[HEADER_LEN..]) {
                Some(msg) => return Some(msg),
                None => {
                    debug!("Dropping undecodable frame 0x{:02x}: {}", id, hex_preview(&frame));
                    continue;
                }
            }
        }
    }

    /// Bytes waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes discarded as noise
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarded = 0;
    }

    fn skip_byte(&mut self) {
        self.buffer.remove(0);
        self.discarded += 1;
    }
}

fn decode(id: u8, payload: &[u8]) -> Option<BoardMessage> {
    Some(match id {
        message_id::BOARD_DUMP => BoardMessage::BoardDump(BoardSnapshot::from_slice(payload)?),
        message_id::FIELD_UPDATE => BoardMessage::FieldUpdate {
            square: Square::from_index(payload[0] as usize)?,
            code: payload[1],
        },
        message_id::SERIAL_NUMBER => {
            let text = String::from_utf8_lossy(payload);
            BoardMessage::SerialNumber(text.trim_end_matches('\0').trim().to_string())
        }
        message_id::VERSION => BoardMessage::Version {
            major: payload[0],
            minor: payload[1],
        },
        _ => BoardMessage::Unknown {
            id,
            payload: payload.to_vec(),
        },
    })
}

/// LED blink mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlinkMode {
    Continuous,
    SingleFlash,
}

impl BlinkMode {
    fn wire(self) -> u8 {
        match self {
            BlinkMode::Continuous => 0,
            BlinkMode::SingleFlash => 1,
        }
    }
}

/// An LED instruction for boards with addressable lighting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedCommand {
    /// Light exactly these squares
    Light {
        squares: Vec<Square>,
        mode: BlinkMode,
    },
    /// All LEDs off
    Off,
}

impl LedCommand {
    pub fn light(squares: impl IntoIterator<Item = Square>) -> Self {
        LedCommand::Light {
            squares: squares.into_iter().collect(),
            mode: BlinkMode::Continuous,
        }
    }

    /// Wire bytes for this instruction
    pub fn encode(&self, speed: u8, intensity: u8) -> Vec<u8> {
        match self {
            LedCommand::Light { squares, mode } if !squares.is_empty() => {
                led_on(squares, *mode, speed, intensity)
            }
            _ => led_off(),
        }
    }
}

/// LED command lighting `squares`: 0x60, len, 0x05, speed, mode, intensity, squares.., 0x00
pub fn led_on(squares: &[Square], mode: BlinkMode, speed: u8, intensity: u8) -> Vec<u8> {
    let mut cmd = Vec::with_capacity(squares.len() + 7);
    cmd.push(command::LED);
    cmd.push((squares.len() + 5) as u8);
    cmd.push(command::LED_SQUARES);
    cmd.push(speed);
    cmd.push(mode.wire());
    cmd.push(intensity);
    cmd.extend(squares.iter().map(|sq| sq.index() as u8));
    cmd.push(0x00);
    cmd
}

/// LED command switching everything off
pub fn led_off() -> Vec<u8> {
    vec![command::LED, 0x02, 0x00, 0x00]
}

/// Short hex dump for logs
pub fn hex_preview(data: &[u8]) -> String {
    let shown: Vec<String> = data.iter().take(24).map(|b| format!("{:02x}", b)).collect();
    if data.len() > 24 {
        format!("{} … (+{} bytes)", shown.join(" "), data.len() - 24)
    } else {
        shown.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dump_frame(cells: &[u8; 64]) -> Vec<u8> {
        encode_frame(message_id::BOARD_DUMP, cells)
    }

    #[test]
    fn test_header_encoding() {
        let frame = dump_frame(&[0; 64]);
        assert_eq!(&frame[..3], &[0x86, 0x00, 0x43]);
        assert_eq!(frame.len(), 67);

        let update = encode_frame(message_id::FIELD_UPDATE, &[12, 0x01]);
        assert_eq!(update, vec![0x8E, 0x00, 0x05, 12, 0x01]);
    }

    #[test]
    fn test_field_update() {
        let mut framer = Framer::new();
        let msgs = framer.feed(&[0x8E, 0x00, 0x05, 52, 0x00]);
        assert_eq!(
            msgs,
            vec![BoardMessage::FieldUpdate {
                square: "e2".parse().unwrap(),
                code: 0x00
            }]
        );
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut framer = Framer::new();
        let frame = dump_frame(&[1; 64]);

        assert!(framer.feed(&frame[..2]).is_empty());
        assert!(framer.feed(&frame[2..40]).is_empty());
        assert_eq!(framer.buffered(), 40);

        let msgs = framer.feed(&frame[40..]);
        assert_eq!(msgs.len(), 1);
        assert!(matches!(&msgs[0], BoardMessage::BoardDump(s) if s.cells() == &[1; 64]));
    }

    #[test]
    fn test_noise_is_discarded() {
        let mut framer = Framer::new();
        let mut data = vec![0x00, 0x13, 0x7F];
        data.extend_from_slice(&[0x8E, 0x00, 0x05, 8, 0x07]);
        let msgs = framer.feed(&data);
        assert_eq!(msgs.len(), 1);
        assert_eq!(framer.discarded(), 3);
    }

    #[test]
    fn test_bad_length_resyncs() {
        let mut framer = Framer::new();
        // 0x86 claiming 5 bytes is not a dump; the real update follows
        let data = [0x86, 0x00, 0x05, 0x8E, 0x00, 0x05, 3, 0x02];
        let msgs = framer.feed(&data);
        assert_eq!(
            msgs,
            vec![BoardMessage::FieldUpdate {
                square: Square::from_index(3).unwrap(),
                code: 0x02
            }]
        );
    }

    #[test]
    fn test_out_of_range_square_dropped() {
        let mut framer = Framer::new();
        let mut data = encode_frame(message_id::FIELD_UPDATE, &[64, 0x01]);
        data.extend(encode_frame(message_id::FIELD_UPDATE, &[63, 0x01]));
        let msgs = framer.feed(&data);
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn test_serial_and_version() {
        let mut framer = Framer::new();
        let mut data = encode_frame(message_id::SERIAL_NUMBER, b"12345");
        data.extend(encode_frame(message_id::VERSION, &[1, 7]));
        data.extend(encode_frame(0xA0, &[0xAA]));
        let msgs = framer.feed(&data);
        assert_eq!(
            msgs,
            vec![
                BoardMessage::SerialNumber("12345".into()),
                BoardMessage::Version { major: 1, minor: 7 },
                BoardMessage::Unknown {
                    id: 0xA0,
                    payload: vec![0xAA]
                },
            ]
        );
    }

    #[test]
    fn test_led_commands() {
        let squares = ["e2".parse().unwrap(), "e4".parse().unwrap()];
        assert_eq!(
            led_on(&squares, BlinkMode::Continuous, 1, 2),
            vec![0x60, 0x07, 0x05, 1, 0, 2, 52, 36, 0x00]
        );
        assert_eq!(
            led_on(&squares[..1], BlinkMode::SingleFlash, 1, 2),
            vec![0x60, 0x06, 0x05, 1, 1, 2, 52, 0x00]
        );
        assert_eq!(led_off(), vec![0x60, 0x02, 0x00, 0x00]);
        assert_eq!(LedCommand::light([]).encode(1, 2), led_off());
    }

    proptest! {
        #[test]
        fn prop_dump_is_byte_exact(cells in proptest::collection::vec(any::<u8>(), 64)) {
            let cells: [u8; 64] = cells.try_into().unwrap();
            let mut framer = Framer::new();
            let msgs = framer.feed(&dump_frame(&cells));
            prop_assert_eq!(msgs.len(), 1);
            match &msgs[0] {
                BoardMessage::BoardDump(snap) => prop_assert_eq!(snap.cells(), &cells),
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn prop_noise_prefix_then_frame(noise in proptest::collection::vec(0u8..0x80, 0..32), sq in 0u8..64, code in 0u8..13) {
            let mut framer = Framer::new();
            let mut data = noise;
            data.extend(encode_frame(message_id::FIELD_UPDATE, &[sq, code]));
            let msgs = framer.feed(&data);
            prop_assert_eq!(msgs, vec![BoardMessage::FieldUpdate {
                square: Square::from_index(sq as usize).unwrap(),
                code,
            }]);
        }
    }
}
