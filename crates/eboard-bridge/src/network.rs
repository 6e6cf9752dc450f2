//! JSON model for the vendor's local WebSocket bridge
//!
//! Outbound calls are `{"id": n, "call": "...", "param": {...}}`. Inbound
//! messages are either call responses (`"response": "call"`) or feed events
//! (`"response": "feed"`). Any message carrying a `board` or `fen` field is
//! turned into a full board dump.

use crate::protocol::BoardMessage;
use eboard_core::{BoardKind, BoardSnapshot, LinkError, Placement, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Feed name for board change events
pub const BOARD_FEED: &str = "eboardevent";

/// An outbound call to the bridge service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkCall {
    pub id: u64,
    pub call: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<Value>,
}

impl NetworkCall {
    /// List connected boards
    pub fn eboards(id: u64) -> Self {
        Self {
            id,
            call: "eboards".into(),
            param: None,
        }
    }

    /// Subscribe to change events of one board
    pub fn subscribe(id: u64, serial: &str) -> Self {
        Self {
            id,
            call: "subscribe".into(),
            param: Some(serde_json::json!({
                "feed": BOARD_FEED,
                "id": id,
                "param": { "serialnr": serial },
            })),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A board known to the bridge service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EboardInfo {
    #[serde(rename = "serialnr")]
    pub serial: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub board: Option<String>,
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    /// Response to `eboards`
    Boards(Vec<EboardInfo>),
    /// Response to any other call, e.g. subscribe confirmation
    CallResult { id: u64 },
    /// Board placement from a feed event, tagged with the board's serial
    /// number when the service names it
    Board {
        serial: Option<String>,
        snapshot: BoardSnapshot,
    },
    /// Anything else
    Other,
}

impl NetworkEvent {
    /// Whether this event may concern the board with `serial`.
    ///
    /// Feed events naming another board do not; untagged events do.
    pub fn is_for(&self, serial: &str) -> bool {
        match self {
            NetworkEvent::Board {
                serial: Some(from), ..
            } => from == serial,
            _ => true,
        }
    }

    /// Downstream message for this event, if it carries a board
    pub fn into_message(self) -> Option<BoardMessage> {
        match self {
            NetworkEvent::Board { snapshot, .. } => Some(BoardMessage::BoardDump(snapshot)),
            NetworkEvent::Boards(boards) => boards
                .into_iter()
                .find_map(|b| b.board)
                .and_then(|fen| snapshot_from_fen(&fen).ok())
                .map(BoardMessage::BoardDump),
            _ => None,
        }
    }
}

/// Encode a placement string the way a piece-identifying board reports it
pub fn snapshot_from_fen(fen: &str) -> Result<BoardSnapshot> {
    let placement = Placement::from_board_fen(fen)?;
    Ok(BoardSnapshot::encode(&placement, BoardKind::PieceIdentifying))
}

/// Parse one text message from the bridge service
pub fn parse_event(text: &str) -> Result<NetworkEvent> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(LinkError::Protocol(format!("expected object, got {}", text)));
    }

    let param = value.get("param");
    let placement = [param, Some(&value)]
        .into_iter()
        .flatten()
        .find_map(|v| {
            v.get("board")
                .or_else(|| v.get("fen"))
                .and_then(Value::as_str)
        });
    if let Some(fen) = placement {
        let serial = [param, Some(&value)]
            .into_iter()
            .flatten()
            .find_map(|v| v.get("serialnr").and_then(Value::as_str))
            .map(str::to_string);
        return Ok(NetworkEvent::Board {
            serial,
            snapshot: snapshot_from_fen(fen)?,
        });
    }

    match value.get("response").and_then(Value::as_str) {
        Some("call") => {
            if let Some(list) = param.filter(|p| p.is_array()) {
                let boards: Vec<EboardInfo> = serde_json::from_value(list.clone())?;
                return Ok(NetworkEvent::Boards(boards));
            }
            let id = value.get("id").and_then(Value::as_u64).unwrap_or(0);
            Ok(NetworkEvent::CallResult { id })
        }
        _ => Ok(NetworkEvent::Other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eboard_core::{Color, Piece, Role, Square};

    #[test]
    fn test_subscribe_call_shape() {
        let json = NetworkCall::subscribe(2, "24958").to_json().unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["id"], 2);
        assert_eq!(v["call"], "subscribe");
        assert_eq!(v["param"]["feed"], BOARD_FEED);
        assert_eq!(v["param"]["param"]["serialnr"], "24958");

        let json = NetworkCall::eboards(1).to_json().unwrap();
        assert_eq!(json, r#"{"id":1,"call":"eboards"}"#);
    }

    #[test]
    fn test_feed_board_event() {
        let text = r#"{"response":"feed","id":2,"param":{"serialnr":"24958","board":"rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR","flipped":false}}"#;
        let event = parse_event(text).unwrap();
        assert!(event.is_for("24958"));
        assert!(!event.is_for("10001"));
        let NetworkEvent::Board { serial, snapshot: snap } = event else {
            panic!("expected board event, got {:?}", event);
        };
        assert_eq!(serial.as_deref(), Some("24958"));
        let e4: Square = "e4".parse().unwrap();
        let e2: Square = "e2".parse().unwrap();
        assert_eq!(snap.piece_at(e4), Some(Piece::new(Color::White, Role::Pawn)));
        assert_eq!(snap.piece_at(e2), None);
    }

    #[test]
    fn test_top_level_fen_event() {
        let text = r#"{"fen":"8/8/8/8/8/8/8/4K3"}"#;
        let event = parse_event(text).unwrap();
        // No serial number: assumed to be the subscribed board
        assert!(event.is_for("24958"));
        let msg = event.into_message().unwrap();
        let BoardMessage::BoardDump(snap) = msg else {
            panic!("expected dump");
        };
        assert_eq!(snap.piece_count(), 1);
    }

    #[test]
    fn test_eboards_response() {
        let text = r#"{"response":"call","id":1,"param":[{"serialnr":"24958","state":"ACTIVE","board":"8/8/8/8/8/8/8/8"}]}"#;
        let event = parse_event(text).unwrap();
        match &event {
            NetworkEvent::Boards(boards) => {
                assert_eq!(boards.len(), 1);
                assert_eq!(boards[0].serial, "24958");
            }
            other => panic!("expected boards, got {:?}", other),
        }
        assert!(matches!(event.into_message(), Some(BoardMessage::BoardDump(_))));
    }

    #[test]
    fn test_subscribe_confirmation() {
        let text = r#"{"response":"call","id":2,"param":null}"#;
        assert_eq!(parse_event(text).unwrap(), NetworkEvent::CallResult { id: 2 });
    }

    #[test]
    fn test_malformed_input() {
        assert!(parse_event("not json").is_err());
        assert!(parse_event("[1,2]").is_err());
        assert!(parse_event(r#"{"board":"garbage"}"#).is_err());
        assert_eq!(
            parse_event(r#"{"response":"feed","param":{}}"#).unwrap(),
            NetworkEvent::Other
        );
    }
}
