//! Wire envelope, encoding, decoding and routing.
//!
//! The wire form is a flat UTF-8 JSON object:
//!
//! ```text
//! {"body":"up","kind":"move"}
//! {"kind":"room_info","room_name":"Room 42"}
//! ```
//!
//! The sender is never part of the wire form. The receiver stamps it from
//! transport metadata, so a peer cannot claim to be someone else.

use bytes::Bytes;
use huddle_primitives::PeerId;
use serde_json::{Map, Value, json};

use crate::error::DecodeError;

/// Reserved kind carrying room metadata.
pub const ROOM_INFO_KIND: &str = "room_info";

const KIND_FIELD: &str = "kind";
const BODY_FIELD: &str = "body";
const ROOM_NAME_FIELD: &str = "room_name";

/// A decoded inbound message.
///
/// For `room_info` envelopes `body` holds the room name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: String,
    pub body: String,
    pub sender_id: PeerId,
}

impl Envelope {
    pub fn is_room_info(&self) -> bool {
        self.kind == ROOM_INFO_KIND
    }
}

/// Application message forwarded to game-event subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEvent {
    pub kind: String,
    pub body: String,
    pub sender_id: PeerId,
}

/// Result of routing a decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Room metadata update. Never forwarded as a game event.
    RoomInfo { room_name: String, sender_id: PeerId },
    /// Any other kind, forwarded verbatim.
    Game(GameEvent),
}

/// Encode `{kind, body}` into canonical wire bytes.
///
/// Keys are emitted in sorted order. A `room_info` kind carries its body in
/// the `room_name` field.
pub fn encode(kind: &str, body: &str) -> Bytes {
    let record = if kind == ROOM_INFO_KIND {
        json!({ KIND_FIELD: kind, ROOM_NAME_FIELD: body })
    } else {
        json!({ KIND_FIELD: kind, BODY_FIELD: body })
    };
    Bytes::from(record.to_string().into_bytes())
}

/// Encode a room announcement.
pub fn encode_room_info(room_name: &str) -> Bytes {
    encode(ROOM_INFO_KIND, room_name)
}

/// Decode wire bytes received from `sender_id`.
pub fn decode(bytes: &[u8], sender_id: PeerId) -> Result<Envelope, DecodeError> {
    let text = std::str::from_utf8(bytes)?;
    let record: Map<String, Value> = serde_json::from_str(text)?;

    let kind = string_field(&record, KIND_FIELD)?;
    let body_field = if kind == ROOM_INFO_KIND {
        ROOM_NAME_FIELD
    } else {
        BODY_FIELD
    };
    let body = string_field(&record, body_field)?;

    Ok(Envelope {
        kind,
        body,
        sender_id,
    })
}

/// Split an envelope into room metadata or a game event.
pub fn route(envelope: Envelope) -> Inbound {
    if envelope.is_room_info() {
        Inbound::RoomInfo {
            room_name: envelope.body,
            sender_id: envelope.sender_id,
        }
    } else {
        Inbound::Game(GameEvent {
            kind: envelope.kind,
            body: envelope.body,
            sender_id: envelope.sender_id,
        })
    }
}

fn string_field(record: &Map<String, Value>, field: &'static str) -> Result<String, DecodeError> {
    match record.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DecodeError::InvalidField(field)),
        None => Err(DecodeError::MissingField(field)),
    }
}
