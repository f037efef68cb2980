//! Predefined application-level message shapes.
//!
//! The codec itself (`crate::codec`) is generic over three sub-sequences; the
//! shapes below fix the specific field layouts agreed between a reference
//! server and client. The `type` field is always the first integer pushed,
//! by convention, so [`crate::codec::peek_first_int`] can dispatch on it
//! before a full decode.

use crate::buffer::Buffer;
use crate::codec::{self, DecodedMessage, MessageBuilder};
use crate::error::ProtocolError;

macro_rules! message_type {
    ($name:ident = $value:expr) => {
        pub const $name: i32 = $value;
    };
}

message_type!(TYPE_IDENT_REQUEST = 0);
message_type!(TYPE_IDENT_REPLY_OK = 1);
message_type!(TYPE_IDENT_REPLY_NOK = 2);
message_type!(TYPE_CHAT_STRING = 3);
message_type!(TYPE_POSITION = 4);
message_type!(TYPE_PING_REQUEST = 5);
message_type!(TYPE_PING_REPLY = 6);
message_type!(TYPE_GET_BOX = 7);
message_type!(TYPE_BOX_REPLY = 8);
message_type!(TYPE_QUIT = 9);

/// `(type, id, name, password)` — also used for both IdentReply variants,
/// distinguished by `type`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ident {
    pub id: i32,
    pub name: String,
    pub password: String,
}

impl Ident {
    pub fn encode(&self, msg_type: i32) -> Buffer {
        let mut b = MessageBuilder::new();
        b.push_int(msg_type)
            .push_int(self.id)
            .push_str(&self.name)
            .push_str(&self.password);
        codec::encode(&b)
    }

    pub fn decode(msg: &mut DecodedMessage) -> Result<Ident, ProtocolError> {
        let id = msg.pop_int()?;
        let name = msg.pop_buffer()?.to_string_lossy();
        let password = msg.pop_buffer()?.to_string_lossy();
        Ok(Ident { id, name, password })
    }
}

/// `(type, id, X, Y, vx, vy, ax, ay, timestamp)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    pub id: i32,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub ax: f64,
    pub ay: f64,
    pub timestamp: i32,
}

impl Position {
    pub fn encode(&self) -> Buffer {
        let mut b = MessageBuilder::new();
        b.push_int(TYPE_POSITION)
            .push_int(self.id)
            .push_double(self.x)
            .push_double(self.y)
            .push_double(self.vx)
            .push_double(self.vy)
            .push_double(self.ax)
            .push_double(self.ay)
            .push_int(self.timestamp);
        codec::encode(&b)
    }

    pub fn decode(msg: &mut DecodedMessage) -> Result<Position, ProtocolError> {
        Ok(Position {
            id: msg.pop_int()?,
            x: msg.pop_double()?,
            y: msg.pop_double()?,
            vx: msg.pop_double()?,
            vy: msg.pop_double()?,
            ax: msg.pop_double()?,
            ay: msg.pop_double()?,
            timestamp: msg.pop_int()?,
        })
    }
}

/// `(type, id_from, id_to, color, name, channel, text)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatString {
    pub id_from: i32,
    pub id_to: i32,
    pub color: i32,
    pub name: String,
    pub channel: String,
    pub text: String,
}

impl ChatString {
    pub fn encode(&self) -> Buffer {
        let mut b = MessageBuilder::new();
        b.push_int(TYPE_CHAT_STRING)
            .push_int(self.id_from)
            .push_int(self.id_to)
            .push_int(self.color)
            .push_str(&self.name)
            .push_str(&self.channel)
            .push_str(&self.text);
        codec::encode(&b)
    }

    pub fn decode(msg: &mut DecodedMessage) -> Result<ChatString, ProtocolError> {
        Ok(ChatString {
            id_from: msg.pop_int()?,
            id_to: msg.pop_int()?,
            color: msg.pop_int()?,
            name: msg.pop_buffer()?.to_string_lossy(),
            channel: msg.pop_buffer()?.to_string_lossy(),
            text: msg.pop_buffer()?.to_string_lossy(),
        })
    }
}

/// `(type, id_from, id_to, time)`, shared by ping request and reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ping {
    pub id_from: i32,
    pub id_to: i32,
    pub time: i32,
}

impl Ping {
    pub fn encode(&self, msg_type: i32) -> Buffer {
        let mut b = MessageBuilder::new();
        b.push_int(msg_type).push_int(self.id_from).push_int(self.id_to).push_int(self.time);
        codec::encode(&b)
    }

    pub fn decode(msg: &mut DecodedMessage) -> Result<Ping, ProtocolError> {
        Ok(Ping { id_from: msg.pop_int()?, id_to: msg.pop_int()?, time: msg.pop_int()? })
    }
}

/// `(type)` — no body.
pub fn encode_quit() -> Buffer {
    let mut b = MessageBuilder::new();
    b.push_int(TYPE_QUIT);
    codec::encode(&b)
}

/// `(type, x, y, z)` — a tile coordinate request, paired with [`BoxReply`].
/// The map engine that would produce/consume these is out of scope here; the
/// wire shape is generic codec material like the other predefined messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetBox {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GetBox {
    pub fn encode(&self) -> Buffer {
        let mut b = MessageBuilder::new();
        b.push_int(TYPE_GET_BOX).push_int(self.x).push_int(self.y).push_int(self.z);
        codec::encode(&b)
    }

    pub fn decode(msg: &mut DecodedMessage) -> Result<GetBox, ProtocolError> {
        Ok(GetBox { x: msg.pop_int()?, y: msg.pop_int()?, z: msg.pop_int()? })
    }
}

/// `(type, x, y, z, data)` — reply carrying the tile's serialized data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoxReply {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub data: Buffer,
}

impl BoxReply {
    pub fn encode(&self) -> Buffer {
        let mut b = MessageBuilder::new();
        b.push_int(TYPE_BOX_REPLY)
            .push_int(self.x)
            .push_int(self.y)
            .push_int(self.z)
            .push_buffer(self.data.clone());
        codec::encode(&b)
    }

    pub fn decode(msg: &mut DecodedMessage) -> Result<BoxReply, ProtocolError> {
        Ok(BoxReply {
            x: msg.pop_int()?,
            y: msg.pop_int()?,
            z: msg.pop_int()?,
            data: msg.pop_buffer()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_round_trips() {
        let ident = Ident { id: 0, name: "alice".into(), password: "secret".into() };
        let wire = ident.encode(TYPE_IDENT_REQUEST);
        assert_eq!(codec::peek_first_int(&wire).unwrap(), TYPE_IDENT_REQUEST);
        let mut decoded = codec::decode(&wire).unwrap();
        assert_eq!(decoded.pop_int().unwrap(), TYPE_IDENT_REQUEST);
        assert_eq!(Ident::decode(&mut decoded).unwrap(), ident);
    }

    #[test]
    fn position_round_trips_with_bit_exact_doubles() {
        let pos = Position {
            id: 7,
            x: 1.0,
            y: -2.5,
            vx: 3.14159265358979,
            vy: 0.0,
            ax: 1e-300,
            ay: 1e300,
            timestamp: 99,
        };
        let wire = pos.encode();
        let mut decoded = codec::decode(&wire).unwrap();
        assert_eq!(decoded.pop_int().unwrap(), TYPE_POSITION);
        assert_eq!(Position::decode(&mut decoded).unwrap(), pos);
    }

    #[test]
    fn quit_has_only_a_type_field() {
        let wire = encode_quit();
        let mut decoded = codec::decode(&wire).unwrap();
        assert_eq!(decoded.int_count(), 1);
        assert_eq!(decoded.pop_int().unwrap(), TYPE_QUIT);
        assert!(matches!(decoded.pop_int(), Err(ProtocolError::Underflow)));
    }
}
