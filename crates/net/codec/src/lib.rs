//! Message protocol for Huddle sessions.
//!
//! Application messages travel as small JSON envelopes over the transport's
//! opaque byte channel. This crate encodes outgoing `{kind, body}` pairs,
//! decodes inbound bytes into [`Envelope`]s stamped with the transport-reported
//! sender, and routes them: `room_info` updates room metadata, every other
//! kind becomes a [`GameEvent`].

mod envelope;
mod error;

pub use envelope::{
    Envelope, GameEvent, Inbound, ROOM_INFO_KIND, decode, encode, encode_room_info, route,
};
pub use error::DecodeError;
