//! Core primitive types for Huddle sessions
//!
//! This crate provides the small, transport-independent vocabulary shared by
//! every other Huddle crate.
//!
//! # Types
//!
//! ## Identity
//! - [`PeerId`] - Transport-assigned endpoint identifier (opaque string)
//! - [`Peer`] - A connected peer with its display name
//! - [`ServiceId`] - Namespace scoping advertisers and discoverers
//!
//! ## Session
//! - [`SessionState`] - Global lifecycle state of a connection manager
//! - [`Role`] - Whether the local device hosts or joins
//! - [`RoomMetadata`] - Room information shared with joiners

mod peer;
mod session;

pub use peer::{DEFAULT_PEER_NAME, Peer, PeerId, ServiceId};
pub use session::{Role, RoomMetadata, SessionState};
