//! Session lifecycle state and room metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a connection manager.
///
/// Global to the manager, not per peer. Exactly one value at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Advertising,
    Discovering,
    Connected,
    Error,
}

impl SessionState {
    /// True while advertising or discovering.
    pub fn is_searching(&self) -> bool {
        matches!(self, SessionState::Advertising | SessionState::Discovering)
    }

    /// True for every state that belongs to a started session.
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }

    /// Whether a new advertise/discover may be started from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Advertising => "advertising",
            SessionState::Discovering => "discovering",
            SessionState::Connected => "connected",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Which side of the session the local device is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Advertises a room and accepts inbound connections.
    Host,
    /// Discovers rooms and dials them.
    Client,
}

impl Role {
    /// State to resume when the roster drains back to empty.
    pub fn searching_state(&self) -> SessionState {
        match self {
            Role::Host => SessionState::Advertising,
            Role::Client => SessionState::Discovering,
        }
    }
}

/// Room information. Last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomMetadata {
    pub name: String,
}

impl RoomMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}
