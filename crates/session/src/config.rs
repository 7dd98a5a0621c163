//! Connection manager configuration.

use serde::{Deserialize, Serialize};

/// Display name sent with outgoing connection requests by default.
pub const DEFAULT_LOCAL_NAME: &str = "Client";

/// Connection manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Name this device presents when dialling a host.
    #[serde(default = "default_local_name")]
    pub local_name: String,

    /// Maximum connected peers. None = unlimited (every request is accepted).
    #[serde(default)]
    pub max_peers: Option<usize>,

    /// Send `room_info` to each peer that joins a hosted room.
    #[serde(default = "default_announce_room")]
    pub announce_room: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            local_name: default_local_name(),
            max_peers: None,
            announce_room: default_announce_room(),
        }
    }
}

impl ManagerConfig {
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = name.into();
        self
    }

    pub fn with_max_peers(mut self, max: usize) -> Self {
        self.max_peers = Some(max);
        self
    }

    /// Whether a roster of `len` peers has room for one more.
    pub fn has_capacity(&self, len: usize) -> bool {
        self.max_peers.is_none_or(|max| len < max)
    }
}

fn default_local_name() -> String {
    DEFAULT_LOCAL_NAME.to_owned()
}

fn default_announce_room() -> bool {
    true
}
