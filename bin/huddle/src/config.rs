//! Simulator configuration file.

use std::fs;
use std::path::Path;

use eyre::{Result, WrapErr};
use huddle_session::ManagerConfig;
use serde::{Deserialize, Serialize};

use crate::cli::SimulateArgs;

const DEFAULT_SERVICE_ID: &str = "huddle.lobby";
const DEFAULT_ROOM_NAME: &str = "Huddle Room";
const DEFAULT_PLAYERS: usize = 3;
const DEFAULT_ROUNDS: u32 = 2;

/// Top-level `huddle.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct HuddleConfig {
    #[serde(default)]
    pub(crate) lobby: LobbyConfig,

    #[serde(default)]
    pub(crate) manager: ManagerConfig,
}

/// The simulated lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LobbyConfig {
    /// Service id the host advertises and players discover under.
    #[serde(default = "default_service_id")]
    pub(crate) service_id: String,

    #[serde(default = "default_room_name")]
    pub(crate) room_name: String,

    /// Number of joining players, not counting the host.
    #[serde(default = "default_players")]
    pub(crate) players: usize,

    /// Message rounds exchanged once everyone has joined.
    #[serde(default = "default_rounds")]
    pub(crate) rounds: u32,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            service_id: default_service_id(),
            room_name: default_room_name(),
            players: default_players(),
            rounds: default_rounds(),
        }
    }
}

impl HuddleConfig {
    /// Load from `path`, or defaults when no file is given.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .wrap_err_with(|| format!("failed to parse config file {}", path.display()))
    }

    /// CLI flags win over file values.
    pub(crate) fn apply_args(&mut self, args: &SimulateArgs) {
        if let Some(service) = &args.service {
            self.lobby.service_id = service.clone();
        }
        if let Some(room) = &args.room {
            self.lobby.room_name = room.clone();
        }
        if let Some(players) = args.players {
            self.lobby.players = players;
        }
        if let Some(rounds) = args.rounds {
            self.lobby.rounds = rounds;
        }
        if let Some(max) = args.max_peers {
            self.manager.max_peers = Some(max);
        }
    }

    pub(crate) fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).wrap_err("failed to serialize config")
    }
}

fn default_service_id() -> String {
    DEFAULT_SERVICE_ID.to_owned()
}

fn default_room_name() -> String {
    DEFAULT_ROOM_NAME.to_owned()
}

fn default_players() -> usize {
    DEFAULT_PLAYERS
}

fn default_rounds() -> u32 {
    DEFAULT_ROUNDS
}
