//! Simulated lobby: one host and `players` joiners over a [`MemoryMedium`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Result, WrapErr, bail};
use huddle_net_transport::{MemoryMedium, MemoryTransport, event_channel};
use huddle_primitives::{Peer, ServiceId, SessionState};
use huddle_session::{ConnectionManager, GameEvent, ManagerConfig, Subscription};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::config::HuddleConfig;

/// How long to wait for joins and message delivery.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

const HOST_ID: &str = "host";

type Manager = ConnectionManager<MemoryTransport>;

struct Device {
    manager: Arc<Manager>,
    driver: JoinHandle<()>,
}

impl Device {
    fn spawn(medium: &MemoryMedium, id: &str, config: ManagerConfig) -> Self {
        let (sink, events) = event_channel();
        let manager = Arc::new(ConnectionManager::new(medium.attach(id, sink), config));
        let driver = manager.spawn_driver(events);
        Self { manager, driver }
    }
}

/// What the simulation observed.
#[derive(Debug)]
pub(crate) struct Summary {
    pub(crate) room_name: String,
    pub(crate) roster: Vec<Peer>,
    pub(crate) moves_received: usize,
    pub(crate) ticks_received: usize,
    pub(crate) failed_sends: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "room: {}", self.room_name)?;
        writeln!(f, "players: {}", self.roster.len())?;
        for peer in &self.roster {
            writeln!(f, "  {} ({})", peer.display_name, peer.id)?;
        }
        writeln!(f, "moves received by host: {}", self.moves_received)?;
        writeln!(f, "ticks received by players: {}", self.ticks_received)?;
        write!(f, "failed sends: {}", self.failed_sends)
    }
}

pub(crate) async fn run(config: &HuddleConfig) -> Result<Summary> {
    let lobby = &config.lobby;
    if lobby.players == 0 {
        bail!("a lobby needs at least one player");
    }

    let medium = MemoryMedium::new();
    let service = ServiceId::new(lobby.service_id.clone());

    let host = Device::spawn(&medium, HOST_ID, config.manager.clone());
    let players: Vec<Device> = (1..=lobby.players)
        .map(|n| {
            let manager_config = config.manager.clone().with_local_name(format!("Player {n}"));
            Device::spawn(&medium, &format!("player-{n}"), manager_config)
        })
        .collect();

    let mut host_roster = host.manager.subscribe_roster();
    let mut host_games = host.manager.subscribe_game_events();
    let mut player_games: Vec<_> = players
        .iter()
        .map(|player| player.manager.subscribe_game_events())
        .collect();

    host.manager
        .start_advertising(&service, &lobby.room_name)
        .wrap_err("host failed to advertise")?;
    for player in &players {
        player
            .manager
            .start_discovery(&service)
            .wrap_err("player failed to start discovery")?;
    }

    let expected = config
        .manager
        .max_peers
        .map_or(lobby.players, |max| max.min(lobby.players));
    timeout(SETTLE_TIMEOUT, async {
        while let Some(roster) = host_roster.recv().await {
            debug!(joined = roster.len(), expected, "roster update");
            if roster.len() >= expected {
                break;
            }
        }
    })
    .await
    .wrap_err("timed out waiting for players to join")?;

    // The host sees each join before the joiner does.
    timeout(SETTLE_TIMEOUT, async {
        while connected_players(&players) < expected {
            sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .wrap_err("timed out waiting for players to see the host")?;
    info!(room = %host.manager.room_name(), players = expected, "lobby full");

    let mut failed_sends = 0;
    for round in 1..=lobby.rounds {
        let report = host.manager.broadcast("tick", &round.to_string());
        failed_sends += report.failed.len();
        for player in &players {
            failed_sends += player
                .manager
                .broadcast("move", &format!("round {round}"))
                .failed
                .len();
        }
    }

    let rounds = usize::try_from(lobby.rounds)?;
    let moves_received = collect(&mut host_games, expected * rounds).await?.len();
    let mut ticks_received = 0;
    for (player, games) in players.iter().zip(player_games.iter_mut()) {
        // Players left waiting by a full room receive nothing.
        if player.manager.state() != SessionState::Connected {
            continue;
        }
        ticks_received += collect(games, rounds).await?.len();
    }

    let summary = Summary {
        room_name: host.manager.room_name(),
        roster: host.manager.roster(),
        moves_received,
        ticks_received,
        failed_sends,
    };

    for device in players.iter().chain(std::iter::once(&host)) {
        device.manager.stop_all();
        device.driver.abort();
    }
    info!("simulation finished");
    Ok(summary)
}

fn connected_players(players: &[Device]) -> usize {
    players
        .iter()
        .filter(|player| player.manager.state() == SessionState::Connected)
        .count()
}

async fn collect(games: &mut Subscription<GameEvent>, count: usize) -> Result<Vec<GameEvent>> {
    let mut out = Vec::with_capacity(count);
    timeout(SETTLE_TIMEOUT, async {
        while out.len() < count {
            match games.recv().await {
                Some(event) => out.push(event),
                None => break,
            }
        }
    })
    .await
    .wrap_err("timed out waiting for game events")?;
    Ok(out)
}
