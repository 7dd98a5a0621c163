//! End-to-end lobby sessions over the in-process medium.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use huddle_net_transport::{MemoryMedium, MemoryTransport, TransportEvents, event_channel};
use huddle_primitives::{Peer, PeerId, Role, ServiceId, SessionState};
use huddle_session::{ConnectionManager, GameEvent, ManagerConfig, SessionError};

const SERVICE: &str = "huddle.lobby.test";

struct Device {
    id: PeerId,
    manager: ConnectionManager<MemoryTransport>,
    events: TransportEvents,
}

impl Device {
    fn new(medium: &MemoryMedium, id: &str) -> Self {
        let config = ManagerConfig::default().with_local_name(format!("{id}-name"));
        Self::with_config(medium, id, config)
    }

    fn with_config(medium: &MemoryMedium, id: &str, config: ManagerConfig) -> Self {
        let (sink, events) = event_channel();
        Self {
            id: id.into(),
            manager: ConnectionManager::new(medium.attach(id, sink), config),
            events,
        }
    }
}

fn service() -> ServiceId {
    ServiceId::from(SERVICE)
}

/// Deliver queued transport events until every device is quiet.
fn pump(devices: &mut [&mut Device]) {
    loop {
        let mut progressed = false;
        for device in devices.iter_mut() {
            for event in device.events.drain() {
                device.manager.handle_event(event);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
}

/// Handle only what is queued right now, without following up.
fn step(device: &mut Device) {
    for event in device.events.drain() {
        device.manager.handle_event(event);
    }
}

fn roster_ids(device: &Device) -> Vec<String> {
    device
        .manager
        .roster()
        .into_iter()
        .map(|peer| peer.id.into_inner())
        .collect()
}

#[test]
fn host_round_trip() {
    let medium = MemoryMedium::new();
    let mut host = Device::new(&medium, "host");
    let mut p1 = Device::new(&medium, "P1");
    let mut games = host.manager.subscribe_game_events();
    let mut host_states = host.manager.subscribe_state();

    host.manager.start_advertising(&service(), "Room 42").unwrap();
    p1.manager.start_discovery(&service()).unwrap();
    pump(&mut [&mut host, &mut p1]);

    assert_eq!(host.manager.state(), SessionState::Connected);
    assert_eq!(host.manager.roster(), vec![Peer::new("P1", "P1-name")]);
    assert_eq!(p1.manager.state(), SessionState::Connected);
    assert_eq!(p1.manager.roster(), vec![Peer::new("host", "Room 42")]);
    assert_eq!(p1.manager.room_name(), "Room 42");

    let report = p1.manager.broadcast("move", "up");
    assert!(report.is_complete());
    pump(&mut [&mut host, &mut p1]);
    assert_eq!(
        games.drain(),
        vec![GameEvent {
            kind: "move".into(),
            body: "up".into(),
            sender_id: "P1".into(),
        }]
    );

    p1.manager.stop_all();
    pump(&mut [&mut host, &mut p1]);

    assert!(host.manager.roster().is_empty());
    assert_eq!(host.manager.state(), SessionState::Advertising);
    assert_eq!(host.manager.room_name(), "Room 42");
    assert_eq!(p1.manager.state(), SessionState::Idle);
    assert_eq!(
        host_states.drain(),
        vec![
            SessionState::Idle,
            SessionState::Advertising,
            SessionState::Connected,
            SessionState::Advertising,
        ]
    );
}

#[test]
fn lobby_fills_in_arrival_order() {
    let medium = MemoryMedium::new();
    let mut host = Device::new(&medium, "host");
    let mut p1 = Device::new(&medium, "p1");
    let mut p2 = Device::new(&medium, "p2");
    let mut p3 = Device::new(&medium, "p3");

    host.manager.start_advertising(&service(), "Room").unwrap();
    p3.manager.start_discovery(&service()).unwrap();
    pump(&mut [&mut host, &mut p1, &mut p2, &mut p3]);
    p1.manager.start_discovery(&service()).unwrap();
    pump(&mut [&mut host, &mut p1, &mut p2, &mut p3]);
    p2.manager.start_discovery(&service()).unwrap();
    pump(&mut [&mut host, &mut p1, &mut p2, &mut p3]);

    assert_eq!(roster_ids(&host), vec!["p3", "p1", "p2"]);
    for player in [&p1, &p2, &p3] {
        assert_eq!(roster_ids(player), vec!["host"]);
        assert_eq!(player.manager.room_name(), "Room");
    }
}

#[test]
fn broadcast_survives_one_dead_link() {
    let medium = MemoryMedium::new();
    let mut host = Device::with_config(
        &medium,
        "host",
        ManagerConfig {
            announce_room: false,
            ..Default::default()
        },
    );
    let mut p1 = Device::new(&medium, "p1");
    let mut p2 = Device::new(&medium, "p2");
    let mut p3 = Device::new(&medium, "p3");

    host.manager.start_advertising(&service(), "Room").unwrap();
    for player in [&p1, &p2, &p3] {
        player.manager.start_discovery(&service()).unwrap();
    }
    pump(&mut [&mut host, &mut p1, &mut p2, &mut p3]);
    assert_eq!(host.manager.roster().len(), 3);

    // The host has not processed the loss yet, so p2 is still on its roster.
    medium.set_radio(&p2.id, false);
    let mut p1_games = p1.manager.subscribe_game_events();
    let mut p3_games = p3.manager.subscribe_game_events();

    let report = host.manager.broadcast("tick", "7");
    assert_eq!(report.delivered, vec![p1.id.clone(), p3.id.clone()]);
    assert_matches!(
        report.failed.as_slice(),
        [(peer, SessionError::SendFailure { .. })] if peer == &p2.id
    );

    pump(&mut [&mut host, &mut p1, &mut p2, &mut p3]);
    assert_eq!(p1_games.drain().len(), 1);
    assert_eq!(p3_games.drain().len(), 1);
    assert_eq!(roster_ids(&host), vec!["p1", "p3"]);
    assert_eq!(host.manager.state(), SessionState::Connected);
}

#[test]
fn rejection_then_cold_restart() {
    let medium = MemoryMedium::new();
    let mut host = Device::new(&medium, "host");
    let mut client = Device::new(&medium, "client");

    host.manager.start_advertising(&service(), "Room").unwrap();
    medium.refuse_connections(&host.id, true);
    client.manager.start_discovery(&service()).unwrap();
    pump(&mut [&mut host, &mut client]);

    assert_eq!(client.manager.state(), SessionState::Error);
    assert_matches!(
        client.manager.last_error(),
        Some(SessionError::ConnectionRejected { peer }) if peer == host.id
    );
    assert!(client.manager.roster().is_empty());
    assert_eq!(host.manager.state(), SessionState::Advertising);

    medium.refuse_connections(&host.id, false);
    client.manager.start_discovery(&service()).unwrap();
    assert_eq!(client.manager.last_error(), None);
    pump(&mut [&mut host, &mut client]);

    assert_eq!(client.manager.state(), SessionState::Connected);
    assert_eq!(roster_ids(&host), vec!["client"]);
}

#[test]
fn radio_off_fails_start() {
    let medium = MemoryMedium::new();
    let host = Device::new(&medium, "host");
    medium.set_radio(&host.id, false);

    assert_matches!(
        host.manager.start_advertising(&service(), "Room"),
        Err(SessionError::TransportUnavailable(_))
    );
    assert_eq!(host.manager.state(), SessionState::Error);

    medium.set_radio(&host.id, true);
    host.manager.start_advertising(&service(), "Room").unwrap();
    assert_eq!(host.manager.state(), SessionState::Advertising);
}

#[test]
fn host_stop_sends_clients_back_to_discovery() {
    let medium = MemoryMedium::new();
    let mut host = Device::new(&medium, "host");
    let mut client = Device::new(&medium, "client");

    host.manager.start_advertising(&service(), "Room").unwrap();
    client.manager.start_discovery(&service()).unwrap();
    pump(&mut [&mut host, &mut client]);

    host.manager.stop_all();
    host.manager.stop_all();
    pump(&mut [&mut host, &mut client]);

    let snapshot = host.manager.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.role, None);
    assert!(snapshot.roster.is_empty());
    assert_eq!(snapshot.room_name, "");
    assert!(medium.links_of(&host.id).is_empty());

    assert_eq!(client.manager.state(), SessionState::Discovering);
    assert_eq!(client.manager.role(), Some(Role::Client));
    assert!(client.manager.roster().is_empty());
}

#[test]
fn events_after_stop_are_ignored() {
    let medium = MemoryMedium::new();
    let mut host = Device::new(&medium, "host");
    let mut client = Device::new(&medium, "client");

    host.manager.start_advertising(&service(), "Room").unwrap();
    client.manager.start_discovery(&service()).unwrap();
    // The client dials, but the host stops before reading its queue.
    pump(&mut [&mut client]);
    host.manager.stop_all();
    pump(&mut [&mut host, &mut client]);

    assert_eq!(host.manager.state(), SessionState::Idle);
    assert!(host.manager.roster().is_empty());
    assert!(medium.links_of(&host.id).is_empty());
    assert_matches!(
        client.manager.last_error(),
        Some(SessionError::ConnectionError { .. })
    );
}

#[test]
fn host_restart_ignores_queued_handshake() {
    let medium = MemoryMedium::new();
    let mut host = Device::new(&medium, "host");
    let mut client = Device::new(&medium, "client");

    host.manager.start_advertising(&service(), "Room 1").unwrap();
    client.manager.start_discovery(&service()).unwrap();
    pump(&mut [&mut client]);
    // Completes the handshake; the host's success is now queued.
    step(&mut host);

    host.manager.stop_all();
    host.manager.start_advertising(&service(), "Room 2").unwrap();
    step(&mut host);

    let snapshot = host.manager.snapshot();
    assert!(snapshot.roster.is_empty());
    assert_eq!(snapshot.state, SessionState::Advertising);
    assert_eq!(snapshot.room_name, "Room 2");
    assert!(!medium.is_linked(&host.id, &client.id));

    // The client notices the drop, finds the new advert and joins for real.
    pump(&mut [&mut host, &mut client]);
    assert_eq!(roster_ids(&host), vec!["client"]);
    assert!(medium.is_linked(&host.id, &client.id));
    assert_eq!(client.manager.room_name(), "Room 2");
}

#[test]
fn client_restart_ignores_queued_room_info() {
    let medium = MemoryMedium::new();
    let mut host = Device::new(&medium, "host");
    let mut client = Device::new(&medium, "client");
    let mut games = client.manager.subscribe_game_events();

    host.manager.start_advertising(&service(), "Old Room").unwrap();
    client.manager.start_discovery(&service()).unwrap();
    pump(&mut [&mut client]);
    // The host accepts, connects and announces its room to the client.
    pump(&mut [&mut host]);
    host.manager.broadcast("move", "stale");

    client.manager.stop_all();
    client.manager.start_discovery(&ServiceId::from("huddle.other")).unwrap();
    step(&mut client);

    let snapshot = client.manager.snapshot();
    assert_eq!(snapshot.room_name, "");
    assert!(snapshot.roster.is_empty());
    assert_eq!(snapshot.state, SessionState::Discovering);
    assert!(games.drain().is_empty());
}

#[test]
fn full_room_leaves_extra_players_waiting() {
    let medium = MemoryMedium::new();
    let mut host = Device::with_config(
        &medium,
        "host",
        ManagerConfig::default().with_max_peers(1),
    );
    let mut p1 = Device::new(&medium, "p1");
    let mut p2 = Device::new(&medium, "p2");

    host.manager.start_advertising(&service(), "Duel").unwrap();
    p1.manager.start_discovery(&service()).unwrap();
    pump(&mut [&mut host, &mut p1]);
    p2.manager.start_discovery(&service()).unwrap();
    pump(&mut [&mut host, &mut p1, &mut p2]);

    assert_eq!(roster_ids(&host), vec!["p1"]);
    assert_eq!(p2.manager.state(), SessionState::Discovering);
    assert!(p2.manager.roster().is_empty());
}

#[tokio::test]
async fn spawned_drivers_connect_peers() {
    let medium = MemoryMedium::new();
    let (host_sink, host_events) = event_channel();
    let (client_sink, client_events) = event_channel();
    let host = Arc::new(ConnectionManager::new(
        medium.attach("host", host_sink),
        ManagerConfig::default(),
    ));
    let client = Arc::new(ConnectionManager::new(
        medium.attach("client", client_sink),
        ManagerConfig::default(),
    ));
    let _host_driver = host.spawn_driver(host_events);
    let _client_driver = client.spawn_driver(client_events);

    let mut host_roster = host.subscribe_roster();
    let mut client_room = client.subscribe_room_name();

    host.start_advertising(&service(), "Async Room").unwrap();
    client.start_discovery(&service()).unwrap();

    let joined = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(roster) = host_roster.recv().await {
            if roster.len() == 1 {
                return roster;
            }
        }
        Vec::new()
    })
    .await
    .unwrap();
    assert_eq!(joined, vec![Peer::new("client", "Client")]);

    let room = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(name) = client_room.recv().await {
            if !name.is_empty() {
                return name;
            }
        }
        String::new()
    })
    .await
    .unwrap();
    assert_eq!(room, "Async Room");
}
