//! Connection manager: one session behind one lock, driven by transport events.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use huddle_net_codec::{GameEvent, Inbound, decode, encode, encode_room_info, route};
use huddle_net_peers::{EventFeed, Observable, Roster, Subscription};
use huddle_net_transport::{
    ConnectionOutcome, TransferStatus, Transport, TransportEvent, TransportEvents,
};
use huddle_primitives::{Peer, PeerId, Role, RoomMetadata, ServiceId, SessionState};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::ManagerConfig;
use crate::error::SessionError;
use crate::state::{SessionInput, SessionMachine};

/// Outcome of a best-effort fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<PeerId>,
    pub failed: Vec<(PeerId, SessionError)>,
}

impl BroadcastReport {
    /// True if no send failed. An empty roster counts as complete.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Consistent point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub role: Option<Role>,
    pub room_name: String,
    pub roster: Vec<Peer>,
    pub last_error: Option<SessionError>,
}

/// Everything guarded by the session lock.
#[derive(Debug, Default)]
struct Session {
    machine: SessionMachine,
    room: RoomMetadata,
    roster: Roster,
    /// Endpoints mid-handshake, with the name they were introduced by.
    pending: HashMap<PeerId, String>,
    last_error: Option<SessionError>,
}

impl Session {
    /// Connected peers plus handshakes in flight.
    fn occupied(&self) -> usize {
        self.roster.len() + self.pending.len()
    }
}

/// Orchestrates advertising, discovery, connections and messaging for one
/// local device.
///
/// Connection policy: inbound requests are accepted unconditionally while
/// there is capacity, and every endpoint found during discovery is dialled.
/// Proximity plus the service id is the only admission control.
///
/// All session state lives behind a single mutex. Each operation and each
/// transport event takes it once, and observables are published while it is
/// held, so subscribers see changes in the order they were applied.
pub struct ConnectionManager<T> {
    transport: T,
    config: ManagerConfig,
    session: Mutex<Session>,
    state: Observable<SessionState>,
    room_name: Observable<String>,
    game_events: EventFeed<GameEvent>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, config: ManagerConfig) -> Self {
        Self {
            transport,
            config,
            session: Mutex::new(Session::default()),
            state: Observable::new(SessionState::Idle),
            room_name: Observable::new(String::new()),
            game_events: EventFeed::new(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Host a room: advertise `room_name` under `service_id`.
    pub fn start_advertising(
        &self,
        service_id: &ServiceId,
        room_name: &str,
    ) -> Result<(), SessionError> {
        let mut session = self.session.lock();
        self.begin(&mut session, Role::Host, "start advertising")?;
        self.set_room_name(&mut session, room_name);

        match self.transport.start_advertising(service_id, room_name) {
            Ok(()) => {
                info!(service = %service_id, room = room_name, "advertising room");
                Ok(())
            }
            Err(err) => {
                let err = SessionError::TransportUnavailable(err.to_string());
                self.fail(&mut session, err.clone());
                Err(err)
            }
        }
    }

    /// Join a room: discover advertisers under `service_id` and dial them.
    pub fn start_discovery(&self, service_id: &ServiceId) -> Result<(), SessionError> {
        let mut session = self.session.lock();
        self.begin(&mut session, Role::Client, "start discovery")?;

        match self.transport.start_discovery(service_id) {
            Ok(()) => {
                info!(service = %service_id, "discovering rooms");
                Ok(())
            }
            Err(err) => {
                let err = SessionError::TransportUnavailable(err.to_string());
                self.fail(&mut session, err.clone());
                Err(err)
            }
        }
    }

    /// Encode once and send to every connected peer. Failures are logged and
    /// reported, never abort the fan-out.
    pub fn broadcast(&self, kind: &str, body: &str) -> BroadcastReport {
        let session = self.session.lock();
        let payload = encode(kind, body);
        let mut report = BroadcastReport::default();

        for peer in session.roster.ids() {
            match self.transport.send(&peer, payload.clone()) {
                Ok(()) => report.delivered.push(peer),
                Err(err) => {
                    let err = SessionError::SendFailure {
                        peer: peer.clone(),
                        reason: err.to_string(),
                    };
                    warn!(%err, "broadcast send failed");
                    report.failed.push((peer, err));
                }
            }
        }

        trace!(
            kind,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "broadcast"
        );
        report
    }

    /// Send to a single connected peer.
    pub fn send(&self, peer: &PeerId, kind: &str, body: &str) -> Result<(), SessionError> {
        let session = self.session.lock();
        if !session.roster.contains(peer) {
            return Err(SessionError::SendFailure {
                peer: peer.clone(),
                reason: "peer not in roster".into(),
            });
        }
        self.transport
            .send(peer, encode(kind, body))
            .map_err(|err| SessionError::SendFailure {
                peer: peer.clone(),
                reason: err.to_string(),
            })
    }

    /// Tear everything down and return to `Idle`. Idempotent.
    pub fn stop_all(&self) {
        let mut session = self.session.lock();
        self.transport.stop_all_endpoints();
        self.reset(&mut session);

        if let Err(err) = session.machine.apply(SessionInput::Stop) {
            debug!(%err, "stop transition rejected");
        }
        if self.state.set_if_changed(SessionState::Idle) {
            info!("session stopped");
        }
    }

    /// Apply one transport event. Events that arrive while idle are stale
    /// and dropped. Connection results are only honoured for endpoints this
    /// session is handshaking with, and payloads only from roster members, so
    /// events queued before a `stop_all` cannot leak into the next session.
    pub fn handle_event(&self, event: TransportEvent) {
        let mut session = self.session.lock();
        let state = session.machine.state();
        if !state.is_active() {
            debug!(event = event.name(), "dropping transport event while idle");
            return;
        }
        trace!(event = event.name(), peer = ?event.peer(), %state, "transport event");

        match event {
            TransportEvent::ConnectionRequested { peer, name } => {
                self.handle_connection_requested(&mut session, peer, name)
            }
            TransportEvent::ConnectionResult { peer, outcome } => {
                self.handle_connection_result(&mut session, peer, outcome)
            }
            TransportEvent::Disconnected { peer } => self.handle_disconnected(&mut session, peer),
            TransportEvent::EndpointFound { peer, name } => {
                self.handle_endpoint_found(&mut session, peer, name)
            }
            TransportEvent::EndpointLost { peer } => {
                if session.pending.remove(&peer).is_some() {
                    debug!(%peer, "pending endpoint lost");
                }
            }
            TransportEvent::PayloadReceived { peer, payload } => {
                self.handle_payload(&mut session, peer, &payload)
            }
            TransportEvent::TransferUpdate { peer, status } => on_transfer_update(&peer, status),
            TransportEvent::StartFailed { reason } => {
                self.fail(&mut session, SessionError::TransportUnavailable(reason))
            }
        }
    }

    /// A handshake finished. Success joins the roster; anything else is an error.
    pub fn on_connection_result(&self, peer: PeerId, outcome: ConnectionOutcome) {
        self.handle_event(TransportEvent::ConnectionResult { peer, outcome });
    }

    /// A connected peer went away.
    pub fn on_disconnected(&self, peer: PeerId) {
        self.handle_event(TransportEvent::Disconnected { peer });
    }

    /// Decode and route bytes received from `peer`.
    pub fn on_payload_received(&self, peer: PeerId, payload: Bytes) {
        self.handle_event(TransportEvent::PayloadReceived { peer, payload });
    }

    /// Feed events into [`Self::handle_event`] until every sink is dropped.
    pub async fn drive(&self, mut events: TransportEvents) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("transport event channel closed");
    }

    pub fn subscribe_roster(&self) -> Subscription<Vec<Peer>> {
        self.session.lock().roster.subscribe()
    }

    pub fn subscribe_state(&self) -> Subscription<SessionState> {
        self.state.subscribe()
    }

    pub fn subscribe_room_name(&self) -> Subscription<String> {
        self.room_name.subscribe()
    }

    /// Game events from now on. Nothing is replayed.
    pub fn subscribe_game_events(&self) -> Subscription<GameEvent> {
        self.game_events.subscribe()
    }

    pub fn roster(&self) -> Vec<Peer> {
        self.session.lock().roster.snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().machine.state()
    }

    pub fn role(&self) -> Option<Role> {
        self.session.lock().machine.role()
    }

    pub fn room_name(&self) -> String {
        self.session.lock().room.name.clone()
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.session.lock().last_error.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.session.lock();
        SessionSnapshot {
            state: session.machine.state(),
            role: session.machine.role(),
            room_name: session.room.name.clone(),
            roster: session.roster.snapshot(),
            last_error: session.last_error.clone(),
        }
    }

    /// Validate and apply a start. Starting from `Error` is a cold restart.
    fn begin(
        &self,
        session: &mut Session,
        role: Role,
        operation: &'static str,
    ) -> Result<(), SessionError> {
        let state = session.machine.state();
        if !state.can_start() {
            debug!(operation, %state, "ignoring start");
            return Err(SessionError::InvalidState { operation, state });
        }
        if state == SessionState::Error {
            debug!("cold restart from error");
            self.transport.stop_all_endpoints();
            self.reset(session);
        }

        session
            .machine
            .apply(SessionInput::Start(role))
            .map_err(|_| SessionError::InvalidState { operation, state })?;
        self.publish_state(session);
        Ok(())
    }

    /// Clear roster, pending handshakes, room and last error.
    fn reset(&self, session: &mut Session) {
        session.roster.clear();
        session.pending.clear();
        session.last_error = None;
        self.set_room_name(session, "");
    }

    fn fail(&self, session: &mut Session, err: SessionError) {
        warn!(%err, "session error");
        session.last_error = Some(err);
        if session.machine.apply(SessionInput::Failure).is_ok() {
            self.publish_state(session);
        }
    }

    fn publish_state(&self, session: &Session) {
        let state = session.machine.state();
        if self.state.set_if_changed(state) {
            debug!(%state, "session state changed");
        }
    }

    fn set_room_name(&self, session: &mut Session, name: &str) {
        if session.room.name != name {
            session.room = RoomMetadata::new(name);
        }
        self.room_name.set_if_changed(name.to_owned());
    }

    fn handle_connection_requested(&self, session: &mut Session, peer: PeerId, name: String) {
        if session.machine.state() == SessionState::Error {
            debug!(%peer, "not accepting while in error");
            return;
        }
        if session.roster.contains(&peer) {
            trace!(%peer, "connection request from connected peer");
            return;
        }
        // A request for an endpoint we dialled already holds a slot.
        let reserved = session.pending.contains_key(&peer);
        if !reserved && !self.config.has_capacity(session.occupied()) {
            info!(%peer, %name, "room full, leaving request unanswered");
            return;
        }

        debug!(%peer, %name, "accepting connection");
        session.pending.insert(peer.clone(), name);
        if let Err(err) = self.transport.accept_connection(&peer) {
            session.pending.remove(&peer);
            self.fail(
                session,
                SessionError::ConnectionError {
                    peer,
                    reason: err.to_string(),
                },
            );
        }
    }

    fn handle_connection_result(
        &self,
        session: &mut Session,
        peer: PeerId,
        outcome: ConnectionOutcome,
    ) {
        let Some(name) = session.pending.remove(&peer) else {
            trace!(
                %peer,
                success = outcome.is_success(),
                "result for endpoint not in handshake"
            );
            return;
        };
        match outcome {
            ConnectionOutcome::Success => {
                let member = if name.trim().is_empty() {
                    Peer::unnamed(peer.clone())
                } else {
                    Peer::new(peer.clone(), name)
                };
                let name = member.display_name.clone();
                if !session.roster.add(member) {
                    return;
                }
                info!(%peer, %name, peers = session.roster.len(), "peer connected");

                if session.machine.apply(SessionInput::ConnectionEstablished).is_ok() {
                    self.publish_state(session);
                }
                self.announce_room(session, &peer);
            }
            ConnectionOutcome::Rejected => {
                self.fail(session, SessionError::ConnectionRejected { peer })
            }
            ConnectionOutcome::Error(reason) => {
                self.fail(session, SessionError::ConnectionError { peer, reason })
            }
        }
    }

    fn announce_room(&self, session: &Session, peer: &PeerId) {
        if !self.config.announce_room
            || session.machine.role() != Some(Role::Host)
            || session.room.is_empty()
        {
            return;
        }
        if let Err(err) = self
            .transport
            .send(peer, encode_room_info(&session.room.name))
        {
            let err = SessionError::SendFailure {
                peer: peer.clone(),
                reason: err.to_string(),
            };
            warn!(%err, "room announcement failed");
        }
    }

    fn handle_disconnected(&self, session: &mut Session, peer: PeerId) {
        session.pending.remove(&peer);
        if session.roster.remove(&peer).is_none() {
            trace!(%peer, "disconnect for unknown peer");
            return;
        }
        info!(%peer, peers = session.roster.len(), "peer disconnected");

        if session.roster.is_empty()
            && session.machine.apply(SessionInput::RosterEmptied).is_ok()
        {
            self.publish_state(session);
        }
    }

    fn handle_endpoint_found(&self, session: &mut Session, peer: PeerId, name: String) {
        let state = session.machine.state();
        if session.machine.role() != Some(Role::Client) || state == SessionState::Error {
            trace!(%peer, %state, "ignoring found endpoint");
            return;
        }
        if session.roster.contains(&peer) || session.pending.contains_key(&peer) {
            trace!(%peer, "endpoint already known");
            return;
        }
        if !self.config.has_capacity(session.occupied()) {
            debug!(%peer, "at capacity, not dialling");
            return;
        }

        if state == SessionState::Discovering {
            self.set_room_name(session, &name);
        }

        debug!(%peer, %name, "endpoint found, requesting connection");
        session.pending.insert(peer.clone(), name);
        if let Err(err) = self
            .transport
            .request_connection(&self.config.local_name, &peer)
        {
            session.pending.remove(&peer);
            self.fail(
                session,
                SessionError::ConnectionError {
                    peer,
                    reason: err.to_string(),
                },
            );
        }
    }

    fn handle_payload(&self, session: &mut Session, peer: PeerId, payload: &[u8]) {
        let Some(member) = session.roster.get(&peer) else {
            trace!(%peer, "dropping payload from endpoint outside the roster");
            return;
        };
        trace!(%peer, name = %member.display_name, bytes = payload.len(), "payload received");

        let envelope = match decode(payload, peer.clone()) {
            Ok(envelope) => envelope,
            Err(source) => {
                let err = SessionError::Decode { peer, source };
                warn!(%err, "dropping message");
                return;
            }
        };

        match route(envelope) {
            Inbound::RoomInfo {
                room_name,
                sender_id,
            } => {
                debug!(peer = %sender_id, room = %room_name, "room info received");
                self.set_room_name(session, &room_name);
            }
            Inbound::Game(event) => {
                trace!(peer = %event.sender_id, kind = %event.kind, "game event");
                self.game_events.emit(event);
            }
        }
    }
}

impl<T: Transport + 'static> ConnectionManager<T> {
    /// Run [`Self::drive`] on the current tokio runtime.
    pub fn spawn_driver(self: &Arc<Self>, events: TransportEvents) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.drive(events).await })
    }
}

fn on_transfer_update(peer: &PeerId, status: TransferStatus) {
    match status {
        TransferStatus::InProgress { .. } => {
            if let Some(percent) = status.progress_percent() {
                trace!(%peer, percent, "transfer in progress");
            }
        }
        TransferStatus::Success => trace!(%peer, "transfer complete"),
        TransferStatus::Failure => {
            let err = SessionError::SendFailure {
                peer: peer.clone(),
                reason: "transfer failed".into(),
            };
            warn!(%err, "transfer failed");
        }
    }
}

impl<T> fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session.lock();
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("state", &session.machine.state())
            .field("peers", &session.roster.len())
            .finish_non_exhaustive()
    }
}
