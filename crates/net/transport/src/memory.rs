//! In-process proximity medium.
//!
//! Every [`MemoryTransport`] attached to the same [`MemoryMedium`] can hear
//! every other one. Advertising and discovery are scoped by service id. A
//! connection needs both sides to accept before either sees a success, which
//! mirrors how real proximity stacks negotiate. Test hooks can flip a
//! station's radio, sever a link, or make a station refuse handshakes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use huddle_primitives::{PeerId, ServiceId};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    ConnectionOutcome, EventSink, TransferStatus, Transport, TransportError, TransportEvent,
};

#[derive(Debug)]
struct Advert {
    service: ServiceId,
    name: String,
}

#[derive(Debug)]
struct Station {
    sink: EventSink,
    radio_on: bool,
    refuses: bool,
    advertising: Option<Advert>,
    discovering: Option<ServiceId>,
    links: HashSet<PeerId>,
}

impl Station {
    fn new(sink: EventSink) -> Self {
        Self {
            sink,
            radio_on: true,
            refuses: false,
            advertising: None,
            discovering: None,
            links: HashSet::new(),
        }
    }

    fn emit(&self, event: TransportEvent) {
        if !self.sink.emit(event) {
            trace!("event dropped, station receiver closed");
        }
    }

    fn advertises_on(&self, service: &ServiceId) -> Option<&str> {
        match &self.advertising {
            Some(advert) if self.radio_on && &advert.service == service => Some(&advert.name),
            _ => None,
        }
    }
}

type LinkKey = (PeerId, PeerId);

fn link_key(a: &PeerId, b: &PeerId) -> LinkKey {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[derive(Debug, Default)]
struct MediumState {
    stations: HashMap<PeerId, Station>,
    handshakes: HashMap<LinkKey, HashSet<PeerId>>,
}

impl MediumState {
    fn emit_to(&self, id: &PeerId, event: TransportEvent) {
        if let Some(station) = self.stations.get(id) {
            station.emit(event);
        }
    }

    fn ready_station(&mut self, id: &PeerId) -> Result<&mut Station, TransportError> {
        let station = self.stations.get_mut(id).ok_or(TransportError::Closed)?;
        if !station.radio_on {
            return Err(TransportError::Unavailable);
        }
        Ok(station)
    }

    fn advertise(
        &mut self,
        local: &PeerId,
        service: &ServiceId,
        name: &str,
    ) -> Result<(), TransportError> {
        let station = self.ready_station(local)?;
        if station.sink.is_closed() {
            return Err(TransportError::Closed);
        }
        station.advertising = Some(Advert {
            service: service.clone(),
            name: name.to_owned(),
        });
        debug!(endpoint = %local, %service, name, "advertising");

        for (id, other) in &self.stations {
            if id != local && other.radio_on && other.discovering.as_ref() == Some(service) {
                other.emit(TransportEvent::EndpointFound {
                    peer: local.clone(),
                    name: name.to_owned(),
                });
            }
        }
        Ok(())
    }

    fn discover(&mut self, local: &PeerId, service: &ServiceId) -> Result<(), TransportError> {
        let station = self.ready_station(local)?;
        if station.sink.is_closed() {
            return Err(TransportError::Closed);
        }
        station.discovering = Some(service.clone());
        debug!(endpoint = %local, %service, "discovering");

        let Some(station) = self.stations.get(local) else {
            return Err(TransportError::Closed);
        };
        for (id, other) in &self.stations {
            if id == local {
                continue;
            }
            if let Some(name) = other.advertises_on(service) {
                station.emit(TransportEvent::EndpointFound {
                    peer: id.clone(),
                    name: name.to_owned(),
                });
            }
        }
        Ok(())
    }

    fn request(
        &mut self,
        local: &PeerId,
        name: &str,
        target: &PeerId,
    ) -> Result<(), TransportError> {
        let already_linked = self.ready_station(local)?.links.contains(target);
        let key = link_key(local, target);
        if already_linked || self.handshakes.contains_key(&key) {
            trace!(endpoint = %local, peer = %target, "handshake already in progress or linked");
            return Ok(());
        }

        let target_advert = self
            .stations
            .get(target)
            .filter(|station| station.radio_on)
            .and_then(|station| {
                station
                    .advertising
                    .as_ref()
                    .map(|advert| (advert.name.clone(), station.refuses))
            });

        match target_advert {
            None => {
                self.emit_to(
                    local,
                    TransportEvent::ConnectionResult {
                        peer: target.clone(),
                        outcome: ConnectionOutcome::Error("endpoint unreachable".into()),
                    },
                );
            }
            Some((_, true)) => {
                debug!(endpoint = %local, peer = %target, "handshake refused");
                self.emit_to(
                    local,
                    TransportEvent::ConnectionResult {
                        peer: target.clone(),
                        outcome: ConnectionOutcome::Rejected,
                    },
                );
            }
            Some((target_name, false)) => {
                debug!(endpoint = %local, peer = %target, "handshake started");
                self.handshakes.insert(key, HashSet::new());
                self.emit_to(
                    target,
                    TransportEvent::ConnectionRequested {
                        peer: local.clone(),
                        name: name.to_owned(),
                    },
                );
                self.emit_to(
                    local,
                    TransportEvent::ConnectionRequested {
                        peer: target.clone(),
                        name: target_name,
                    },
                );
            }
        }
        Ok(())
    }

    fn accept(&mut self, local: &PeerId, peer: &PeerId) -> Result<(), TransportError> {
        self.ready_station(local)?;
        let key = link_key(local, peer);
        let accepted = self
            .handshakes
            .get_mut(&key)
            .ok_or_else(|| TransportError::UnknownEndpoint(peer.to_string()))?;
        accepted.insert(local.clone());
        if accepted.len() < 2 {
            trace!(endpoint = %local, %peer, "waiting for remote accept");
            return Ok(());
        }

        self.handshakes.remove(&key);
        for (from, to) in [(local, peer), (peer, local)] {
            if let Some(station) = self.stations.get_mut(from) {
                station.links.insert(to.clone());
                station.emit(TransportEvent::ConnectionResult {
                    peer: to.clone(),
                    outcome: ConnectionOutcome::Success,
                });
            }
        }
        debug!(endpoint = %local, %peer, "link established");
        Ok(())
    }

    fn send(
        &mut self,
        local: &PeerId,
        peer: &PeerId,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let station = self.ready_station(local)?;
        if !station.links.contains(peer) {
            return Err(TransportError::NotConnected(peer.to_string()));
        }
        let remote = self
            .stations
            .get(peer)
            .filter(|remote| remote.radio_on)
            .ok_or_else(|| TransportError::NotConnected(peer.to_string()))?;

        let total_bytes = payload.len() as u64;
        remote.emit(TransportEvent::PayloadReceived {
            peer: local.clone(),
            payload,
        });
        trace!(endpoint = %local, %peer, total_bytes, "payload delivered");

        if let Some(station) = self.stations.get(local) {
            station.emit(TransportEvent::TransferUpdate {
                peer: peer.clone(),
                status: TransferStatus::InProgress {
                    bytes_transferred: total_bytes,
                    total_bytes,
                },
            });
            station.emit(TransportEvent::TransferUpdate {
                peer: peer.clone(),
                status: TransferStatus::Success,
            });
        }
        Ok(())
    }

    /// Drop everything `local` has going. Remote sides are always told;
    /// `local` itself only when the loss was forced on it.
    fn release(&mut self, local: &PeerId, notify_local: bool) {
        let Some(station) = self.stations.get_mut(local) else {
            return;
        };
        let advert = station.advertising.take();
        station.discovering = None;
        let links: Vec<PeerId> = station.links.drain().collect();

        if let Some(advert) = advert {
            for (id, other) in &self.stations {
                if id != local && other.discovering.as_ref() == Some(&advert.service) {
                    other.emit(TransportEvent::EndpointLost {
                        peer: local.clone(),
                    });
                }
            }
        }

        for peer in &links {
            if let Some(remote) = self.stations.get_mut(peer) {
                remote.links.remove(local);
                remote.emit(TransportEvent::Disconnected {
                    peer: local.clone(),
                });
            }
            if notify_local {
                self.emit_to(local, TransportEvent::Disconnected { peer: peer.clone() });
            }
        }

        let aborted: Vec<LinkKey> = self
            .handshakes
            .keys()
            .filter(|(a, b)| a == local || b == local)
            .cloned()
            .collect();
        for key in aborted {
            self.handshakes.remove(&key);
            let other = if &key.0 == local { &key.1 } else { &key.0 };
            self.emit_to(
                other,
                TransportEvent::ConnectionResult {
                    peer: local.clone(),
                    outcome: ConnectionOutcome::Error("handshake aborted".into()),
                },
            );
            if notify_local {
                self.emit_to(
                    local,
                    TransportEvent::ConnectionResult {
                        peer: other.clone(),
                        outcome: ConnectionOutcome::Error("handshake aborted".into()),
                    },
                );
            }
        }

        if !links.is_empty() {
            debug!(endpoint = %local, links = links.len(), "endpoints released");
        }
    }
}

/// Shared in-process radio. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    state: Arc<Mutex<MediumState>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a station with endpoint id `id` whose events go to `sink`.
    ///
    /// Re-attaching an id replaces the previous station and drops its links.
    pub fn attach(&self, id: impl Into<PeerId>, sink: EventSink) -> MemoryTransport {
        let id = id.into();
        let mut state = self.state.lock();
        state.release(&id, false);
        state.stations.insert(id.clone(), Station::new(sink));
        debug!(endpoint = %id, "station attached");
        MemoryTransport {
            id,
            medium: self.clone(),
        }
    }

    /// Turn a station's radio on or off. Switching off drops every link and
    /// tells both sides.
    pub fn set_radio(&self, id: &PeerId, on: bool) {
        let mut state = self.state.lock();
        if !on {
            state.release(id, true);
        }
        if let Some(station) = state.stations.get_mut(id) {
            station.radio_on = on;
        }
    }

    /// Make a station reject every incoming handshake.
    pub fn refuse_connections(&self, id: &PeerId, refuse: bool) {
        if let Some(station) = self.state.lock().stations.get_mut(id) {
            station.refuses = refuse;
        }
    }

    /// Sever the link between `a` and `b`. Both sides see a disconnection.
    pub fn disconnect(&self, a: &PeerId, b: &PeerId) {
        let mut state = self.state.lock();
        let linked = state
            .stations
            .get(a)
            .is_some_and(|station| station.links.contains(b));
        if !linked {
            return;
        }
        for (from, to) in [(a, b), (b, a)] {
            if let Some(station) = state.stations.get_mut(from) {
                station.links.remove(to);
                station.emit(TransportEvent::Disconnected { peer: to.clone() });
            }
        }
        debug!(%a, %b, "link severed");
    }

    pub fn is_linked(&self, a: &PeerId, b: &PeerId) -> bool {
        self.state
            .lock()
            .stations
            .get(a)
            .is_some_and(|station| station.links.contains(b))
    }

    /// Ids of stations currently linked to `id`, sorted.
    pub fn links_of(&self, id: &PeerId) -> Vec<PeerId> {
        let state = self.state.lock();
        let mut links: Vec<PeerId> = state
            .stations
            .get(id)
            .map(|station| station.links.iter().cloned().collect())
            .unwrap_or_default();
        links.sort();
        links
    }

    fn detach(&self, id: &PeerId) {
        let mut state = self.state.lock();
        state.release(id, false);
        state.stations.remove(id);
        debug!(endpoint = %id, "station detached");
    }
}

/// One station on a [`MemoryMedium`]. Detaches when dropped.
#[derive(Debug)]
pub struct MemoryTransport {
    id: PeerId,
    medium: MemoryMedium,
}

impl MemoryTransport {
    /// This station's endpoint id as other stations see it.
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn medium(&self) -> &MemoryMedium {
        &self.medium
    }
}

impl Transport for MemoryTransport {
    fn start_advertising(
        &self,
        service_id: &ServiceId,
        display_name: &str,
    ) -> Result<(), TransportError> {
        self.medium
            .state
            .lock()
            .advertise(&self.id, service_id, display_name)
    }

    fn start_discovery(&self, service_id: &ServiceId) -> Result<(), TransportError> {
        self.medium.state.lock().discover(&self.id, service_id)
    }

    fn request_connection(&self, display_name: &str, peer: &PeerId) -> Result<(), TransportError> {
        self.medium
            .state
            .lock()
            .request(&self.id, display_name, peer)
    }

    fn accept_connection(&self, peer: &PeerId) -> Result<(), TransportError> {
        self.medium.state.lock().accept(&self.id, peer)
    }

    fn send(&self, peer: &PeerId, payload: Bytes) -> Result<(), TransportError> {
        self.medium.state.lock().send(&self.id, peer, payload)
    }

    fn stop_all_endpoints(&self) {
        self.medium.state.lock().release(&self.id, false);
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.medium.detach(&self.id);
    }
}
