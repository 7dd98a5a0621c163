//! Ordered set of connected peers with change publication.

use hashlink::LinkedHashMap;
use huddle_primitives::{Peer, PeerId};
use tracing::{debug, trace};

use crate::events::{Observable, Subscription};

/// The live set of connected peers, in arrival order, unique by id.
///
/// Every mutation publishes the full roster (not a diff) to subscribers.
/// The roster is not internally synchronised beyond its observable; owners
/// serialise mutations themselves.
#[derive(Debug)]
pub struct Roster {
    peers: LinkedHashMap<PeerId, Peer>,
    updates: Observable<Vec<Peer>>,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    pub fn new() -> Self {
        Self {
            peers: LinkedHashMap::new(),
            updates: Observable::new(Vec::new()),
        }
    }

    /// Insert a peer unless its id is already present. Returns true if inserted.
    pub fn add(&mut self, peer: Peer) -> bool {
        if self.peers.contains_key(&peer.id) {
            trace!(peer = %peer.id, "peer already in roster");
            return false;
        }

        debug!(peer = %peer.id, name = %peer.display_name, "peer added to roster");
        self.peers.insert(peer.id.clone(), peer);
        self.publish();
        true
    }

    /// Remove a peer by id. Absent ids are a no-op.
    pub fn remove(&mut self, id: &PeerId) -> Option<Peer> {
        let removed = self.peers.remove(id)?;
        debug!(peer = %id, remaining = self.peers.len(), "peer removed from roster");
        self.publish();
        Some(removed)
    }

    /// Remove everyone. Publishes only if the roster was non-empty.
    pub fn clear(&mut self) {
        if self.peers.is_empty() {
            return;
        }
        self.peers.clear();
        self.publish();
    }

    /// Immutable copy in arrival order.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.peers.values().cloned().collect()
    }

    pub fn get(&self, id: &PeerId) -> Option<&Peer> {
        self.peers.get(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Current roster first, then one full snapshot per mutation.
    pub fn subscribe(&self) -> Subscription<Vec<Peer>> {
        self.updates.subscribe()
    }

    fn publish(&self) {
        self.updates.set(self.snapshot());
    }
}
