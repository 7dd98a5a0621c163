//! Proximity transport capability.
//!
//! A [`Transport`] advertises, discovers, connects and moves opaque byte
//! payloads between nearby endpoints. Calls return immediately; outcomes are
//! reported later as [`TransportEvent`]s pushed into an [`EventSink`]. A
//! transport never calls back into its owner synchronously.
//!
//! [`MemoryMedium`] simulates a shared radio in-process.

use auto_impl::auto_impl;
use bytes::Bytes;
use huddle_primitives::{PeerId, ServiceId};

mod error;
mod event;
mod memory;

pub use error::TransportError;
pub use event::{
    ConnectionOutcome, EventSink, TransferStatus, TransportEvent, TransportEvents, event_channel,
};
pub use memory::{MemoryMedium, MemoryTransport};

/// Platform proximity transport.
#[auto_impl(&, Arc, Box)]
pub trait Transport: Send + Sync {
    /// Make this device discoverable under `service_id`.
    fn start_advertising(
        &self,
        service_id: &ServiceId,
        display_name: &str,
    ) -> Result<(), TransportError>;

    /// Look for advertisers under `service_id`.
    fn start_discovery(&self, service_id: &ServiceId) -> Result<(), TransportError>;

    /// Begin a handshake with a discovered endpoint.
    fn request_connection(&self, display_name: &str, peer: &PeerId) -> Result<(), TransportError>;

    /// Accept a pending handshake.
    fn accept_connection(&self, peer: &PeerId) -> Result<(), TransportError>;

    fn send(&self, peer: &PeerId, payload: Bytes) -> Result<(), TransportError>;

    /// Stop advertising and discovery and drop every link. Never fails.
    fn stop_all_endpoints(&self);
}
