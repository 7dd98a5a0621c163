//! Asynchronous transport events and the channel that carries them.

use bytes::Bytes;
use huddle_primitives::PeerId;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Outcome of a connection handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Success,
    /// The remote side refused the connection.
    Rejected,
    /// The handshake failed for another reason.
    Error(String),
}

impl ConnectionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Progress of an outgoing payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    InProgress {
        bytes_transferred: u64,
        total_bytes: u64,
    },
    Success,
    Failure,
}

impl TransferStatus {
    /// Whole-number percentage for in-progress transfers with a known size.
    pub fn progress_percent(&self) -> Option<u64> {
        match *self {
            Self::InProgress {
                bytes_transferred,
                total_bytes,
            } if total_bytes > 0 => Some(bytes_transferred.saturating_mul(100) / total_bytes),
            _ => None,
        }
    }
}

/// Everything a transport reports after the fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A handshake started with `peer`, either side may have initiated it.
    ConnectionRequested { peer: PeerId, name: String },
    ConnectionResult {
        peer: PeerId,
        outcome: ConnectionOutcome,
    },
    Disconnected { peer: PeerId },
    /// An advertiser was found while discovering.
    EndpointFound { peer: PeerId, name: String },
    EndpointLost { peer: PeerId },
    PayloadReceived { peer: PeerId, payload: Bytes },
    TransferUpdate { peer: PeerId, status: TransferStatus },
    /// Advertising or discovery failed after the start call returned.
    StartFailed { reason: String },
}

impl TransportEvent {
    /// Endpoint the event concerns, if any.
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            Self::ConnectionRequested { peer, .. }
            | Self::ConnectionResult { peer, .. }
            | Self::Disconnected { peer }
            | Self::EndpointFound { peer, .. }
            | Self::EndpointLost { peer }
            | Self::PayloadReceived { peer, .. }
            | Self::TransferUpdate { peer, .. } => Some(peer),
            Self::StartFailed { .. } => None,
        }
    }

    /// Short variant name for logs. Never includes payload bytes.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionRequested { .. } => "connection_requested",
            Self::ConnectionResult { .. } => "connection_result",
            Self::Disconnected { .. } => "disconnected",
            Self::EndpointFound { .. } => "endpoint_found",
            Self::EndpointLost { .. } => "endpoint_lost",
            Self::PayloadReceived { .. } => "payload_received",
            Self::TransferUpdate { .. } => "transfer_update",
            Self::StartFailed { .. } => "start_failed",
        }
    }
}

/// Create a connected sink/receiver pair.
pub fn event_channel() -> (EventSink, TransportEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, TransportEvents { rx })
}

/// Sending half, owned by the transport.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    /// Queue an event. Returns false if the receiver is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, consumed by the session driver.
#[derive(Debug)]
pub struct TransportEvents {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportEvents {
    /// Next event. `None` once every sink is dropped.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }

    /// All events queued so far.
    pub fn drain(&mut self) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<TransportEvent> {
        UnboundedReceiverStream::new(self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent_only_for_sized_transfers() {
        let half = TransferStatus::InProgress {
            bytes_transferred: 50,
            total_bytes: 200,
        };
        assert_eq!(half.progress_percent(), Some(25));

        let unknown = TransferStatus::InProgress {
            bytes_transferred: 50,
            total_bytes: 0,
        };
        assert_eq!(unknown.progress_percent(), None);
        assert_eq!(TransferStatus::Success.progress_percent(), None);
    }

    #[test]
    fn sink_reports_closed_receiver() {
        let (sink, events) = event_channel();
        assert!(sink.emit(TransportEvent::StartFailed {
            reason: "radio".into()
        }));
        drop(events);
        assert!(sink.is_closed());
        assert!(!sink.emit(TransportEvent::EndpointLost { peer: "p".into() }));
    }

    #[tokio::test]
    async fn events_arrive_in_emit_order() {
        let (sink, mut events) = event_channel();
        sink.emit(TransportEvent::EndpointFound {
            peer: "a".into(),
            name: "Room".into(),
        });
        sink.emit(TransportEvent::EndpointLost { peer: "a".into() });

        assert_eq!(
            events.recv().await.and_then(|e| e.peer().cloned()),
            Some(PeerId::from("a"))
        );
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::EndpointLost { .. })
        ));
        assert!(events.try_recv().is_none());
    }
}
