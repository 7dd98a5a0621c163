use huddle_net_codec::DecodeError;
use huddle_primitives::{PeerId, SessionState};

/// Session failures. None of them are fatal; `stop_all` always recovers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Advertising or discovery could not start.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("connection to {peer} rejected")]
    ConnectionRejected { peer: PeerId },
    #[error("connection to {peer} failed: {reason}")]
    ConnectionError { peer: PeerId, reason: String },
    /// Inbound message dropped.
    #[error("undecodable message from {peer}: {source}")]
    Decode {
        peer: PeerId,
        #[source]
        source: DecodeError,
    },
    #[error("send to {peer} failed: {reason}")]
    SendFailure { peer: PeerId, reason: String },
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}
