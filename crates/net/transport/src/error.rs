/// Synchronous failure of a transport call.
///
/// Asynchronous failures (rejections, lost links) arrive as events instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The radio is off or the platform refused the operation.
    #[error("transport unavailable")]
    Unavailable,
    /// No connection handshake is in progress with this endpoint.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
    /// There is no established link to this endpoint.
    #[error("not connected to endpoint: {0}")]
    NotConnected(String),
    /// Nobody is listening for this transport's events anymore.
    #[error("transport closed")]
    Closed,
}
