//! Session orchestration for nearby multiplayer lobbies.
//!
//! [`ConnectionManager`] owns the lifecycle of one local device's session:
//! it starts advertising (host) or discovery (client) on a
//! [`Transport`](huddle_net_transport::Transport), reacts to the transport's
//! asynchronous events, keeps the roster of connected peers, and exchanges
//! JSON envelopes with them. State, roster, room name and game events are
//! exposed as push-style subscriptions.

pub mod config;
mod error;
mod manager;
pub mod state;

pub use config::ManagerConfig;
pub use error::SessionError;
pub use manager::{BroadcastReport, ConnectionManager, SessionSnapshot};
pub use state::{SessionMachine, Transition};

pub use huddle_net_codec::GameEvent;
pub use huddle_net_peers::Subscription;
