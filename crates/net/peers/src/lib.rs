//! Connected-peer roster and push-style observables.

pub mod events;
pub mod roster;

pub use events::{EventFeed, Observable, Subscription};
pub use roster::Roster;
