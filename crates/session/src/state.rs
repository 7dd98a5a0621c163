//! Session lifecycle transitions.
//!
//! ```text
//!            start(Host)              success
//!   Idle ──────────────▶ Advertising ─────────▶ Connected
//!    │ ▲                      ▲                    │
//!    │ │ stop                 └── roster emptied ──┘
//!    │ │                   (Discovering for Client)
//!    │ └──────────── Error ◀── rejection / failure (any active state)
//!    └─ start(Client) ─▶ Discovering
//! ```
//!
//! `Error` is not terminal: a new start from `Error` is allowed. Nothing here
//! touches the transport; the manager drives side effects.

use huddle_primitives::{Role, SessionState};

/// Inputs to [`SessionMachine::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    Start(Role),
    ConnectionEstablished,
    Failure,
    RosterEmptied,
    Stop,
}

/// A state change, possibly to the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{input:?} is not valid while {from}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub input: SessionInput,
}

/// Current state plus the role it was started with.
#[derive(Debug, Clone, Default)]
pub struct SessionMachine {
    state: SessionState,
    role: Option<Role>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Role of the running session. `None` while idle.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn apply(&mut self, input: SessionInput) -> Result<Transition, InvalidTransition> {
        use SessionState::*;

        let from = self.state;
        let invalid = InvalidTransition { from, input };

        let to = match (input, from) {
            (SessionInput::Start(role), Idle | Error) => {
                self.role = Some(role);
                role.searching_state()
            }
            (SessionInput::Start(_), _) => return Err(invalid),

            (SessionInput::ConnectionEstablished, Advertising | Discovering | Connected) => {
                Connected
            }
            // A late success does not clear a failure.
            (SessionInput::ConnectionEstablished, Error) => Error,
            (SessionInput::ConnectionEstablished, Idle) => return Err(invalid),

            (SessionInput::Failure, Idle) => return Err(invalid),
            (SessionInput::Failure, _) => Error,

            (SessionInput::RosterEmptied, Connected) => match self.role {
                Some(role) => role.searching_state(),
                None => return Err(invalid),
            },
            (SessionInput::RosterEmptied, state) => state,

            (SessionInput::Stop, _) => {
                self.role = None;
                Idle
            }
        };

        self.state = to;
        Ok(Transition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn machine_in(role: Role) -> SessionMachine {
        let mut machine = SessionMachine::new();
        machine.apply(SessionInput::Start(role)).unwrap();
        machine
    }

    #[test]
    fn starts_idle_without_role() {
        let machine = SessionMachine::new();
        assert_eq!(machine.state(), SessionState::Idle);
        assert_eq!(machine.role(), None);
    }

    #[test]
    fn host_path_reverts_to_advertising() {
        let mut machine = machine_in(Role::Host);
        assert_eq!(machine.state(), SessionState::Advertising);

        let t = machine.apply(SessionInput::ConnectionEstablished).unwrap();
        assert!(t.changed());
        assert_eq!(t.to, SessionState::Connected);

        // Second peer joining keeps us connected.
        let t = machine.apply(SessionInput::ConnectionEstablished).unwrap();
        assert!(!t.changed());

        machine.apply(SessionInput::RosterEmptied).unwrap();
        assert_eq!(machine.state(), SessionState::Advertising);
    }

    #[test]
    fn client_path_reverts_to_discovering() {
        let mut machine = machine_in(Role::Client);
        assert_eq!(machine.state(), SessionState::Discovering);
        machine.apply(SessionInput::ConnectionEstablished).unwrap();
        machine.apply(SessionInput::RosterEmptied).unwrap();
        assert_eq!(machine.state(), SessionState::Discovering);
        assert_eq!(machine.role(), Some(Role::Client));
    }

    #[test]
    fn second_start_is_rejected() {
        let mut machine = machine_in(Role::Host);
        machine.apply(SessionInput::ConnectionEstablished).unwrap();

        assert_matches!(
            machine.apply(SessionInput::Start(Role::Client)),
            Err(InvalidTransition { from: SessionState::Connected, .. })
        );
        assert_eq!(machine.state(), SessionState::Connected);
        assert_eq!(machine.role(), Some(Role::Host));
    }

    #[test]
    fn failure_reachable_from_every_active_state() {
        for setup in [
            vec![SessionInput::Start(Role::Host)],
            vec![SessionInput::Start(Role::Client)],
            vec![
                SessionInput::Start(Role::Host),
                SessionInput::ConnectionEstablished,
            ],
        ] {
            let mut machine = SessionMachine::new();
            for input in setup {
                machine.apply(input).unwrap();
            }
            machine.apply(SessionInput::Failure).unwrap();
            assert_eq!(machine.state(), SessionState::Error);
        }

        assert!(SessionMachine::new().apply(SessionInput::Failure).is_err());
    }

    #[test]
    fn error_is_sticky_until_restart() {
        let mut machine = machine_in(Role::Host);
        machine.apply(SessionInput::Failure).unwrap();

        machine.apply(SessionInput::ConnectionEstablished).unwrap();
        machine.apply(SessionInput::RosterEmptied).unwrap();
        assert_eq!(machine.state(), SessionState::Error);

        machine.apply(SessionInput::Start(Role::Client)).unwrap();
        assert_eq!(machine.state(), SessionState::Discovering);
        assert_eq!(machine.role(), Some(Role::Client));
    }

    #[test]
    fn stop_from_anywhere_clears_role() {
        let mut machine = machine_in(Role::Host);
        machine.apply(SessionInput::ConnectionEstablished).unwrap();
        machine.apply(SessionInput::Stop).unwrap();
        assert_eq!(machine.state(), SessionState::Idle);
        assert_eq!(machine.role(), None);

        let t = machine.apply(SessionInput::Stop).unwrap();
        assert!(!t.changed());
    }

    #[test]
    fn roster_emptied_outside_connected_is_noop() {
        let mut machine = machine_in(Role::Host);
        let t = machine.apply(SessionInput::RosterEmptied).unwrap();
        assert!(!t.changed());
        assert_eq!(machine.state(), SessionState::Advertising);
    }
}
