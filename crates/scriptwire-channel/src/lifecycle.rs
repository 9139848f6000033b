//! Connection readiness state machine.
//!
//! ```text
//! Initial --Ready--> Ready --Error--> Error
//!    └──────────────Error───────────────┘
//! ```
//!
//! `Error` is terminal. Entering a state yields an [`EntryAction`] for the
//! channel to carry out.

use scriptwire_transport::ConnectionEvent;
use tracing::info;

/// Channel readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Waiting for the connection to open.
    Initial,
    /// Traffic may flow.
    Ready,
    /// Failed or reset. Nothing is sent again.
    Error,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Error
    }

    /// Work to do on entering this state.
    pub fn entry_action(self) -> EntryAction {
        match self {
            Self::Initial => EntryAction::Open,
            Self::Ready => EntryAction::Dispatch,
            Self::Error => EntryAction::Halt,
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Side effect owed on entering a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    /// Ask the connection to open.
    Open,
    /// Flush requests queued while not ready.
    Dispatch,
    /// Stop for good and drop whatever is still queued.
    Halt,
}

/// Next state for `event` in `state`.
pub fn transition(state: State, event: ConnectionEvent) -> State {
    match (state, event) {
        (State::Initial, ConnectionEvent::Ready) => State::Ready,
        (State::Initial | State::Ready, ConnectionEvent::Error) => State::Error,
        (current, _) => current,
    }
}

/// Tracks the current [`State`] and reports entry actions.
#[derive(Debug)]
pub struct Lifecycle {
    state: State,
    started: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: State::Initial,
            started: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Enter the initial state. Only the first call yields an action.
    pub fn start(&mut self) -> Option<EntryAction> {
        if self.started || self.state != State::Initial {
            return None;
        }
        self.started = true;
        Some(State::Initial.entry_action())
    }

    /// Apply a connection signal. Yields an action only when the state
    /// changes.
    pub fn on_event(&mut self, event: ConnectionEvent) -> Option<EntryAction> {
        let next = transition(self.state, event);
        if next == self.state {
            return None;
        }
        info!(from = %self.state, to = %next, event = event.name(), "channel state changed");
        self.state = next;
        Some(next.entry_action())
    }

    /// Force the terminal state regardless of signals.
    pub fn halt(&mut self) -> Option<EntryAction> {
        self.on_event(ConnectionEvent::Error)
    }
}
