//! Install session state machine.
//!
//! ```text
//! Idle ─► Fetching ─┬─► FetchFailed { reason } ──(Restart)──► Idle
//!                   └─► Ready { installed }
//!                           ├─(installed=false)─► Installing ─┬─► Installed
//!                           │                                  └─► Ready { false }
//!                           └─(installed=true)──► Launching ──┬─► Done
//!                                                              └─► Ready { true }
//! Installed ─► Launching
//! Done ─► Launching | Idle
//! ```
//!
//! Out-of-order events are left unhandled; the caller checks the state
//! before dispatching and reports the mismatch.

use statig::prelude::*;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum SessionEvent {
    FetchStarted,
    FetchSucceeded { installed: bool },
    FetchFailed(String),
    InstallStarted,
    InstallSucceeded,
    InstallFailed(String),
    LaunchStarted,
    LaunchSucceeded,
    LaunchFailed(String),
    /// Drop back to `Idle` from a terminal state.
    Restart,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Public view of where a session stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    Idle,
    Fetching,
    FetchFailed(String),
    /// Package info is known. `installed` decides whether the next step
    /// offered is install or launch.
    Ready { installed: bool },
    Installing,
    Installed,
    Launching,
    Done,
}

impl InstallState {
    pub fn name(&self) -> &'static str {
        match self {
            InstallState::Idle => "idle",
            InstallState::Fetching => "fetching",
            InstallState::FetchFailed(_) => "fetch_failed",
            InstallState::Ready { .. } => "ready",
            InstallState::Installing => "installing",
            InstallState::Installed => "installed",
            InstallState::Launching => "launching",
            InstallState::Done => "done",
        }
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SessionMachine;

impl SessionMachine {
    pub fn snapshot(state: &State) -> InstallState {
        match state {
            State::Idle {} => InstallState::Idle,
            State::Fetching {} => InstallState::Fetching,
            State::FetchFailed { reason } => InstallState::FetchFailed(reason.clone()),
            State::Ready { installed } => InstallState::Ready {
                installed: *installed,
            },
            State::Installing {} => InstallState::Installing,
            State::Installed {} => InstallState::Installed,
            State::Launching {} => InstallState::Launching,
            State::Done {} => InstallState::Done,
        }
    }
}

#[state_machine(initial = "State::idle()", state(derive(Debug, Clone, PartialEq)))]
impl SessionMachine {
    #[state]
    fn idle(&mut self, event: &SessionEvent) -> Outcome<State> {
        match event {
            SessionEvent::FetchStarted => Transition(State::fetching()),
            _ => Handled,
        }
    }

    #[state]
    fn fetching(&mut self, event: &SessionEvent) -> Outcome<State> {
        match event {
            SessionEvent::FetchSucceeded { installed } => {
                info!(installed, "package info ready");
                Transition(State::ready(*installed))
            }
            SessionEvent::FetchFailed(reason) => {
                warn!(%reason, "package info fetch failed");
                Transition(State::fetch_failed(reason.clone()))
            }
            _ => Handled,
        }
    }

    #[state]
    fn fetch_failed(&mut self, event: &SessionEvent, reason: &String) -> Outcome<State> {
        match event {
            SessionEvent::Restart => {
                info!(%reason, "restarting after failed fetch");
                Transition(State::idle())
            }
            _ => Handled,
        }
    }

    #[state]
    fn ready(&mut self, event: &SessionEvent, installed: &bool) -> Outcome<State> {
        match event {
            SessionEvent::InstallStarted if !*installed => Transition(State::installing()),
            SessionEvent::LaunchStarted if *installed => Transition(State::launching()),
            _ => Handled,
        }
    }

    #[state]
    fn installing(&mut self, event: &SessionEvent) -> Outcome<State> {
        match event {
            SessionEvent::InstallSucceeded => Transition(State::installed()),
            SessionEvent::InstallFailed(reason) => {
                warn!(%reason, "install failed, offering retry");
                Transition(State::ready(false))
            }
            _ => Handled,
        }
    }

    #[state]
    fn installed(&mut self, event: &SessionEvent) -> Outcome<State> {
        match event {
            SessionEvent::LaunchStarted => Transition(State::launching()),
            _ => Handled,
        }
    }

    #[state]
    fn launching(&mut self, event: &SessionEvent) -> Outcome<State> {
        match event {
            SessionEvent::LaunchSucceeded => Transition(State::done()),
            SessionEvent::LaunchFailed(reason) => {
                warn!(%reason, "launch failed");
                Transition(State::ready(true))
            }
            _ => Handled,
        }
    }

    #[state]
    fn done(&mut self, event: &SessionEvent) -> Outcome<State> {
        match event {
            SessionEvent::LaunchStarted => Transition(State::launching()),
            SessionEvent::Restart => Transition(State::idle()),
            _ => Handled,
        }
    }
}
