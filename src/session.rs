//! One activation, end to end: fetch, then install or launch.
//!
//! [`Session`] ties the metadata client and the install orchestrator to the
//! [`SessionMachine`]. The machine is only touched between awaits, so readers
//! always see a settled [`InstallState`].

use std::sync::Mutex;

use statig::prelude::*;
use tracing::{info, warn};

use crate::activation::{ActivationRequest, PackageQuery};
use crate::error::SessionError;
use crate::install::{InstallHost, InstallOrchestrator, InstallOutcome};
use crate::package_info::{MetadataTransport, PackageInfo, PackageInfoClient};
use crate::state_machine::{InstallState, SessionEvent, SessionMachine};

pub struct Session<T, H> {
    client: PackageInfoClient<T>,
    orchestrator: InstallOrchestrator<H>,
    machine: Mutex<StateMachine<SessionMachine>>,
    package: Mutex<Option<PackageInfo>>,
}

impl<T: MetadataTransport, H: InstallHost> Session<T, H> {
    pub fn new(client: PackageInfoClient<T>, orchestrator: InstallOrchestrator<H>) -> Self {
        Self {
            client,
            orchestrator,
            machine: Mutex::new(SessionMachine.state_machine()),
            package: Mutex::new(None),
        }
    }

    pub fn state(&self) -> InstallState {
        let sm = self.machine.lock().unwrap_or_else(|e| e.into_inner());
        SessionMachine::snapshot(sm.state())
    }

    /// Package info from the last successful fetch.
    pub fn package(&self) -> Option<PackageInfo> {
        self.package
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn orchestrator(&self) -> &InstallOrchestrator<H> {
        &self.orchestrator
    }

    fn dispatch(&self, event: SessionEvent) -> InstallState {
        let mut sm = self.machine.lock().unwrap_or_else(|e| e.into_inner());
        sm.handle(&event);
        SessionMachine::snapshot(sm.state())
    }

    /// Dispatch `event` only if the current state accepts `operation`.
    fn begin(
        &self,
        operation: &'static str,
        allowed: impl Fn(&InstallState) -> bool,
        event: SessionEvent,
    ) -> Result<(), SessionError> {
        let mut sm = self.machine.lock().unwrap_or_else(|e| e.into_inner());
        let current = SessionMachine::snapshot(sm.state());
        if !allowed(&current) {
            return Err(SessionError::OutOfOrder {
                state: current.name(),
                operation,
            });
        }
        sm.handle(&event);
        Ok(())
    }

    /// Resolve the activation parameters into package info and decide
    /// whether install or launch comes next.
    pub async fn fetch(&self, request: &ActivationRequest) -> Result<PackageInfo, SessionError> {
        self.begin(
            "fetch",
            |s| matches!(s, InstallState::Idle),
            SessionEvent::FetchStarted,
        )?;

        let result = match PackageQuery::from_request(request) {
            Ok(query) => self
                .client
                .fetch(&query.item_id, &query.form_number)
                .await
                .map_err(SessionError::from),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(info) => {
                let installed = self.orchestrator.check_installed(&info.install_path);
                *self.package.lock().unwrap_or_else(|e| e.into_inner()) = Some(info.clone());
                self.dispatch(SessionEvent::FetchSucceeded { installed });
                Ok(info)
            }
            Err(e) => {
                self.dispatch(SessionEvent::FetchFailed(e.to_string()));
                Err(e)
            }
        }
    }

    pub async fn install(&self) -> Result<InstallOutcome, SessionError> {
        self.begin(
            "install",
            |s| matches!(s, InstallState::Ready { installed: false }),
            SessionEvent::InstallStarted,
        )?;
        let info = self.current_package("install")?;

        match self.orchestrator.install(&info).await {
            Ok(outcome) => {
                info!(?outcome, "install complete");
                self.dispatch(SessionEvent::InstallSucceeded);
                Ok(outcome)
            }
            Err(e) => {
                self.dispatch(SessionEvent::InstallFailed(e.to_string()));
                Err(e.into())
            }
        }
    }

    pub async fn launch(&self) -> Result<(), SessionError> {
        self.begin(
            "launch",
            |s| {
                matches!(
                    s,
                    InstallState::Ready { installed: true } | InstallState::Installed | InstallState::Done
                )
            },
            SessionEvent::LaunchStarted,
        )?;
        let info = self.current_package("launch")?;

        match self.orchestrator.launch(&info).await {
            Ok(()) => {
                self.dispatch(SessionEvent::LaunchSucceeded);
                Ok(())
            }
            Err(e) => {
                self.dispatch(SessionEvent::LaunchFailed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Install when missing, then open. Already-installed packages go
    /// straight to launch.
    pub async fn install_and_launch(&self) -> Result<(), SessionError> {
        if matches!(self.state(), InstallState::Ready { installed: false }) {
            self.install().await?;
        }
        self.launch().await
    }

    /// Back to `Idle` from `FetchFailed` or `Done`.
    pub fn restart(&self) -> InstallState {
        let state = self.dispatch(SessionEvent::Restart);
        if state == InstallState::Idle {
            *self.package.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
        state
    }

    fn current_package(&self, operation: &'static str) -> Result<PackageInfo, SessionError> {
        self.package().ok_or_else(|| {
            warn!(operation, "no package info loaded");
            SessionError::OutOfOrder {
                state: "idle",
                operation,
            }
        })
    }
}
