//! Install orchestration.
//!
//! Picks the install pathway for a [`PackageInfo`], runs it under a hard time
//! bound, and reconciles the result with the filesystem. The installed-check
//! is the only source of truth; exit codes are kept as advisory detail.
//!
//! An in-flight `jamf policy` run is not cancelled if the process exits
//! early: the policy keeps running in the background.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::config::Config;
use crate::error::{InstallError, LaunchError};
use crate::package_info::PackageInfo;

pub mod host;

pub use host::{InstallHost, ProcessExit, SystemHost};

/// Which mechanism performed (or would perform) an install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pathway {
    /// Administrative jamf policy run.
    Primary,
    /// Liquit ShellAPI agent.
    SecondaryAgent,
}

impl fmt::Display for Pathway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pathway::Primary => f.write_str("jamf policy"),
            Pathway::SecondaryAgent => f.write_str("Liquit agent"),
        }
    }
}

/// Result of a successful [`InstallOrchestrator::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The app was already present; nothing was run.
    AlreadyInstalled,
    Installed {
        pathway: Pathway,
        /// Whether the jamf worker process was ever seen while polling.
        worker_observed: bool,
        /// Non-zero exit detail from the pathway, if any.
        advisory: Option<String>,
        elapsed: Duration,
    },
}

/// Tunables of the orchestrator, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct InstallSettings {
    pub applications_root: PathBuf,
    pub secondary_enabled: bool,
    pub agent_executable: PathBuf,
    pub poll_attempts: u32,
    pub poll_delay: Duration,
    pub install_timeout: Duration,
}

impl InstallSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            applications_root: config.install.applications_root.clone(),
            secondary_enabled: config.secondary_agent.enabled,
            agent_executable: config.secondary_agent.executable.clone(),
            poll_attempts: config.install.poll_attempts,
            poll_delay: config.install.poll_delay(),
            install_timeout: config.install.install_timeout(),
        }
    }
}

/// Resolve a detection path under the applications root. The result never
/// leaves the root: leading `/`, `.` and `..` components are dropped.
pub fn resolve_app_path(applications_root: &Path, path: &str) -> PathBuf {
    let mut resolved = applications_root.to_path_buf();
    for component in Path::new(path).components() {
        if let Component::Normal(part) = component {
            resolved.push(part);
        }
    }
    resolved
}

/// Policy and agent ids are interpolated into a privileged shell command, so
/// only plain identifiers are accepted.
fn is_plain_identifier(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs installs and launches, one at a time.
pub struct InstallOrchestrator<H> {
    host: H,
    settings: InstallSettings,
    in_flight: AtomicBool,
    span: Span,
}

/// Clears the in-flight flag when the operation ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<H: InstallHost> InstallOrchestrator<H> {
    pub fn new(host: H, settings: InstallSettings) -> Self {
        let span = info_span!(
            "install",
            root = %settings.applications_root.display()
        );
        Self {
            host,
            settings,
            in_flight: AtomicBool::new(false),
            span,
        }
    }

    pub fn settings(&self) -> &InstallSettings {
        &self.settings
    }

    fn begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    /// Whether an install or launch is currently running.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Existence check of `path` under the applications root. No side effects.
    pub fn check_installed(&self, path: &str) -> bool {
        let resolved = resolve_app_path(&self.settings.applications_root, path);
        let exists = self.host.path_exists(&resolved);
        debug!(parent: &self.span, path = %resolved.display(), exists, "installed check");
        exists
    }

    /// The secondary agent is used only when enabled, named by the package,
    /// and present on disk.
    pub fn secondary_agent_available(&self, info: &PackageInfo) -> bool {
        self.settings.secondary_enabled
            && info.has_secondary_agent()
            && self.host.path_exists(&self.settings.agent_executable)
    }

    /// Pathway `install` would take for `info`.
    pub fn choose_pathway(&self, info: &PackageInfo) -> Pathway {
        if self.secondary_agent_available(info) {
            Pathway::SecondaryAgent
        } else {
            Pathway::Primary
        }
    }

    /// Install the package unless it is already present.
    pub async fn install(&self, info: &PackageInfo) -> Result<InstallOutcome, InstallError> {
        let _guard = self.begin().ok_or(InstallError::Busy)?;
        let span = info_span!(parent: &self.span, "run", name = %info.display_name);
        self.install_inner(info).instrument(span).await
    }

    async fn install_inner(&self, info: &PackageInfo) -> Result<InstallOutcome, InstallError> {
        if self.check_installed(&info.install_path) {
            info!(path = %info.install_path, "already installed");
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        let started = Instant::now();
        let deadline = started + self.settings.install_timeout;
        let pathway = self.choose_pathway(info);
        info!(%pathway, "starting installation");

        let (worker_observed, advisory) = match pathway {
            Pathway::SecondaryAgent => (false, self.run_secondary(info, deadline).await?),
            Pathway::Primary => self.run_primary(info, deadline).await?,
        };

        let installed = self.check_installed(&info.install_path);
        info!(%pathway, installed, "installation finished");

        if installed {
            Ok(InstallOutcome::Installed {
                pathway,
                worker_observed,
                advisory,
                elapsed: started.elapsed(),
            })
        } else {
            Err(InstallError::NotInstalled {
                path: info.install_path.clone(),
                pathway,
                cause: advisory,
            })
        }
    }

    async fn run_secondary(
        &self,
        info: &PackageInfo,
        deadline: Instant,
    ) -> Result<Option<String>, InstallError> {
        let agent_id = &info.secondary_agent_id;
        if !is_plain_identifier(agent_id) {
            return Err(InstallError::NoPathway(format!(
                "Liquit id `{agent_id}` contains unsupported characters"
            )));
        }

        let run = self
            .host
            .run_agent(&self.settings.agent_executable, agent_id);
        let exit = tokio::time::timeout_at(deadline, run)
            .await
            .map_err(|_| InstallError::Timeout {
                waited: self.settings.install_timeout,
            })?
            .map_err(|e| InstallError::Spawn {
                pathway: Pathway::SecondaryAgent,
                cause: e.to_string(),
            })?;

        info!(%exit, "Liquit ShellAPI process closed");
        Ok((!exit.success()).then(|| format!("Liquit agent {exit}")))
    }

    async fn run_primary(
        &self,
        info: &PackageInfo,
        deadline: Instant,
    ) -> Result<(bool, Option<String>), InstallError> {
        let policy_id = &info.primary_install_id;
        if policy_id.is_empty() {
            return Err(InstallError::NoPathway(
                "package has no jamf policy id and no usable Liquit agent".to_string(),
            ));
        }
        if !is_plain_identifier(policy_id) {
            return Err(InstallError::NoPathway(format!(
                "jamf policy id `{policy_id}` contains unsupported characters"
            )));
        }

        info!(policy_id = %policy_id, "Monitoring jamf policy");
        let exit = tokio::time::timeout_at(deadline, self.host.run_policy(policy_id))
            .await
            .map_err(|_| InstallError::Timeout {
                waited: self.settings.install_timeout,
            })?
            .map_err(|e| InstallError::Spawn {
                pathway: Pathway::Primary,
                cause: e.to_string(),
            })?;

        if !exit.success() {
            // The admin prompt was declined or the policy failed to start;
            // there is no worker to wait for.
            return Ok((false, Some(format!("osascript {exit}"))));
        }

        let observed = self.wait_for_worker(deadline).await?;
        Ok((observed, None))
    }

    /// Sample the jamf worker up to `poll_attempts` times. If it shows up,
    /// wait for it to exit, bounded by `deadline`. Returns whether it was seen.
    async fn wait_for_worker(&self, deadline: Instant) -> Result<bool, InstallError> {
        let delay = self.settings.poll_delay;

        let mut observed = false;
        for attempt in 1..=self.settings.poll_attempts {
            if Instant::now() + delay > deadline {
                warn!(attempt, waited = ?self.settings.install_timeout, "deadline reached while sampling jamf worker");
                return Err(InstallError::Timeout {
                    waited: self.settings.install_timeout,
                });
            }
            tokio::time::sleep(delay).await;
            if self.host.worker_running().await {
                debug!(attempt, "jamf worker observed");
                observed = true;
                break;
            }
        }

        if !observed {
            debug!("jamf worker never observed, result decided by installed check");
            return Ok(false);
        }

        loop {
            if Instant::now() + delay > deadline {
                warn!(waited = ?self.settings.install_timeout, "jamf worker still running at deadline");
                return Err(InstallError::Timeout {
                    waited: self.settings.install_timeout,
                });
            }
            tokio::time::sleep(delay).await;
            if !self.host.worker_running().await {
                info!("Jamf process closed");
                return Ok(true);
            }
        }
    }

    /// Open the installed application. When a Liquit agent is available it
    /// is signalled first, bounded by `install_timeout`; its failure or
    /// timeout is logged but does not block the open.
    pub async fn launch(&self, info: &PackageInfo) -> Result<(), LaunchError> {
        let _guard = self.begin().ok_or(LaunchError::Busy)?;
        let span = info_span!(parent: &self.span, "launch", name = %info.display_name);
        self.launch_inner(info).instrument(span).await
    }

    async fn launch_inner(&self, info: &PackageInfo) -> Result<(), LaunchError> {
        if !self.check_installed(&info.install_path) {
            return Err(LaunchError::NotInstalled(info.install_path.clone()));
        }

        if self.secondary_agent_available(info) && is_plain_identifier(&info.secondary_agent_id) {
            let signal = self
                .host
                .run_agent(&self.settings.agent_executable, &info.secondary_agent_id);
            match tokio::time::timeout(self.settings.install_timeout, signal).await {
                Ok(Ok(exit)) if exit.success() => debug!("Liquit agent signalled"),
                Ok(Ok(exit)) => warn!(%exit, "Liquit agent returned an error"),
                Ok(Err(e)) => warn!(error = %e, "failed to signal Liquit agent"),
                Err(_) => warn!(
                    waited = ?self.settings.install_timeout,
                    "Liquit agent did not return, opening anyway"
                ),
            }
        }

        let path = resolve_app_path(&self.settings.applications_root, &info.install_path);
        match self.host.open_app(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "successfully opened");
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to open");
                Err(LaunchError::Failed {
                    path: path.display().to_string(),
                    cause: e.to_string(),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
