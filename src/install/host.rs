//! OS side effects used by the install orchestrator.
//!
//! Everything that touches the machine (filesystem checks, `osascript`,
//! `pgrep`, the Liquit agent, `open`) goes through [`InstallHost`] so the
//! orchestrator's decision logic can run against a fake in tests.
//!
//! ## Architecture
//!
//! ```text
//! InstallOrchestrator
//!     └─► InstallHost
//!             ├─► run_policy(id)     osascript → jamf policy -id <id>  (admin prompt)
//!             ├─► worker_running()   pgrep -x jamf
//!             ├─► run_agent(id)      ShellAPI --launch <id>
//!             └─► open_app(path)     open <path>
//! ```
//!
//! The real implementation is gated to macOS. Elsewhere a stub reports every
//! process action as unsupported so the crate still builds and tests on CI.

use std::fmt;
use std::io;
use std::path::Path;

use async_trait::async_trait;

/// Exit summary of an installer process. Advisory only: success of an
/// install is decided by the installed-check, never by this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub stderr: String,
}

impl ProcessExit {
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status {code}")?,
            None => write!(f, "terminated by signal")?,
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {stderr}")?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait InstallHost: Send + Sync {
    /// Existence check. Must be free of side effects.
    fn path_exists(&self, path: &Path) -> bool;

    /// Run the privileged MDM policy and wait for the invocation to return.
    async fn run_policy(&self, policy_id: &str) -> io::Result<ProcessExit>;

    /// Whether the MDM worker process is currently alive.
    async fn worker_running(&self) -> bool;

    /// Hand `agent_id` to the secondary agent and wait for it to exit.
    async fn run_agent(&self, agent_executable: &Path, agent_id: &str) -> io::Result<ProcessExit>;

    /// Open an installed application bundle.
    async fn open_app(&self, path: &Path) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// macOS implementation
// ---------------------------------------------------------------------------

#[cfg(target_os = "macos")]
mod imp {
    use std::io;
    use std::path::{Path, PathBuf};
    use std::process::Stdio;

    use async_trait::async_trait;
    use tokio::process::Command;
    use tracing::{debug, info, warn};

    use super::{InstallHost, ProcessExit};

    /// Real host: shells out to `osascript`, `pgrep`, and `open`.
    #[derive(Debug, Clone)]
    pub struct SystemHost {
        jamf_binary: PathBuf,
        worker_process: String,
    }

    impl SystemHost {
        pub fn new(jamf_binary: PathBuf, worker_process: String) -> Self {
            Self {
                jamf_binary,
                worker_process,
            }
        }

        /// AppleScript that runs the policy with an administrator prompt.
        fn policy_script(&self, policy_id: &str) -> String {
            format!(
                "do shell script \"{} policy -id {}\" with administrator privileges",
                self.jamf_binary.display(),
                policy_id
            )
        }
    }

    async fn collect(mut cmd: Command) -> io::Result<ProcessExit> {
        cmd.stdin(Stdio::null());
        let output = cmd.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(stdout = %stdout.trim(), "installer output");
        }
        Ok(ProcessExit {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    #[async_trait]
    impl InstallHost for SystemHost {
        fn path_exists(&self, path: &Path) -> bool {
            path.exists()
        }

        async fn run_policy(&self, policy_id: &str) -> io::Result<ProcessExit> {
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(self.policy_script(policy_id));
            info!(policy_id, jamf = %self.jamf_binary.display(), "running jamf policy");
            let exit = collect(cmd).await?;
            if !exit.success() {
                warn!(policy_id, %exit, "AppleScript error");
            }
            Ok(exit)
        }

        async fn worker_running(&self) -> bool {
            match Command::new("pgrep")
                .args(["-x", &self.worker_process])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
            {
                Ok(status) => status.success(),
                Err(e) => {
                    warn!(process = %self.worker_process, error = %e, "failed to run pgrep");
                    false
                }
            }
        }

        async fn run_agent(&self, agent_executable: &Path, agent_id: &str) -> io::Result<ProcessExit> {
            let mut cmd = Command::new(agent_executable);
            cmd.args(["--launch", agent_id]);
            info!(agent_id, agent = %agent_executable.display(), "passing task to Liquit agent");
            collect(cmd).await
        }

        async fn open_app(&self, path: &Path) -> io::Result<()> {
            let exit = collect({
                let mut cmd = Command::new("open");
                cmd.arg(path);
                cmd
            })
            .await?;
            if exit.success() {
                Ok(())
            } else {
                Err(io::Error::other(exit.to_string()))
            }
        }
    }

    /// Open a web page in the default browser.
    pub async fn open_url(url: &str) -> io::Result<()> {
        let status = Command::new("open").arg(url).status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("open exited with {status}")))
        }
    }
}

// ---------------------------------------------------------------------------
// Linux / non-macOS stub
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "macos"))]
mod imp {
    use std::io;
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;

    use super::{InstallHost, ProcessExit};

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "software installation requires macOS (jamf / Liquit / open)",
        )
    }

    /// Placeholder host: checks the filesystem, refuses every process action.
    #[derive(Debug, Clone)]
    pub struct SystemHost {
        #[allow(dead_code)]
        jamf_binary: PathBuf,
        #[allow(dead_code)]
        worker_process: String,
    }

    impl SystemHost {
        pub fn new(jamf_binary: PathBuf, worker_process: String) -> Self {
            Self {
                jamf_binary,
                worker_process,
            }
        }
    }

    #[async_trait]
    impl InstallHost for SystemHost {
        fn path_exists(&self, path: &Path) -> bool {
            path.exists()
        }

        async fn run_policy(&self, _policy_id: &str) -> io::Result<ProcessExit> {
            Err(unsupported())
        }

        async fn worker_running(&self) -> bool {
            false
        }

        async fn run_agent(&self, _agent_executable: &Path, _agent_id: &str) -> io::Result<ProcessExit> {
            Err(unsupported())
        }

        async fn open_app(&self, _path: &Path) -> io::Result<()> {
            Err(unsupported())
        }
    }

    /// On non-macOS platforms this always returns an error.
    pub async fn open_url(_url: &str) -> io::Result<()> {
        Err(unsupported())
    }
}

// ---------------------------------------------------------------------------
// Re-export the platform-appropriate symbols
// ---------------------------------------------------------------------------

pub use imp::{SystemHost, open_url};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_display_includes_stderr() {
        let exit = ProcessExit {
            code: Some(1),
            stderr: "User canceled. (-128)\n".into(),
        };
        assert_eq!(exit.to_string(), "exit status 1: User canceled. (-128)");
        assert!(!exit.success());
        assert!(ProcessExit::ok().success());
    }

    #[test]
    fn signal_exit_is_not_success() {
        let exit = ProcessExit {
            code: None,
            stderr: String::new(),
        };
        assert_eq!(exit.to_string(), "terminated by signal");
        assert!(!exit.success());
    }
}
