//! Directory layout for ghdsu.
//!
//! - Config:   `~/.config/ghdsu/config.toml`  (XDG-style, human-editable)
//! - Logs:     `~/Library/Logs/ghdsu/`
//! - Runtime:  `~/Library/Application Support/com.McK.GHDSU/`  (instance socket)
//!
//! On non-macOS, falls back to XDG paths.

use std::path::{Path, PathBuf};

use tracing::debug;

#[cfg(target_os = "macos")]
const BUNDLE_ID: &str = "com.McK.GHDSU";
const APP_NAME: &str = "ghdsu";

pub const CONFIG_FILE: &str = "config.toml";
pub const SOCKET_FILE: &str = "ghdsu.sock";
pub const LOG_FILE: &str = "ghdsu.log";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config: PathBuf,
    pub logs: PathBuf,
    /// Holds the single-instance socket.
    pub runtime: PathBuf,
}

impl AppPaths {
    /// Resolve from `$HOME`. Creates nothing; see [`AppPaths::ensure`].
    pub fn resolve() -> Option<Self> {
        let home = std::env::var_os("HOME").map(PathBuf::from)?;
        Some(Self {
            config: resolve_config_dir(&home),
            logs: resolve_log_dir(&home),
            runtime: resolve_runtime_dir(&home),
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config.join(CONFIG_FILE)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.runtime.join(SOCKET_FILE)
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [&self.config, &self.logs, &self.runtime] {
            std::fs::create_dir_all(dir)?;
            debug!("ensured directory: {}", dir.display());
        }
        Ok(())
    }
}

fn resolve_config_dir(home: &Path) -> PathBuf {
    match std::env::var_os("XDG_CONFIG_HOME") {
        Some(xdg) => PathBuf::from(xdg).join(APP_NAME),
        None => home.join(".config").join(APP_NAME),
    }
}

#[cfg(target_os = "macos")]
fn resolve_log_dir(home: &Path) -> PathBuf {
    home.join("Library").join("Logs").join(APP_NAME)
}

#[cfg(not(target_os = "macos"))]
fn resolve_log_dir(home: &Path) -> PathBuf {
    match std::env::var_os("XDG_DATA_HOME") {
        Some(xdg) => PathBuf::from(xdg).join(APP_NAME).join("logs"),
        None => home.join(".local").join("share").join(APP_NAME).join("logs"),
    }
}

#[cfg(target_os = "macos")]
fn resolve_runtime_dir(home: &Path) -> PathBuf {
    home.join("Library")
        .join("Application Support")
        .join(BUNDLE_ID)
}

#[cfg(not(target_os = "macos"))]
fn resolve_runtime_dir(home: &Path) -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(xdg) => PathBuf::from(xdg).join(APP_NAME),
        None => home.join(".local").join("state").join(APP_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_produces_app_scoped_paths() {
        let paths = AppPaths::resolve().expect("HOME should be set in tests");
        assert!(paths.config.to_string_lossy().contains("ghdsu"));
        assert!(paths.logs.to_string_lossy().contains("ghdsu"));
        assert!(paths.config_file().ends_with(CONFIG_FILE));
        assert!(paths.socket_path().ends_with(SOCKET_FILE));
    }

    #[test]
    fn ensure_creates_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths {
            config: tmp.path().join("config"),
            logs: tmp.path().join("logs"),
            runtime: tmp.path().join("run"),
        };

        paths.ensure().expect("ensure should succeed");

        assert!(paths.config.is_dir());
        assert!(paths.logs.is_dir());
        assert!(paths.runtime.is_dir());
    }
}
