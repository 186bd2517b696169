//! Runtime configuration for ghdsu.
//!
//! All tunables (endpoint, credentials, installer locations, polling budget)
//! live in a single [`Config`] struct that is read from TOML. Every section
//! is `#[serde(default)]`, so a partial file only overrides what it names and
//! a missing file means "use the defaults".

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub credentials: CredentialsConfig,
    pub install: InstallConfig,
    pub secondary_agent: SecondaryAgentConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

// --- Sub-structs ---

/// Metadata API endpoint.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub product: String,
    pub os: String,
    pub timeout_secs: u64,
}

/// Client identity used for mutual TLS.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// PKCS#12 bundle exported from the keychain. Unset means no client
    /// certificate is presented.
    pub identity_path: Option<PathBuf>,
    /// Environment variable holding the PKCS#12 password.
    pub identity_password_env: String,
    /// Keychain label of the identity, used in diagnostics.
    pub label: String,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct InstallConfig {
    pub applications_root: PathBuf,
    pub jamf_binary: PathBuf,
    /// Process name sampled with `pgrep -x` while a policy runs.
    pub worker_process: String,
    pub poll_attempts: u32,
    pub poll_delay_ms: u64,
    pub install_timeout_secs: u64,
    pub estimated_minutes: u32,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct SecondaryAgentConfig {
    pub enabled: bool,
    pub executable: PathBuf,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Opened when the app is launched without an activation URL.
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append structured logs to `ghdsu.log` in the logs directory.
    pub file: bool,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mdt-api.mck-wit.net/MDT-API".to_string(),
            product: "mdt-snow-software".to_string(),
            os: "macOS".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            identity_path: None,
            identity_password_env: "GHDSU_IDENTITY_PASSWORD".to_string(),
            label: "API Management".to_string(),
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            applications_root: PathBuf::from("/Applications"),
            jamf_binary: PathBuf::from("/usr/local/bin/jamf"),
            worker_process: "jamf".to_string(),
            poll_attempts: 3,
            poll_delay_ms: 3_000,
            install_timeout_secs: 30 * 60,
            estimated_minutes: 5,
        }
    }
}

impl Default for SecondaryAgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: PathBuf::from("/Applications/Liquit.app/Contents/MacOS/ShellAPI"),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "https://mckinsey.service-now.com/ghd?id=mck_app_cat_view&utm_source=ghd_website"
                .to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file: true }
    }
}

// ---------------------------------------------------------------------------
// Helper methods
// ---------------------------------------------------------------------------

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl InstallConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

impl Config {
    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialize from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Self::load_with_source(path).map(|(config, _)| config)
    }

    /// Like [`Config::load`], also reporting where the values came from.
    /// Nothing is logged here; callers log the source once tracing is up.
    pub fn load_with_source(path: &Path) -> anyhow::Result<(Self, ConfigSource)> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml(&text)
                    .with_context(|| format!("invalid config file {}", path.display()))?;
                Ok((config, ConfigSource::File(path.to_path_buf())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok((Self::default(), ConfigSource::Defaults))
            }
            Err(e) => {
                Err(e).with_context(|| format!("failed to read config file {}", path.display()))
            }
        }
    }
}

/// Where the effective [`Config`] was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => f.write_str("built-in defaults"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let c = Config::default();
        assert_eq!(c.api.os, "macOS");
        assert_eq!(c.api.timeout(), Duration::from_secs(30));
        assert_eq!(c.install.poll_attempts, 3);
        assert_eq!(c.install.poll_delay(), Duration::from_secs(3));
        assert_eq!(c.install.applications_root, PathBuf::from("/Applications"));
        assert_eq!(c.install.estimated_minutes, 5);
        assert!(c.secondary_agent.enabled);
        assert!(c.credentials.identity_path.is_none());
    }

    #[test]
    fn toml_roundtrip() {
        let original = Config::default();
        let parsed = Config::from_toml(&original.to_toml()).expect("roundtrip parse failed");
        assert_eq!(parsed.api.base_url, original.api.base_url);
        assert_eq!(parsed.install.worker_process, original.install.worker_process);
        assert_eq!(parsed.store.url, original.store.url);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let partial = r#"
[api]
base_url = "https://mdt-api.example.net/MDT-API-DEV"

[secondary_agent]
enabled = false
"#;
        let c = Config::from_toml(partial).expect("partial parse failed");
        assert_eq!(c.api.base_url, "https://mdt-api.example.net/MDT-API-DEV");
        assert_eq!(c.api.product, "mdt-snow-software");
        assert!(!c.secondary_agent.enabled);
        assert_eq!(c.install.poll_attempts, 3);
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(Config::from_toml("this is not [[ valid toml").is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let c = Config::load(&dir.path().join("config.toml")).expect("load");
        assert_eq!(c.install.worker_process, "jamf");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[install]\npoll_attempts = 5\n").expect("write");
        let c = Config::load(&path).expect("load");
        assert_eq!(c.install.poll_attempts, 5);
    }

    #[test]
    fn load_reports_its_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let (_, source) = Config::load_with_source(&path).expect("load");
        assert_eq!(source, ConfigSource::Defaults);

        std::fs::write(&path, "[logging]\nfile = false\n").expect("write");
        let (c, source) = Config::load_with_source(&path).expect("load");
        assert_eq!(source, ConfigSource::File(path.clone()));
        assert!(!c.logging.file);
        assert_eq!(source.to_string(), path.display().to_string());
    }
}
