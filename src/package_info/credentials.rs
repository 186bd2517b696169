//! Client identity for the metadata API.
//!
//! The API only answers callers presenting the "API Management" client
//! certificate. Resolving that identity is platform business, so it sits
//! behind [`CredentialProvider`]: anything that can hand back a ready
//! `reqwest::Client` will do.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::CredentialsConfig;
use crate::error::FetchError;

/// Produces an HTTP client that authenticates as this machine.
pub trait CredentialProvider: Send + Sync {
    fn http_client(&self, timeout: Duration) -> Result<reqwest::Client, FetchError>;
}

/// PKCS#12 bundle on disk (exported from the keychain by label).
#[derive(Debug, Clone)]
pub struct IdentityFile {
    pub path: PathBuf,
    pub password: String,
    pub label: String,
}

impl IdentityFile {
    /// Build from config. Returns `None` when no identity file is configured.
    pub fn from_config(config: &CredentialsConfig) -> Option<Self> {
        let path = config.identity_path.clone()?;
        let password = std::env::var(&config.identity_password_env).unwrap_or_default();
        Some(Self {
            path,
            password,
            label: config.label.clone(),
        })
    }
}

impl CredentialProvider for IdentityFile {
    fn http_client(&self, timeout: Duration) -> Result<reqwest::Client, FetchError> {
        let der = std::fs::read(&self.path).map_err(|e| {
            FetchError::Credentials(format!(
                "cannot read identity `{}` at {}: {e}",
                self.label,
                self.path.display()
            ))
        })?;
        let identity = reqwest::Identity::from_pkcs12_der(&der, &self.password).map_err(|e| {
            FetchError::Credentials(format!("identity `{}` is unusable: {e}", self.label))
        })?;

        info!(label = %self.label, path = %self.path.display(), "loaded client identity");

        reqwest::Client::builder()
            .identity(identity)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Credentials(e.to_string()))
    }
}

/// Plain HTTPS client without a client certificate (dev endpoints, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClientIdentity;

impl CredentialProvider for NoClientIdentity {
    fn http_client(&self, timeout: Duration) -> Result<reqwest::Client, FetchError> {
        debug!("building HTTP client without client identity");
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Credentials(e.to_string()))
    }
}

/// Pick the provider described by `config`.
pub fn from_config(config: &CredentialsConfig) -> Box<dyn CredentialProvider> {
    match IdentityFile::from_config(config) {
        Some(identity) => Box::new(identity),
        None => Box::new(NoClientIdentity),
    }
}
