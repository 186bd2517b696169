//! Error taxonomy for the activation → fetch → install flow.
//!
//! Each stage returns its own typed error. Every variant can be rendered as a
//! [`Notice`] (title + message) so the presentation layer never has to guess
//! what went wrong.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::install::Pathway;

/// Maximum number of body characters carried in upstream diagnostics.
pub const SNIPPET_LEN: usize = 256;

/// Title shown for every failure that happens before package info exists.
const TITLE_PACKAGE_INFO: &str = "Package info missing. Please contact GHD";
const TITLE_FETCH: &str = "Could not retrieve package info. Please contact GHD";
const TITLE_INSTALL: &str = "Installation did not complete";
const TITLE_LAUNCH: &str = "Could not open the application";

/// Failures while decoding an activation URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    #[error("invalid activation URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid activation URL: query pair `{pair}` has no `=`")]
    MalformedPair { pair: String },

    #[error("{} values are missing", .missing.join(" and "))]
    MissingParameters { missing: Vec<&'static str> },
}

/// Failures while retrieving package metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("sys_id or FMNO values are missing")]
    MissingParameters,

    #[error("could not build an authenticated client: {0}")]
    Credentials(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("The API returned an error: {status}")]
    Upstream { status: u16, snippet: String },

    #[error("malformed response (HTTP {status}): {reason}")]
    MalformedResponse {
        status: u16,
        reason: String,
        snippet: String,
    },
}

/// Failures of the install pathways.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstallError {
    #[error("another install or launch is already in progress")]
    Busy,

    #[error("no install pathway available: {0}")]
    NoPathway(String),

    #[error("failed to start the {pathway} pathway: {cause}")]
    Spawn { pathway: Pathway, cause: String },

    #[error("installer did not finish within {}s", .waited.as_secs())]
    Timeout { waited: Duration },

    #[error("{path} is not present after the {pathway} pathway finished{}", cause_suffix(.cause))]
    NotInstalled {
        path: String,
        pathway: Pathway,
        cause: Option<String>,
    },
}

/// Failures opening an installed application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("another install or launch is already in progress")]
    Busy,

    #[error("{0} is not installed")]
    NotInstalled(String),

    #[error("failed to open {path}: {cause}")]
    Failed { path: String, cause: String },
}

/// Anything a [`Session`](crate::session::Session) operation can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("cannot {operation} while {state}")]
    OutOfOrder {
        state: &'static str,
        operation: &'static str,
    },
}

fn cause_suffix(cause: &Option<String>) -> String {
    match cause {
        Some(cause) => format!(" ({cause})"),
        None => String::new(),
    }
}

/// Cut a response body down to a printable diagnostic snippet.
pub fn snippet(body: &str) -> String {
    let mut out: String = body.chars().take(SNIPPET_LEN).collect();
    if body.chars().count() > SNIPPET_LEN {
        out.push('…');
    }
    out
}

// ---------------------------------------------------------------------------
// User-facing notices
// ---------------------------------------------------------------------------

/// A title + message pair for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{}\nError message: {}", self.title, self.message)
        }
    }
}

impl From<&ActivationError> for Notice {
    fn from(err: &ActivationError) -> Self {
        Notice::new(TITLE_PACKAGE_INFO, err.to_string())
    }
}

impl From<&FetchError> for Notice {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::MissingParameters => Notice::new(TITLE_PACKAGE_INFO, err.to_string()),
            FetchError::Upstream { status, snippet } if !snippet.is_empty() => Notice::new(
                TITLE_FETCH,
                format!("The API returned an error: {status}\n{snippet}"),
            ),
            FetchError::MalformedResponse {
                status,
                reason,
                snippet,
            } => Notice::new(
                TITLE_FETCH,
                format!("Unreadable response (HTTP {status}): {reason}\n{snippet}"),
            ),
            _ => Notice::new(TITLE_FETCH, err.to_string()),
        }
    }
}

impl From<&InstallError> for Notice {
    fn from(err: &InstallError) -> Self {
        Notice::new(TITLE_INSTALL, err.to_string())
    }
}

impl From<&LaunchError> for Notice {
    fn from(err: &LaunchError) -> Self {
        Notice::new(TITLE_LAUNCH, err.to_string())
    }
}

impl From<&SessionError> for Notice {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::Activation(e) => e.into(),
            SessionError::Fetch(e) => e.into(),
            SessionError::Install(e) => e.into(),
            SessionError::Launch(e) => e.into(),
            SessionError::OutOfOrder { .. } => Notice::new("Please wait", err.to_string()),
        }
    }
}
