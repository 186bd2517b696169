//! ghdsu: activation-URL driven software install shim for managed Macs.
//!
//! A catalog page opens `ghdsoftwareutility://...?sys_id=..&fmno=..`; ghdsu
//! resolves the package through the metadata API, installs it through jamf
//! (or the Liquit agent) when missing, and opens it.

pub mod activation;
pub mod config;
pub mod error;
pub mod install;
#[cfg(unix)]
pub mod instance;
pub mod logging;
pub mod package_info;
pub mod paths;
pub mod session;
pub mod state_machine;
