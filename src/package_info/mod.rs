//! Package metadata: wire format, normalization, and retrieval.
//!
//! ```text
//! PackageInfoClient::fetch(item_id, form_number)
//!     └─► MetadataTransport::get(url)      (mutual-TLS reqwest client)
//!             └─► MetadataEnvelope (JSON)  →  PackageInfo::from_software
//! ```

use serde::Deserialize;

pub mod client;
pub mod credentials;

pub use client::{HttpTransport, MetadataTransport, PackageInfoClient, TransportResponse};
pub use credentials::{CredentialProvider, IdentityFile, NoClientIdentity};

/// Detection rule type understood by the installed-check.
pub const DETECTION_FILE_EXISTS: &str = "FileExists";

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Top-level body of `GET /deployment/getinstallationdetails/{product}`.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataEnvelope {
    pub software: Software,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Software {
    #[serde(rename = "currentlyEntitled")]
    pub currently_entitled: bool,
    pub name: String,
    pub url: String,
    #[serde(rename = "Liquit", default)]
    pub liquit: Option<LiquitRef>,
    #[serde(rename = "JamF")]
    pub jamf: JamfRef,
    #[serde(rename = "detectionParameters", default)]
    pub detection_parameters: Vec<DetectionParameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiquitRef {
    #[serde(rename = "liquitID")]
    pub liquit_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JamfRef {
    #[serde(rename = "jamfID")]
    pub jamf_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DetectionParameter {
    #[serde(rename = "type")]
    pub kind: String,
    pub argument: String,
}

impl DetectionParameter {
    /// The rule substituted when upstream supplies none: `<name>.app` exists.
    pub fn default_for(name: &str) -> Self {
        Self {
            kind: DETECTION_FILE_EXISTS.to_string(),
            argument: format!("{name}.app"),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized form
// ---------------------------------------------------------------------------

/// Package metadata as the orchestrator consumes it.
///
/// `install_path` is never empty: when upstream has no usable detection rule
/// it falls back to `<display_name>.app`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// Jamf policy id; may be empty.
    pub primary_install_id: String,
    /// Liquit package id; may be empty.
    pub secondary_agent_id: String,
    pub install_path: String,
    pub display_name: String,
    pub estimated_minutes: u32,
    pub catalog_url: String,
    pub entitled: bool,
}

impl PackageInfo {
    pub fn from_software(mut software: Software, estimated_minutes: u32) -> Self {
        if software.detection_parameters.is_empty() {
            software.detection_parameters = vec![DetectionParameter::default_for(&software.name)];
        }

        let install_path = software
            .detection_parameters
            .iter()
            .find(|p| p.kind == DETECTION_FILE_EXISTS && !p.argument.trim().is_empty())
            .map(|p| p.argument.clone())
            .unwrap_or_else(|| DetectionParameter::default_for(&software.name).argument);

        Self {
            primary_install_id: software.jamf.jamf_id,
            secondary_agent_id: software
                .liquit
                .map(|l| l.liquit_id)
                .unwrap_or_default(),
            install_path,
            display_name: software.name,
            estimated_minutes,
            catalog_url: software.url,
            entitled: software.currently_entitled,
        }
    }

    pub fn has_secondary_agent(&self) -> bool {
        !self.secondary_agent_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn software(json: &str) -> Software {
        serde_json::from_str::<MetadataEnvelope>(json)
            .expect("decode")
            .software
    }

    #[test]
    fn empty_detection_parameters_default_to_app_bundle() {
        let s = software(
            r#"{"software":{"currentlyEntitled":true,"name":"Slack","url":"https://slack.com",
                "JamF":{"jamfID":"412"},"detectionParameters":[]}}"#,
        );
        let info = PackageInfo::from_software(s, 5);
        assert_eq!(info.install_path, "Slack.app");
        assert_eq!(info.display_name, "Slack");
        assert_eq!(info.primary_install_id, "412");
        assert_eq!(info.secondary_agent_id, "");
        assert_eq!(info.estimated_minutes, 5);
    }

    #[test]
    fn absent_detection_parameters_default_to_app_bundle() {
        let s = software(
            r#"{"software":{"currentlyEntitled":true,"name":"VLC","url":"",
                "JamF":{"jamfID":"878"}}}"#,
        );
        assert_eq!(PackageInfo::from_software(s, 5).install_path, "VLC.app");
    }

    #[test]
    fn first_file_exists_rule_wins() {
        let s = software(
            r#"{"software":{"currentlyEntitled":true,"name":"R","url":"",
                "Liquit":{"liquitID":"lq-7"},"JamF":{"jamfID":"9"},
                "detectionParameters":[
                    {"type":"RegistryKey","argument":"HKLM\\R"},
                    {"type":"FileExists","argument":"RStudio.app"},
                    {"type":"FileExists","argument":"R.app"}]}}"#,
        );
        let info = PackageInfo::from_software(s, 5);
        assert_eq!(info.install_path, "RStudio.app");
        assert_eq!(info.secondary_agent_id, "lq-7");
        assert!(info.has_secondary_agent());
    }

    #[test]
    fn blank_argument_falls_back_to_default() {
        let s = software(
            r#"{"software":{"currentlyEntitled":false,"name":"Zoom","url":"",
                "JamF":{"jamfID":""},
                "detectionParameters":[{"type":"FileExists","argument":"  "}]}}"#,
        );
        let info = PackageInfo::from_software(s, 5);
        assert_eq!(info.install_path, "Zoom.app");
        assert!(!info.entitled);
    }

    #[test]
    fn missing_jamf_block_is_a_decode_error() {
        let result = serde_json::from_str::<MetadataEnvelope>(
            r#"{"software":{"currentlyEntitled":true,"name":"Slack","url":""}}"#,
        );
        assert!(result.is_err());
    }
}
