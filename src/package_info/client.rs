//! Metadata API client.
//!
//! One authenticated GET per [`PackageInfoClient::fetch`] call, no retries.
//! The HTTP layer is a [`MetadataTransport`] so the client can be driven by a
//! mock in tests and by a mutual-TLS `reqwest::Client` in production.

use async_trait::async_trait;
use tracing::{Instrument, Span, debug, info, info_span, warn};
use url::Url;

use super::{MetadataEnvelope, PackageInfo};
use crate::config::ApiConfig;
use crate::error::{FetchError, snippet};
use crate::package_info::credentials::CredentialProvider;

/// Status code and body of one metadata response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Performs the single GET the client needs.
#[async_trait]
pub trait MetadataTransport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<TransportResponse, FetchError>;
}

// ---------------------------------------------------------------------------
// reqwest transport
// ---------------------------------------------------------------------------

/// Production transport backed by a (mutually authenticated) `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build the transport from a credential provider with the configured
    /// request timeout.
    pub fn from_credentials(
        provider: &dyn CredentialProvider,
        api: &ApiConfig,
    ) -> Result<Self, FetchError> {
        Ok(Self::new(provider.http_client(api.timeout())?))
    }
}

#[async_trait]
impl MetadataTransport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Transport(format!("request timed out: {e}"))
                } else {
                    FetchError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(format!("failed to read body: {e}")))?;

        Ok(TransportResponse { status, body })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Retrieves and normalizes package metadata.
pub struct PackageInfoClient<T> {
    transport: T,
    api: ApiConfig,
    estimated_minutes: u32,
    span: Span,
}

impl<T: MetadataTransport> PackageInfoClient<T> {
    pub fn new(transport: T, api: ApiConfig, estimated_minutes: u32) -> Self {
        let span = info_span!("package_info", product = %api.product);
        Self {
            transport,
            api,
            estimated_minutes,
            span,
        }
    }

    /// Endpoint for one lookup:
    /// `{base}/deployment/getinstallationdetails/{product}?catItemID=..&os=..&fmno=..`
    pub fn endpoint(&self, item_id: &str, form_number: &str) -> Result<Url, FetchError> {
        let base = self.api.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!(
            "{base}/deployment/getinstallationdetails/{}",
            self.api.product
        ))
        .map_err(|e| FetchError::Transport(format!("invalid API base URL `{base}`: {e}")))?;

        url.query_pairs_mut()
            .append_pair("catItemID", item_id)
            .append_pair("os", &self.api.os)
            .append_pair("fmno", form_number);

        Ok(url)
    }

    /// Fetch the package metadata for `item_id` on behalf of `form_number`.
    ///
    /// Both inputs must be non-empty; otherwise no request is made.
    pub async fn fetch(&self, item_id: &str, form_number: &str) -> Result<PackageInfo, FetchError> {
        if item_id.is_empty() || form_number.is_empty() {
            warn!(parent: &self.span, item_id, form_number, "sys_id or FMNO values are missing");
            return Err(FetchError::MissingParameters);
        }

        let url = self.endpoint(item_id, form_number)?;
        let span = info_span!(parent: &self.span, "fetch", item_id, form_number);
        self.request(url).instrument(span).await
    }

    async fn request(&self, url: Url) -> Result<PackageInfo, FetchError> {
        debug!(url = %url, "requesting package info");
        let response = self.transport.get(&url).await?;

        if response.status != 200 {
            warn!(status = response.status, "The API returned an error");
            return Err(FetchError::Upstream {
                status: response.status,
                snippet: snippet(&response.body),
            });
        }

        let envelope: MetadataEnvelope = serde_json::from_str(&response.body).map_err(|e| {
            warn!(status = response.status, error = %e, "could not decode package info");
            FetchError::MalformedResponse {
                status: response.status,
                reason: e.to_string(),
                snippet: snippet(&response.body),
            }
        })?;

        let info = PackageInfo::from_software(envelope.software, self.estimated_minutes);
        if !info.entitled {
            warn!(name = %info.display_name, "user is not currently entitled to this package");
        }
        info!(
            name = %info.display_name,
            path = %info.install_path,
            jamf_id = %info.primary_install_id,
            liquit_id = %info.secondary_agent_id,
            "package info retrieved"
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const SLACK: &str = r#"{"software":{"currentlyEntitled":true,"name":"Slack",
        "url":"https://slack.com","JamF":{"jamfID":"412"},"detectionParameters":[]}}"#;

    /// Canned transport that counts calls and records the last URL.
    #[derive(Clone)]
    struct MockTransport {
        calls: Arc<AtomicUsize>,
        last_url: Arc<std::sync::Mutex<Option<Url>>>,
        status: u16,
        body: String,
    }

    impl MockTransport {
        fn new(status: u16, body: &str) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                last_url: Arc::new(std::sync::Mutex::new(None)),
                status,
                body: body.to_string(),
            }
        }
    }

    #[async_trait]
    impl MetadataTransport for MockTransport {
        async fn get(&self, url: &Url) -> Result<TransportResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_url.lock().unwrap() = Some(url.clone());
            Ok(TransportResponse {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    fn client(transport: MockTransport) -> PackageInfoClient<MockTransport> {
        PackageInfoClient::new(transport, ApiConfig::default(), 5)
    }

    #[tokio::test]
    async fn missing_parameters_skip_the_network() {
        let transport = MockTransport::new(200, SLACK);
        let calls = Arc::clone(&transport.calls);
        let client = client(transport);

        assert_eq!(
            client.fetch("", "123").await.unwrap_err(),
            FetchError::MissingParameters
        );
        assert_eq!(
            client.fetch("id", "").await.unwrap_err(),
            FetchError::MissingParameters
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ok_response_is_normalized() {
        let transport = MockTransport::new(200, SLACK);
        let calls = Arc::clone(&transport.calls);
        let info = client(transport).fetch("ABC123", "99999").await.expect("fetch");

        assert_eq!(info.display_name, "Slack");
        assert_eq!(info.install_path, "Slack.app");
        assert_eq!(info.primary_install_id, "412");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_targets_templated_endpoint() {
        let transport = MockTransport::new(200, SLACK);
        let last_url = Arc::clone(&transport.last_url);
        client(transport).fetch("ABC123", "99999").await.expect("fetch");

        let url = last_url.lock().unwrap().clone().expect("url recorded");
        assert_eq!(
            url.as_str(),
            "https://mdt-api.mck-wit.net/MDT-API/deployment/getinstallationdetails/\
             mdt-snow-software?catItemID=ABC123&os=macOS&fmno=99999"
        );
    }

    #[tokio::test]
    async fn non_200_is_upstream_error_with_status() {
        let transport = MockTransport::new(503, "Service Unavailable");
        let err = client(transport).fetch("ABC123", "99999").await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Upstream {
                status: 503,
                snippet: "Service Unavailable".into()
            }
        );
    }

    #[tokio::test]
    async fn garbage_body_is_malformed_response() {
        let transport = MockTransport::new(200, "<html>gateway</html>");
        let err = client(transport).fetch("ABC123", "99999").await.unwrap_err();
        match err {
            FetchError::MalformedResponse {
                status, snippet, ..
            } => {
                assert_eq!(status, 200);
                assert_eq!(snippet, "<html>gateway</html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_required_field_is_malformed_response() {
        let transport = MockTransport::new(200, r#"{"software":{"name":"Slack"}}"#);
        let err = client(transport).fetch("ABC123", "99999").await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn endpoint_encodes_query_values() {
        let client = client(MockTransport::new(200, SLACK));
        let url = client.endpoint("a b&c", "1").expect("endpoint");
        assert_eq!(url.query(), Some("catItemID=a+b%26c&os=macOS&fmno=1"));
    }
}
