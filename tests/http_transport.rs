//! The reqwest-backed transport against a local HTTP server.

use std::time::Duration;

use ghdsu::config::ApiConfig;
use ghdsu::error::FetchError;
use ghdsu::package_info::{
    CredentialProvider, HttpTransport, NoClientIdentity, PackageInfoClient,
};
use httpmock::prelude::*;

const ENDPOINT: &str = "/MDT-API/deployment/getinstallationdetails/mdt-snow-software";

fn client_for(server: &MockServer) -> PackageInfoClient<HttpTransport> {
    let api = ApiConfig {
        base_url: server.url("/MDT-API"),
        timeout_secs: 5,
        ..ApiConfig::default()
    };
    let transport = HttpTransport::from_credentials(&NoClientIdentity, &api).expect("transport");
    PackageInfoClient::new(transport, api, 5)
}

#[tokio::test]
async fn fetches_and_normalizes_package_info() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(ENDPOINT)
                .query_param("catItemID", "ABC123")
                .query_param("os", "macOS")
                .query_param("fmno", "99999");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "software": {
                        "currentlyEntitled": true,
                        "name": "Slack",
                        "url": "https://slack.com",
                        "Liquit": { "liquitID": "lq-7" },
                        "JamF": { "jamfID": "412" },
                        "detectionParameters": []
                    }
                }));
        })
        .await;

    let info = client_for(&server)
        .fetch("ABC123", "99999")
        .await
        .expect("fetch");

    mock.assert_async().await;
    assert_eq!(info.display_name, "Slack");
    assert_eq!(info.install_path, "Slack.app");
    assert_eq!(info.primary_install_id, "412");
    assert_eq!(info.secondary_agent_id, "lq-7");
}

#[tokio::test]
async fn server_error_surfaces_status_and_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path(ENDPOINT);
            then.status(503).body("upstream maintenance");
        })
        .await;

    let err = client_for(&server)
        .fetch("ABC123", "99999")
        .await
        .unwrap_err();

    assert_eq!(mock.hits_async().await, 1);
    assert_eq!(
        err,
        FetchError::Upstream {
            status: 503,
            snippet: "upstream maintenance".into()
        }
    );
}

#[tokio::test]
async fn missing_parameters_never_reach_the_server() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path(ENDPOINT);
            then.status(200);
        })
        .await;

    let err = client_for(&server).fetch("", "99999").await.unwrap_err();

    assert_eq!(err, FetchError::MissingParameters);
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let api = ApiConfig {
        base_url: "http://127.0.0.1:9/MDT-API".into(),
        timeout_secs: 2,
        ..ApiConfig::default()
    };
    let transport = HttpTransport::new(
        NoClientIdentity
            .http_client(Duration::from_secs(2))
            .expect("client"),
    );
    let client = PackageInfoClient::new(transport, api, 5);

    let err = client.fetch("ABC123", "99999").await.unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
}
