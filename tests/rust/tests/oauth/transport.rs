//! Tests for credentials on the wire, against a mock HTTP server

use std::sync::Arc;

use mcplink_client::ServiceFactory;
use mcplink_core::{ClientConfig, ConnectionState, GrantType, OAuthConfig, ServerConfig, TransportConfig};
use tests::mocks::{MockOAuthDelegate, MockSamplingHost};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn unauthorized_server() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("www-authenticate", "Bearer realm=\"mcp\"")
                .set_body_string("unauthorized"),
        )
        .mount(&mock_server)
        .await;
    mock_server
}

fn test_config() -> ClientConfig {
    ClientConfig {
        connect_timeout_secs: 5,
        ..Default::default()
    }
}

async fn authorization_headers(mock_server: &MockServer) -> Vec<String> {
    mock_server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| {
            request
                .headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_credentials_token_sent_as_bearer() {
    let mock_server = unauthorized_server().await;
    let services = ServiceFactory::create(
        test_config(),
        Arc::new(MockSamplingHost::new()),
        Some(Arc::new(MockOAuthDelegate::new())),
    );
    let config = ServerConfig::http("svc", format!("{}/mcp", mock_server.uri()))
        .with_oauth(OAuthConfig::new(GrantType::ClientCredentials).with_client("svc-client", None));

    let err = services
        .connection_service
        .connect_server(config)
        .await
        .unwrap_err();

    assert!(matches!(err.name(), "AuthError" | "ConnectionError"));
    assert_ne!(services.registry.state("svc"), Some(ConnectionState::Connected));
    let headers = authorization_headers(&mock_server).await;
    assert!(!headers.is_empty(), "server should have been contacted");
    assert!(headers.iter().all(|h| h == "Bearer issued-token"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_configured_authorization_header_wins() {
    let mock_server = unauthorized_server().await;
    let services = ServiceFactory::create(
        test_config(),
        Arc::new(MockSamplingHost::new()),
        Some(Arc::new(MockOAuthDelegate::new())),
    );
    let mut config = ServerConfig::http("pat", format!("{}/mcp", mock_server.uri()))
        .with_oauth(OAuthConfig::new(GrantType::ClientCredentials));
    if let TransportConfig::Http { headers, .. } = &mut config.transport {
        headers.insert("Authorization".to_string(), "Bearer personal-token".to_string());
    }

    let result = services.connection_service.connect_server(config).await;

    assert!(result.is_err());
    let headers = authorization_headers(&mock_server).await;
    assert!(!headers.is_empty(), "server should have been contacted");
    assert!(headers.iter().all(|h| h == "Bearer personal-token"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unauthenticated_server_rejection_is_reported() {
    let mock_server = unauthorized_server().await;
    let services = ServiceFactory::create(test_config(), Arc::new(MockSamplingHost::new()), None);
    let config = ServerConfig::http("plain", format!("{}/mcp", mock_server.uri()));

    let err = services
        .connection_service
        .connect_server(config)
        .await
        .unwrap_err();

    assert!(matches!(err.name(), "AuthError" | "ConnectionError"));
    assert!(!services.registry.contains("plain"));
    assert!(authorization_headers(&mock_server).await.is_empty());
}
