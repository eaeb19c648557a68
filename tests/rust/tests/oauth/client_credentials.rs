//! Tests for the client-credentials grant

use std::time::Duration;

use mcplink_client::ConnectOutcome;
use mcplink_core::{GrantType, OAuthConfig, OAuthTokens};
use pretty_assertions::assert_eq;
use tests::fixtures::{client_credentials_server, http_server};
use tests::ConnectionServiceTestHarness;

#[tokio::test(start_paused = true)]
async fn test_grant_runs_when_no_token() {
    let harness = ConnectionServiceTestHarness::new();

    let outcome = harness
        .service
        .connect_server(client_credentials_server("svc"))
        .await
        .unwrap();

    assert_eq!(outcome, ConnectOutcome::Connected);
    assert_eq!(harness.oauth.client_credentials_count(), 1);
    let request = harness.connector.last_request().unwrap();
    assert_eq!(request.tokens.unwrap().access_token, "issued-token");
    // Machine tokens are injected as a plain bearer header
    assert!(!request.has_oauth_provider);
    assert!(harness.snapshot("svc").has_tokens);
}

#[tokio::test(start_paused = true)]
async fn test_valid_token_skips_grant() {
    let harness = ConnectionServiceTestHarness::new();
    let config = http_server("svc").with_oauth(
        OAuthConfig::new(GrantType::ClientCredentials).with_tokens(OAuthTokens::bearer("cached-token")),
    );

    harness.service.connect_server(config).await.unwrap();

    assert_eq!(harness.oauth.client_credentials_count(), 0);
    assert_eq!(
        harness.connector.last_request().unwrap().tokens.unwrap().access_token,
        "cached-token"
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_reruns_grant() {
    let harness = ConnectionServiceTestHarness::new();
    harness.oauth.fail_refresh();
    let config = http_server("svc").with_oauth(
        OAuthConfig::new(GrantType::ClientCredentials).with_tokens(OAuthTokens::bearer("expired-token")),
    );

    harness.service.connect_server(config).await.unwrap();

    assert_eq!(harness.oauth.client_credentials_count(), 1);
    assert_eq!(
        harness.connector.last_request().unwrap().tokens.unwrap().access_token,
        "issued-token"
    );
}

#[tokio::test(start_paused = true)]
async fn test_grant_requires_delegate() {
    let harness = ConnectionServiceTestHarness::without_oauth();

    let err = harness
        .service
        .connect_server(client_credentials_server("svc"))
        .await
        .unwrap_err();

    assert_eq!(err.name(), "AuthError");
    assert_eq!(harness.connector.connect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_during_token_refresh_keeps_server_removed() {
    let harness = ConnectionServiceTestHarness::new();
    harness
        .service
        .connect_server(client_credentials_server("api"))
        .await
        .unwrap();
    assert_eq!(harness.connector.connect_count(), 1);

    harness.oauth.delay_token_checks(Duration::from_secs(5));
    let service = harness.service.clone();
    let reconnect = tokio::spawn(async move { service.force_reconnect("api").await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    harness.service.cleanup().await;
    assert!(!harness.registry.contains("api"));

    let err = reconnect.await.unwrap().unwrap_err();
    assert_eq!(err.name(), "NotFoundError");
    assert!(!harness.registry.contains("api"));
    assert!(harness.service.snapshot("api").is_none());
    assert_eq!(harness.connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remove_during_token_refresh_keeps_server_removed() {
    let harness = ConnectionServiceTestHarness::new();
    harness
        .service
        .connect_server(client_credentials_server("api"))
        .await
        .unwrap();

    harness.oauth.delay_token_checks(Duration::from_secs(5));
    let service = harness.service.clone();
    let reconnect = tokio::spawn(async move { service.attempt_reconnection("api").await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    harness.service.remove_server("api").await.unwrap();

    assert!(reconnect.await.unwrap().is_err());
    assert!(!harness.registry.contains("api"));
    assert_eq!(harness.connector.connect_count(), 1);
    let err = harness.service.connect_server_by_id("api").await.unwrap_err();
    assert_eq!(err.name(), "NotFoundError");
}
