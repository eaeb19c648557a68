//! Tests for the idle health-check timer

use std::sync::Arc;
use std::time::Duration;

use mcplink_core::ConnectionState;
use pretty_assertions::assert_eq;
use tests::events::scheduled_delays;
use tests::fixtures::{http_server, stdio_server};
use tests::mocks::{ConnectScript, MockClient, PingBehavior};
use tests::{settle, ConnectionServiceTestHarness};

const IDLE: Duration = Duration::from_secs(5 * 60);

async fn connect_with(harness: &ConnectionServiceTestHarness, client: MockClient) -> Arc<MockClient> {
    let client = Arc::new(client);
    harness.connector.push(ConnectScript::SucceedWith(client.clone()));
    harness.service.connect_server(http_server("api")).await.unwrap();
    client
}

#[tokio::test(start_paused = true)]
async fn test_idle_connection_is_pinged() {
    let harness = ConnectionServiceTestHarness::new();
    let client = connect_with(&harness, MockClient::new()).await;

    tokio::time::sleep(IDLE - Duration::from_secs(1)).await;
    assert_eq!(client.ping_count(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(client.ping_count(), 1);
    assert_eq!(harness.snapshot("api").state, ConnectionState::Connected);
    assert!(harness.snapshot("api").health_check_timer_active);

    tokio::time::sleep(IDLE).await;
    assert_eq!(client.ping_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_activity_postpones_health_check() {
    let harness = ConnectionServiceTestHarness::new();
    let client = connect_with(&harness, MockClient::new()).await;

    tokio::time::sleep(Duration::from_secs(3 * 60)).await;
    harness.service.record_activity("api");

    // Six minutes after connect, three after activity
    tokio::time::sleep(Duration::from_secs(3 * 60)).await;
    assert_eq!(client.ping_count(), 0);

    tokio::time::sleep(Duration::from_secs(2 * 60 + 1)).await;
    assert_eq!(client.ping_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_tool_calls_keep_connection_unprobed() {
    let harness = ConnectionServiceTestHarness::new();
    let client = connect_with(&harness, MockClient::new()).await;

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(60)).await;
        harness.service.call_tool("api", "echo", None).await.unwrap();
    }

    assert_eq!(client.ping_count(), 0);
    assert_eq!(client.tool_call_count(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_health_check_never_pings() {
    let harness = ConnectionServiceTestHarness::new();
    let client = Arc::new(MockClient::new());
    harness.connector.push(ConnectScript::SucceedWith(client.clone()));
    harness
        .service
        .connect_server(http_server("api").with_health_check(false, 5))
        .await
        .unwrap();

    assert!(!harness.snapshot("api").health_check_timer_active);
    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    assert_eq!(client.ping_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_idle_window() {
    let harness = ConnectionServiceTestHarness::new();
    let client = Arc::new(MockClient::new());
    harness.connector.push(ConnectScript::SucceedWith(client.clone()));
    harness
        .service
        .connect_server(http_server("api").with_health_check(true, 1))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(client.ping_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stdio_has_no_health_check() {
    let harness = ConnectionServiceTestHarness::new();
    let client = Arc::new(MockClient::new());
    harness.connector.push(ConnectScript::SucceedWith(client.clone()));
    harness.service.connect_server(stdio_server("fs")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30 * 60)).await;

    assert_eq!(client.ping_count(), 0);
    assert!(!harness.snapshot("fs").health_check_timer_active);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_ping_marks_disconnected_and_keeps_client() {
    let mut harness = ConnectionServiceTestHarness::new();
    let client = connect_with(
        &harness,
        MockClient::new().with_ping(PingBehavior::Fail("connection refused".to_string())),
    )
    .await;
    harness.events();

    tokio::time::sleep(IDLE + Duration::from_secs(1)).await;

    assert_eq!(client.ping_count(), 1);
    let snapshot = harness.snapshot("api");
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert!(snapshot.has_client);
    assert!(!snapshot.health_check_timer_active);
    assert!(!snapshot.reconnect_timer_active);
    assert!(snapshot.last_error.unwrap().contains("health check failed"));
    assert!(scheduled_delays(&harness.events()).is_empty());

    // No further probes while disconnected
    tokio::time::sleep(IDLE * 3).await;
    assert_eq!(client.ping_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_ping_times_out() {
    let harness = ConnectionServiceTestHarness::new();
    let client = connect_with(&harness, MockClient::new().with_ping(PingBehavior::Hang)).await;

    tokio::time::sleep(IDLE + Duration::from_secs(5)).await;
    assert_eq!(client.ping_count(), 1);
    assert_eq!(harness.snapshot("api").state, ConnectionState::Connected);

    // 10s ping timeout
    tokio::time::sleep(Duration::from_secs(6)).await;
    let snapshot = harness.snapshot("api");
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert!(snapshot.last_error.unwrap().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_ping_session_error_triggers_reconnection() {
    let mut harness = ConnectionServiceTestHarness::new();
    let client = connect_with(
        &harness,
        MockClient::new().with_ping(PingBehavior::Fail("Session not found".to_string())),
    )
    .await;
    harness.events();

    tokio::time::sleep(IDLE + Duration::from_secs(1)).await;
    settle().await;

    assert!(client.is_closed());
    assert_eq!(scheduled_delays(&harness.events()), vec![60_000]);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.snapshot("api").state, ConnectionState::Connected);
    assert_eq!(harness.connector.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_recovered_connection_is_probed_again() {
    let harness = ConnectionServiceTestHarness::new();
    let client = connect_with(&harness, MockClient::new()).await;
    harness.connector.trigger_error("api", "connection reset by peer");
    assert!(!harness.snapshot("api").health_check_timer_active);

    assert!(harness.service.is_server_available("api").await);
    assert!(harness.snapshot("api").health_check_timer_active);

    tokio::time::sleep(IDLE + Duration::from_secs(1)).await;
    assert_eq!(client.ping_count(), 1);
}
