//! Tests for the management API depth probe.

use super::*;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

fn probe_for(server: &MockServer) -> HttpDepthProbe {
    let address = server.address();
    HttpDepthProbe::new(ManagementApiConfig {
        host: address.ip().to_string(),
        port: address.port(),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_default_config_targets_default_vhost() {
    let config = ManagementApiConfig::for_host("rabbit.internal");

    assert_eq!(config.port, 15672);
    assert_eq!(config.username, "guest");
    assert_eq!(config.password, "guest");
    assert_eq!(
        config.queue_url(&queue("orders")),
        "http://rabbit.internal:15672/api/queues/%2F/orders"
    );
}

#[test]
fn test_named_vhost_is_percent_encoded() {
    let config = ManagementApiConfig {
        vhost: "team/a".to_string(),
        ..ManagementApiConfig::for_host("mq")
    };

    assert_eq!(
        config.queue_url(&queue("jobs")),
        "http://mq:15672/api/queues/team%2Fa/jobs"
    );
}

#[tokio::test]
async fn test_reads_messages_field_with_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/queues/%2F/orders"))
        .and(header("authorization", "Basic Z3Vlc3Q6Z3Vlc3Q="))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "orders", "messages": 42})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let count = probe_for(&server).message_count(&queue("orders")).await.unwrap();
    assert_eq!(count, 42);
}

#[tokio::test]
async fn test_missing_messages_field_is_probe_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/queues/%2F/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "orders"})))
        .mount(&server)
        .await;

    let result = probe_for(&server).message_count(&queue("orders")).await;
    assert!(
        matches!(result, Err(QueueError::DepthProbeFailed { .. })),
        "expected DepthProbeFailed, got: {:?}",
        result
    );
}

#[tokio::test]
async fn test_server_error_is_probe_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = probe_for(&server).message_count(&queue("orders")).await;
    assert!(matches!(result, Err(QueueError::DepthProbeFailed { .. })));
}

#[tokio::test]
async fn test_unknown_queue_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = probe_for(&server).message_count(&queue("missing")).await;
    match result {
        Err(QueueError::QueueNotFound { queue_name }) => assert_eq!(queue_name, "missing"),
        other => panic!("Expected QueueNotFound error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_api_is_connection_failure() {
    // Nothing listens on the port once the listener is dropped
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let probe = HttpDepthProbe::new(ManagementApiConfig {
        host: "127.0.0.1".to_string(),
        port,
        ..Default::default()
    })
    .unwrap();

    let result = probe.message_count(&queue("orders")).await;
    assert!(matches!(result, Err(QueueError::ConnectionFailed { .. })));
}
