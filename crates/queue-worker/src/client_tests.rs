//! Tests for the provider factory and connectivity checks.

use super::*;
use crate::provider::InMemoryConfig;

#[tokio::test]
async fn test_factory_connects_to_reachable_broker() {
    let provider = QueueClientFactory::connect(&BrokerConfig::default())
        .await
        .unwrap();

    assert_eq!(provider.provider_type(), ProviderType::InMemory);
    assert!(provider.check_connection().await.is_ok());
}

#[tokio::test]
async fn test_factory_reports_unreachable_broker_as_connection_failure() {
    let config = BrokerConfig {
        provider: ProviderConfig::InMemory(InMemoryConfig {
            reachable: false,
            ..Default::default()
        }),
    };

    let result = QueueClientFactory::connect(&config).await;
    match result {
        Err(QueueError::ConnectionFailed { message }) => {
            assert!(message.contains("unreachable"));
        }
        Err(other) => panic!("Expected ConnectionFailed, got: {:?}", other),
        Ok(_) => panic!("Expected ConnectionFailed, got a provider"),
    }
}

#[tokio::test]
async fn test_factory_applies_in_memory_limits() {
    let config = BrokerConfig {
        provider: ProviderConfig::InMemory(InMemoryConfig {
            max_queue_size: 1,
            ..Default::default()
        }),
    };
    let provider = QueueClientFactory::connect(&config).await.unwrap();
    let queue = QueueName::new("tiny".to_string()).unwrap();
    let message = Message::new(bytes::Bytes::from_static(b"x"));

    provider.send_message(&queue, &message).await.unwrap();
    let second = provider.send_message(&queue, &message).await;

    assert!(matches!(second, Err(QueueError::ProviderError { ref code, .. }) if code == "QueueFull"));
}
