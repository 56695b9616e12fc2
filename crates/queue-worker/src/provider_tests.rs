//! Tests for provider types.

use super::*;

#[test]
fn test_provider_type_characteristics() {
    assert_eq!(ProviderType::InMemory.as_str(), "in-memory");
    assert_eq!(ProviderType::InMemory.max_message_size(), 10 * 1024 * 1024);
}

#[test]
fn test_default_broker_config_is_reachable_in_memory() {
    let config = BrokerConfig::default();

    match config.provider {
        ProviderConfig::InMemory(in_memory) => {
            assert!(in_memory.reachable);
            assert_eq!(in_memory.max_queue_size, 10000);
        }
    }
}

#[test]
fn test_provider_config_deserializes_from_tagged_yaml() {
    let yaml = "provider:\n  type: in_memory\n  max_queue_size: 25\n";
    let config: BrokerConfig = serde_yaml::from_str(yaml).unwrap();

    match config.provider {
        ProviderConfig::InMemory(in_memory) => {
            assert_eq!(in_memory.max_queue_size, 25);
            assert!(in_memory.reachable, "unspecified fields keep defaults");
        }
    }
}
