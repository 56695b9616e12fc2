//! Tests for message types and deliveries.

use super::*;
use crate::providers::InMemoryProvider;
use serde_json::json;

mod queue_name {
    use super::*;

    #[test]
    fn test_accepts_dotted_and_dashed_names() {
        for name in ["orders", "orders.audit", "team-a_jobs", "ns:queue", "Q1"] {
            assert!(QueueName::new(name.to_string()).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_rejects_empty_and_oversized_names() {
        assert!(matches!(
            QueueName::new(String::new()),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            QueueName::new("a".repeat(256)),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(QueueName::new("a".repeat(255)).is_ok());
    }

    #[test]
    fn test_rejects_whitespace_and_slashes() {
        for name in ["with space", "a/b", "tab\tname", "ümlaut"] {
            assert!(
                matches!(
                    QueueName::new(name.to_string()),
                    Err(ValidationError::InvalidFormat { .. })
                ),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_parses_and_displays() {
        let name: QueueName = "orders.audit".parse().unwrap();
        assert_eq!(name.as_str(), "orders.audit");
        assert_eq!(name.to_string(), "orders.audit");
    }
}

mod forward_directive {
    use super::*;

    #[test]
    fn test_to_validates_queue_name() {
        let directive = ForwardDirective::to("audit", json!({"id": 1})).unwrap();
        assert_eq!(directive.queue.as_str(), "audit");
        assert_eq!(directive.payload, json!({"id": 1}));

        assert!(ForwardDirective::to("", json!(null)).is_err());
    }
}

mod delivery {
    use super::*;

    fn queue(name: &str) -> QueueName {
        QueueName::new(name.to_string()).unwrap()
    }

    async fn deliver_one(provider: &Arc<InMemoryProvider>, name: &QueueName) -> Delivery {
        provider
            .send_message(name, &Message::new(Bytes::from_static(b"{}")))
            .await
            .unwrap();
        let received = provider.receive_message(name).await.unwrap();
        Delivery::new(received, provider.clone())
    }

    #[tokio::test]
    async fn test_ack_settles_message() {
        let provider = Arc::new(InMemoryProvider::default());
        let orders = queue("orders");

        let delivery = deliver_one(&provider, &orders).await;
        assert_eq!(provider.in_flight_count(&orders), 1);

        delivery.ack().await.unwrap();
        assert_eq!(provider.in_flight_count(&orders), 0);
        assert_eq!(provider.queue_depth(&orders), 0);
    }

    #[tokio::test]
    async fn test_requeue_returns_message_for_redelivery() {
        let provider = Arc::new(InMemoryProvider::default());
        let orders = queue("orders");

        let delivery = deliver_one(&provider, &orders).await;
        assert!(!delivery.message().is_redelivery());
        delivery.requeue().await.unwrap();

        let again = provider.receive_message(&orders).await.unwrap();
        assert_eq!(again.delivery_count, 2);
        assert!(again.is_redelivery());
    }

    #[tokio::test]
    async fn test_reject_dead_letters_message() {
        let provider = Arc::new(InMemoryProvider::default());
        let orders = queue("orders");

        let delivery = deliver_one(&provider, &orders).await;
        delivery.reject().await.unwrap();

        assert_eq!(provider.dead_letter_count(&orders), 1);
        assert_eq!(provider.queue_depth(&orders), 0);
        assert_eq!(provider.in_flight_count(&orders), 0);
    }

    #[tokio::test]
    async fn test_debug_omits_body() {
        let provider = Arc::new(InMemoryProvider::default());
        let delivery = deliver_one(&provider, &queue("orders")).await;

        let rendered = format!("{:?}", delivery);
        assert!(rendered.contains("message_id"));
        assert!(!rendered.contains("body"));
    }
}
