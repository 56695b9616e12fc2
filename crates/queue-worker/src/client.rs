//! Broker transport trait and connection factory.

use crate::error::QueueError;
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::{BrokerConfig, ProviderConfig, ProviderType};
use crate::providers::InMemoryProvider;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Interface implemented by specific queue providers.
///
/// Everything the consumer and producer do on the wire goes through this
/// trait; wire protocol and persistence are the provider's concern.
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Make sure the named queue exists
    async fn declare_queue(&self, queue: &QueueName) -> Result<(), QueueError>;

    /// Send single message
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError>;

    /// Receive single message, waiting until one is available
    async fn receive_message(&self, queue: &QueueName) -> Result<ReceivedMessage, QueueError>;

    /// Complete message processing (ack)
    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Abandon message for retry (requeue)
    async fn abandon_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Send to dead letter queue (reject)
    async fn dead_letter_message(
        &self,
        receipt: &ReceiptHandle,
        reason: &str,
    ) -> Result<(), QueueError>;

    /// Verify the broker can be reached
    async fn check_connection(&self) -> Result<(), QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Factory for opening broker connections from configuration
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create a provider from configuration and verify it is reachable
    pub async fn connect(config: &BrokerConfig) -> Result<Arc<dyn QueueProvider>, QueueError> {
        let provider: Arc<dyn QueueProvider> = match &config.provider {
            ProviderConfig::InMemory(in_memory_config) => {
                Arc::new(InMemoryProvider::new(in_memory_config.clone()))
            }
        };

        ensure_reachable(provider.as_ref()).await?;
        Ok(provider)
    }
}

/// Run the provider's connectivity check, surfacing any failure as a
/// connection error
pub(crate) async fn ensure_reachable(provider: &dyn QueueProvider) -> Result<(), QueueError> {
    match provider.check_connection().await {
        Ok(()) => {
            debug!(provider = provider.provider_type().as_str(), "Broker is reachable");
            Ok(())
        }
        Err(err) => {
            error!(
                provider = provider.provider_type().as_str(),
                error = %err,
                "Broker is unreachable"
            );

            match err {
                QueueError::ConnectionFailed { .. } => Err(err),
                other => Err(QueueError::ConnectionFailed {
                    message: other.to_string(),
                }),
            }
        }
    }
}
