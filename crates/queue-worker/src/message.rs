//! Message types for queue operations including core domain identifiers.

use crate::client::QueueProvider;
use crate::error::{QueueError, ValidationError};
use crate::provider::ProviderType;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Application-defined message content.
///
/// The core never inspects payloads; they are encoded by the queue handle that
/// publishes them and decoded by the handle that receives them.
pub type Payload = serde_json::Value;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name with length and character restrictions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > 255 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-255 characters".to_string(),
            });
        }

        // Broker queue names are routinely dotted (e.g. "orders.audit")
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, '-', '_', '.' and ':' allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Unique identifier for messages within the queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Wire Message Types
// ============================================================================

/// An encoded message as handed to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
}

impl Message {
    /// Create new message with body
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            attributes: HashMap::new(),
        }
    }

    /// Add message attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A message received from the queue with processing metadata
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
    pub receipt_handle: ReceiptHandle,
    pub delivery_count: u32,
    /// When the broker handed out this delivery; reset on every redelivery
    pub delivered_at: Timestamp,
}

impl ReceivedMessage {
    /// True when the broker has handed this message out before
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Opaque token for acknowledging or rejecting received messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHandle {
    handle: String,
    queue: QueueName,
    provider_type: ProviderType,
}

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: String, queue: QueueName, provider_type: ProviderType) -> Self {
        Self {
            handle,
            queue,
            provider_type,
        }
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Queue the message was received from
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Get provider type
    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }
}

// ============================================================================
// Processing Types
// ============================================================================

/// Instruction to publish `payload` to `queue` after the current message succeeds
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardDirective {
    pub queue: QueueName,
    pub payload: Payload,
}

impl ForwardDirective {
    /// Create a directive for an already validated queue name
    pub fn new(queue: QueueName, payload: Payload) -> Self {
        Self { queue, payload }
    }

    /// Create a directive from a raw queue name
    pub fn to(queue: &str, payload: Payload) -> Result<Self, ValidationError> {
        Ok(Self {
            queue: QueueName::new(queue.to_string())?,
            payload,
        })
    }
}

/// A received message held exclusively by its consumer.
///
/// Each terminal action consumes the delivery, so a message can be settled at
/// most once.
pub struct Delivery {
    message: ReceivedMessage,
    provider: Arc<dyn QueueProvider>,
}

impl Delivery {
    pub(crate) fn new(message: ReceivedMessage, provider: Arc<dyn QueueProvider>) -> Self {
        Self { message, provider }
    }

    /// Broker metadata for this delivery
    pub fn message(&self) -> &ReceivedMessage {
        &self.message
    }

    /// Message identifier
    pub fn message_id(&self) -> &MessageId {
        &self.message.message_id
    }

    /// Tell the broker the message was fully processed
    pub async fn ack(self) -> Result<(), QueueError> {
        self.provider
            .complete_message(&self.message.receipt_handle)
            .await
    }

    /// Return the message to its queue for redelivery
    pub async fn requeue(self) -> Result<(), QueueError> {
        self.provider
            .abandon_message(&self.message.receipt_handle)
            .await
    }

    /// Refuse the message; the broker routes it to its dead-letter path
    pub async fn reject(self) -> Result<(), QueueError> {
        self.provider
            .dead_letter_message(&self.message.receipt_handle, "rejected by consumer")
            .await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message_id", &self.message.message_id)
            .field("delivery_count", &self.message.delivery_count)
            .finish()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
