//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a fully functional in-process broker that:
//! - Keeps one FIFO of ready messages per queue
//! - Tracks received-but-unsettled messages by receipt handle
//! - Puts requeued messages back at the head of their queue
//! - Keeps rejected messages in a per-queue dead letter list
//!
//! This provider is intended for:
//! - Unit testing of consumers and producers
//! - Development and prototyping
//! - Reference behaviour for real broker providers

use crate::client::QueueProvider;
use crate::error::QueueError;
use crate::message::{
    Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp,
};
use crate::probe::QueueDepthProbe;
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tokio::sync::Notify;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    config: InMemoryConfig,
}

impl QueueStorage {
    fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: HashMap::new(),
            config,
        }
    }

    /// Get or create a queue
    fn get_or_create_queue(&mut self, queue_name: &QueueName) -> &mut InMemoryQueue {
        self.queues.entry(queue_name.clone()).or_default()
    }
}

/// Internal queue state for a single queue
#[derive(Default)]
struct InMemoryQueue {
    /// Ready messages (FIFO order)
    messages: VecDeque<StoredMessage>,
    /// Rejected messages
    dead_letter: VecDeque<StoredMessage>,
    /// Received messages awaiting ack/requeue/reject, keyed by receipt
    in_flight: HashMap<String, StoredMessage>,
}

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    attributes: HashMap<String, String>,
    delivery_count: u32,
}

impl StoredMessage {
    fn from_message(message: &Message, message_id: MessageId) -> Self {
        Self {
            message_id,
            body: message.body.clone(),
            attributes: message.attributes.clone(),
            delivery_count: 0,
        }
    }
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider implementation
pub struct InMemoryProvider {
    storage: Arc<RwLock<QueueStorage>>,
    ready: Arc<Notify>,
}

impl InMemoryProvider {
    /// Create new in-memory provider with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::new(config))),
            ready: Arc::new(Notify::new()),
        }
    }

    /// Number of ready messages in the queue
    pub fn queue_depth(&self, queue: &QueueName) -> usize {
        self.read_queue(queue, |q| q.messages.len())
    }

    /// Number of received messages not yet settled
    pub fn in_flight_count(&self, queue: &QueueName) -> usize {
        self.read_queue(queue, |q| q.in_flight.len())
    }

    /// Number of rejected messages
    pub fn dead_letter_count(&self, queue: &QueueName) -> usize {
        self.read_queue(queue, |q| q.dead_letter.len())
    }

    /// Bodies of the ready messages, head first
    pub fn peek_bodies(&self, queue: &QueueName) -> Vec<Bytes> {
        self.read_queue(queue, |q| q.messages.iter().map(|m| m.body.clone()).collect())
    }

    fn read_queue<T: Default>(&self, queue: &QueueName, f: impl FnOnce(&InMemoryQueue) -> T) -> T {
        match self.storage.read() {
            Ok(storage) => storage.queues.get(queue).map(f).unwrap_or_default(),
            Err(poisoned) => poisoned.into_inner().queues.get(queue).map(f).unwrap_or_default(),
        }
    }

    fn write_storage(&self) -> Result<RwLockWriteGuard<'_, QueueStorage>, QueueError> {
        self.storage.write().map_err(|_| QueueError::ProviderError {
            provider: ProviderType::InMemory.as_str().to_string(),
            code: "LockPoisoned".to_string(),
            message: "queue storage lock poisoned".to_string(),
        })
    }

    /// Take the head message, moving it to the in-flight table
    fn try_take(&self, queue: &QueueName) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut storage = self.write_storage()?;
        let state = storage.get_or_create_queue(queue);

        let Some(mut stored) = state.messages.pop_front() else {
            return Ok(None);
        };

        stored.delivery_count += 1;
        let receipt = uuid::Uuid::new_v4().to_string();
        let received = ReceivedMessage {
            message_id: stored.message_id.clone(),
            body: stored.body.clone(),
            attributes: stored.attributes.clone(),
            receipt_handle: ReceiptHandle::new(
                receipt.clone(),
                queue.clone(),
                ProviderType::InMemory,
            ),
            delivery_count: stored.delivery_count,
            delivered_at: Timestamp::now(),
        };
        state.in_flight.insert(receipt, stored);

        Ok(Some(received))
    }

    /// Remove a message from the in-flight table
    fn settle(
        &self,
        receipt: &ReceiptHandle,
    ) -> Result<(RwLockWriteGuard<'_, QueueStorage>, StoredMessage), QueueError> {
        let mut storage = self.write_storage()?;
        let stored = storage
            .queues
            .get_mut(receipt.queue())
            .and_then(|q| q.in_flight.remove(receipt.handle()))
            .ok_or_else(|| QueueError::MessageNotFound {
                receipt: receipt.handle().to_string(),
            })?;
        Ok((storage, stored))
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueProvider for InMemoryProvider {
    async fn declare_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        self.write_storage()?.get_or_create_queue(queue);
        Ok(())
    }

    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError> {
        let max_size = ProviderType::InMemory.max_message_size();
        if message.body.len() > max_size {
            return Err(QueueError::ProviderError {
                provider: ProviderType::InMemory.as_str().to_string(),
                code: "MessageTooLarge".to_string(),
                message: format!("{} bytes exceeds {} bytes", message.body.len(), max_size),
            });
        }

        let message_id = MessageId::new();
        {
            let mut storage = self.write_storage()?;
            let max_queue_size = storage.config.max_queue_size;
            let state = storage.get_or_create_queue(queue);

            if state.messages.len() >= max_queue_size {
                warn!(queue = %queue, max_queue_size, "In-memory queue is full");
                return Err(QueueError::ProviderError {
                    provider: ProviderType::InMemory.as_str().to_string(),
                    code: "QueueFull".to_string(),
                    message: format!("queue '{}' holds {} messages", queue, max_queue_size),
                });
            }

            state
                .messages
                .push_back(StoredMessage::from_message(message, message_id.clone()));
        }

        self.ready.notify_waiters();
        Ok(message_id)
    }

    async fn receive_message(&self, queue: &QueueName) -> Result<ReceivedMessage, QueueError> {
        loop {
            // Register interest before looking so a concurrent send cannot be missed
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(received) = self.try_take(queue)? {
                return Ok(received);
            }

            notified.await;
        }
    }

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let (_storage, stored) = self.settle(receipt)?;
        debug!(queue = %receipt.queue(), message_id = %stored.message_id, "Message completed");
        Ok(())
    }

    async fn abandon_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        {
            let (mut storage, stored) = self.settle(receipt)?;
            debug!(queue = %receipt.queue(), message_id = %stored.message_id, "Message requeued");
            storage
                .get_or_create_queue(receipt.queue())
                .messages
                .push_front(stored);
        }

        self.ready.notify_waiters();
        Ok(())
    }

    async fn dead_letter_message(
        &self,
        receipt: &ReceiptHandle,
        reason: &str,
    ) -> Result<(), QueueError> {
        let (mut storage, stored) = self.settle(receipt)?;
        debug!(
            queue = %receipt.queue(),
            message_id = %stored.message_id,
            reason = reason,
            "Message dead-lettered"
        );
        storage
            .get_or_create_queue(receipt.queue())
            .dead_letter
            .push_back(stored);
        Ok(())
    }

    async fn check_connection(&self) -> Result<(), QueueError> {
        let reachable = match self.storage.read() {
            Ok(storage) => storage.config.reachable,
            Err(poisoned) => poisoned.into_inner().config.reachable,
        };

        if reachable {
            Ok(())
        } else {
            Err(QueueError::ConnectionFailed {
                message: "in-memory broker configured as unreachable".to_string(),
            })
        }
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}

#[async_trait]
impl QueueDepthProbe for InMemoryProvider {
    async fn message_count(&self, queue: &QueueName) -> Result<u64, QueueError> {
        Ok(self.queue_depth(queue) as u64)
    }
}
