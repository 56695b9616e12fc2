//! Queue handles and the per-instance handle cache.

use crate::client::QueueProvider;
use crate::codec::{self, Compression, Serializer};
use crate::error::QueueError;
use crate::message::{Delivery, MessageId, Payload, QueueName};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A named queue opened with fixed encoding options
pub struct QueueHandle {
    name: QueueName,
    serializer: Serializer,
    compression: Option<Compression>,
    provider: Arc<dyn QueueProvider>,
}

impl QueueHandle {
    /// Queue this handle publishes to and receives from
    pub fn name(&self) -> &QueueName {
        &self.name
    }

    /// Serializer applied to published payloads
    pub fn serializer(&self) -> Serializer {
        self.serializer
    }

    /// Compression applied to published payloads
    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }

    /// Encode and publish one payload
    pub async fn publish(&self, payload: &Payload) -> Result<MessageId, QueueError> {
        let message = codec::encode(payload, self.serializer, self.compression)?;
        self.provider.send_message(&self.name, &message).await
    }

    /// Wait for the next message on this queue
    pub async fn receive(&self) -> Result<Delivery, QueueError> {
        let received = self.provider.receive_message(&self.name).await?;
        Ok(Delivery::new(received, Arc::clone(&self.provider)))
    }

    /// Decode a delivery received from this queue
    pub fn decode(&self, delivery: &Delivery) -> Result<Payload, QueueError> {
        let message = delivery.message();
        Ok(codec::decode(
            &message.body,
            &message.attributes,
            self.serializer,
        )?)
    }
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("name", &self.name)
            .field("serializer", &self.serializer)
            .field("compression", &self.compression)
            .finish()
    }
}

type CacheKey = (QueueName, Serializer, Option<Compression>);

/// Lazily opened handles, one per `(name, serializer, compression)`.
///
/// Each consumer and producer owns its own cache.
pub struct QueueCache {
    provider: Arc<dyn QueueProvider>,
    default_serializer: Serializer,
    default_compression: Option<Compression>,
    handles: HashMap<CacheKey, Arc<QueueHandle>>,
}

impl QueueCache {
    /// Create an empty cache with instance-level encoding defaults
    pub fn new(
        provider: Arc<dyn QueueProvider>,
        default_serializer: Serializer,
        default_compression: Option<Compression>,
    ) -> Self {
        Self {
            provider,
            default_serializer,
            default_compression,
            handles: HashMap::new(),
        }
    }

    /// Return the cached handle for the effective key, opening it on first use.
    ///
    /// Options left as `None` fall back to the instance defaults before the
    /// key is built, so an explicit option equal to the default shares the
    /// default handle.
    ///
    /// # Example
    ///
    /// ```rust
    /// use queue_worker::codec::{Compression, Serializer};
    /// use queue_worker::handle::QueueCache;
    /// use queue_worker::message::QueueName;
    /// use queue_worker::providers::InMemoryProvider;
    /// use std::sync::Arc;
    ///
    /// # tokio_test::block_on(async {
    /// let provider = Arc::new(InMemoryProvider::default());
    /// let mut cache = QueueCache::new(provider, Serializer::Json, None);
    /// let audit = QueueName::new("audit".to_string()).unwrap();
    ///
    /// let plain = cache.get_queue(&audit, None, None).await.unwrap();
    /// let again = cache.get_queue(&audit, Some(Serializer::Json), None).await.unwrap();
    /// let packed = cache.get_queue(&audit, None, Some(Compression::Zstd)).await.unwrap();
    ///
    /// assert!(Arc::ptr_eq(&plain, &again));
    /// assert!(!Arc::ptr_eq(&plain, &packed));
    /// # });
    /// ```
    pub async fn get_queue(
        &mut self,
        name: &QueueName,
        serializer: Option<Serializer>,
        compression: Option<Compression>,
    ) -> Result<Arc<QueueHandle>, QueueError> {
        let serializer = serializer.unwrap_or(self.default_serializer);
        let compression = compression.or(self.default_compression);
        let key = (name.clone(), serializer, compression);

        if let Some(handle) = self.handles.get(&key) {
            return Ok(Arc::clone(handle));
        }

        self.provider.declare_queue(name).await?;
        debug!(
            queue = %name,
            serializer = ?serializer,
            compression = ?compression,
            "Opened queue handle"
        );

        let handle = Arc::new(QueueHandle {
            name: name.clone(),
            serializer,
            compression,
            provider: Arc::clone(&self.provider),
        });
        self.handles.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of open handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when no handle has been opened yet
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
