//! # Producer
//!
//! Publishes payloads to one destination queue, either one at a time with
//! [`Producer::put`] or from a (possibly unbounded) sequence with
//! [`Producer::buffered_put`].
//!
//! `buffered_put` applies polling backpressure: after each full batch it
//! waits for the destination to drain below a threshold, measured through a
//! [`QueueDepthProbe`]. Depth readings are approximate and lag recent
//! publishes, so the bound is best effort. Several producers sharing a
//! destination, or a probe that lags, can push the real depth above
//! `batch_size` for a while.
//!
//! # Example
//!
//! ```rust
//! use queue_worker::codec::Serializer;
//! use queue_worker::message::QueueName;
//! use queue_worker::producer::{BufferedPutOptions, Producer};
//! use queue_worker::providers::InMemoryProvider;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! // The in-memory broker doubles as its own depth probe
//! let broker = Arc::new(InMemoryProvider::default());
//! let jobs = QueueName::new("jobs".to_string()).unwrap();
//! let producer = Producer::connect(broker.clone(), broker.clone(), &jobs, Serializer::Json, None)
//!     .await
//!     .unwrap();
//!
//! let input = (0..3).map(|i| json!({ "seq": i }));
//! let summary = producer
//!     .buffered_put(input, &BufferedPutOptions::new(10))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(summary.published, 3);
//! assert_eq!(broker.queue_depth(&jobs), 3);
//! # });
//! ```

use crate::client::{ensure_reachable, QueueProvider};
use crate::codec::{Compression, Serializer};
use crate::error::{QueueError, ValidationError};
use crate::handle::{QueueCache, QueueHandle};
use crate::message::{MessageId, Payload, QueueName};
use crate::probe::QueueDepthProbe;
use crate::settings::ProducerSettings;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Flow-control settings for [`Producer::buffered_put`]
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedPutOptions {
    /// Maximum consecutive publishes before checking queue depth
    pub batch_size: usize,
    /// Publishing resumes once depth drops below `resume_threshold * batch_size`
    pub resume_threshold: f64,
    /// Settle delay after each batch and between depth polls
    pub delay: Duration,
}

impl BufferedPutOptions {
    /// Options with the given batch size and default threshold and delay
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            resume_threshold: 0.1,
            delay: Duration::from_secs(5),
        }
    }

    /// Set the fraction of `batch_size` below which publishing resumes
    pub fn with_resume_threshold(mut self, resume_threshold: f64) -> Self {
        self.resume_threshold = resume_threshold;
        self
    }

    /// Set the settle delay after each batch and between depth polls
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Reject option combinations that cannot make progress
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::OutOfRange {
                field: "batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        // A depth below zero never happens, so a non-positive threshold stalls forever
        if !(self.resume_threshold > 0.0) {
            return Err(ValidationError::OutOfRange {
                field: "resume_threshold".to_string(),
                message: format!("must be greater than 0, got {}", self.resume_threshold),
            });
        }

        Ok(())
    }

    /// Depth below which publishing resumes
    pub fn resume_depth(&self) -> f64 {
        self.resume_threshold * self.batch_size as f64
    }
}

impl From<&ProducerSettings> for BufferedPutOptions {
    fn from(settings: &ProducerSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            resume_threshold: settings.resume_threshold,
            delay: Duration::from_secs(settings.delay_seconds),
        }
    }
}

/// Totals for one `buffered_put` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferedPutSummary {
    /// Payloads published
    pub published: usize,
    /// Non-empty batches published
    pub batches: usize,
}

/// Publisher bound to one destination queue
pub struct Producer {
    destination: Arc<QueueHandle>,
    queues: QueueCache,
    probe: Arc<dyn QueueDepthProbe>,
}

impl Producer {
    /// Connect to the broker and open the destination queue.
    ///
    /// Fails with [`QueueError::ConnectionFailed`] when the broker is
    /// unreachable.
    pub async fn connect(
        provider: Arc<dyn QueueProvider>,
        probe: Arc<dyn QueueDepthProbe>,
        destination: &QueueName,
        serializer: Serializer,
        compression: Option<Compression>,
    ) -> Result<Self, QueueError> {
        ensure_reachable(provider.as_ref()).await?;

        let mut queues = QueueCache::new(provider, serializer, compression);
        let destination = queues.get_queue(destination, None, None).await?;

        info!(
            queue = %destination.name(),
            serializer = ?serializer,
            compression = ?compression,
            "Producer connected"
        );

        Ok(Self {
            destination,
            queues,
            probe,
        })
    }

    /// Destination queue name
    pub fn destination(&self) -> &QueueName {
        self.destination.name()
    }

    /// Resolve a queue handle through this producer's cache
    pub async fn get_queue(
        &mut self,
        name: &QueueName,
        serializer: Option<Serializer>,
        compression: Option<Compression>,
    ) -> Result<Arc<QueueHandle>, QueueError> {
        self.queues.get_queue(name, serializer, compression).await
    }

    /// Publish one payload without flow control
    pub async fn put(&self, payload: &Payload) -> Result<MessageId, QueueError> {
        self.destination.publish(payload).await
    }

    /// Publish every payload from `input`, pausing after each full batch
    /// until the destination drains.
    ///
    /// Returns when `input` is exhausted. Publish and depth-probe errors
    /// end the call; payloads already published stay published.
    pub async fn buffered_put<I>(
        &self,
        input: I,
        options: &BufferedPutOptions,
    ) -> Result<BufferedPutSummary, QueueError>
    where
        I: IntoIterator<Item = Payload>,
        I::IntoIter: Send,
    {
        options.validate()?;

        let mut input = input.into_iter();
        let mut summary = BufferedPutSummary::default();

        loop {
            debug!(
                queue = %self.destination.name(),
                batch = summary.batches + 1,
                "Starting batch"
            );

            let mut in_batch = 0;
            while in_batch < options.batch_size {
                let Some(payload) = input.next() else {
                    if in_batch > 0 {
                        summary.batches += 1;
                    }
                    debug!(
                        queue = %self.destination.name(),
                        published = summary.published,
                        batches = summary.batches,
                        "Input exhausted"
                    );
                    return Ok(summary);
                };

                self.destination.publish(&payload).await?;
                in_batch += 1;
                summary.published += 1;
            }

            summary.batches += 1;
            debug!(
                queue = %self.destination.name(),
                published = summary.published,
                "Batch published"
            );

            self.wait_for_drain(options).await?;
        }
    }

    /// Sleep once, then poll until depth is below the resume depth
    async fn wait_for_drain(&self, options: &BufferedPutOptions) -> Result<(), QueueError> {
        let resume_depth = options.resume_depth();

        tokio::time::sleep(options.delay).await;
        loop {
            let depth = self.probe.message_count(self.destination.name()).await?;
            if (depth as f64) < resume_depth {
                return Ok(());
            }

            debug!(
                queue = %self.destination.name(),
                depth,
                resume_depth,
                "Waiting for queue to drain"
            );
            tokio::time::sleep(options.delay).await;
        }
    }
}

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;
