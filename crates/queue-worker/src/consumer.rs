//! # Consumer
//!
//! Listens to exactly one source queue and processes its messages one at a
//! time, forever (or until cancelled).
//!
//! Each iteration of the loop:
//!
//! 1. Waits while the pause predicate reports the consumer as paused
//! 2. Receives one message from the source queue
//! 3. Decodes it and runs the handler, timing the call
//! 4. On success, publishes every forward directive in order, acknowledges
//!    the message and records a success
//! 5. On failure, leaves the message unacknowledged, notifies the exception
//!    callback, applies the [`RecoveryPolicy`] and records a failure
//!
//! A failing message never stops the loop. Forward directives are always
//! published before the source message is acknowledged, so a crash in
//! between leads to redelivery and possibly duplicated forwards; handlers
//! must tolerate that.
//!
//! # Example
//!
//! ```rust,no_run
//! use queue_worker::consumer::{handler_fn, Consumer, ConsumerOptions, Forwards};
//! use queue_worker::message::{ForwardDirective, QueueName};
//! use queue_worker::providers::InMemoryProvider;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(InMemoryProvider::default());
//! let source = QueueName::new("orders".to_string())?;
//!
//! let handler = handler_fn(|payload| async move {
//!     Ok(Forwards::one(ForwardDirective::to("audit", payload)?))
//! });
//!
//! let mut consumer =
//!     Consumer::connect(provider, &source, handler, ConsumerOptions::default()).await?;
//!
//! let shutdown = CancellationToken::new();
//! consumer.run(shutdown.clone()).await;
//! # Ok(())
//! # }
//! ```

use crate::client::{ensure_reachable, QueueProvider};
use crate::codec::{Compression, Serializer};
use crate::error::QueueError;
use crate::handle::{QueueCache, QueueHandle};
use crate::message::{Delivery, ForwardDirective, Payload, QueueName};
use crate::monitoring::{MetricsOptions, MetricsSink};
use crate::settings::WorkerSettings;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Error type handlers use to signal failure
pub type HandlerError = anyhow::Error;

/// Callback invoked with the error before the recovery action runs
pub type ExceptionCallback = Arc<dyn Fn(&HandlerError) + Send + Sync>;

// ============================================================================
// Handler contract
// ============================================================================

/// Lazily produced forward directives returned by a handler.
///
/// The consumer drains the sequence, publishing each directive as it is
/// produced, before acknowledging the source message.
pub struct Forwards(Box<dyn Iterator<Item = ForwardDirective> + Send>);

impl Forwards {
    /// Nothing to forward
    pub fn none() -> Self {
        Self(Box::new(std::iter::empty()))
    }

    /// Forward a single payload
    pub fn one(directive: ForwardDirective) -> Self {
        Self(Box::new(std::iter::once(directive)))
    }

    /// Forward whatever `iter` yields, evaluated lazily
    pub fn lazy<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = ForwardDirective>,
        I::IntoIter: Send + 'static,
    {
        Self(Box::new(iter.into_iter()))
    }
}

impl Default for Forwards {
    fn default() -> Self {
        Self::none()
    }
}

impl Iterator for Forwards {
    type Item = ForwardDirective;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl FromIterator<ForwardDirective> for Forwards {
    fn from_iter<I: IntoIterator<Item = ForwardDirective>>(iter: I) -> Self {
        Self::lazy(iter.into_iter().collect::<Vec<_>>())
    }
}

/// Processes one payload; returning `Err` marks the message as failed
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: Payload) -> Result<Forwards, HandlerError>;
}

/// Adapter turning an async closure into a [`MessageHandler`]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a handler
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Forwards, HandlerError>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Forwards, HandlerError>> + Send + 'static,
{
    async fn handle(&self, payload: Payload) -> Result<Forwards, HandlerError> {
        (self.f)(payload).await
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// What happens to a message whose handler failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Return the message to its queue
    Requeue,
    /// Refuse the message (dead-letter or discard, per broker configuration)
    Reject,
    /// Take no action; the broker decides the message's fate
    LeaveUnacknowledged,
}

impl RecoveryPolicy {
    /// Collapse the two failure flags; requeue wins when both are set
    pub fn from_flags(requeue_on_failure: bool, reject_on_failure: bool) -> Self {
        if requeue_on_failure {
            Self::Requeue
        } else if reject_on_failure {
            Self::Reject
        } else {
            Self::LeaveUnacknowledged
        }
    }
}

/// Optional behaviour injected into the loop
#[derive(Clone, Default)]
pub struct ConsumerHooks {
    /// Checked before every message; keep it cheap. Never paused when unset.
    pub is_paused: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
    /// Called after each successfully processed message
    pub post_handle: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl ConsumerHooks {
    /// Set the pause predicate
    pub fn with_is_paused(mut self, f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.is_paused = Some(Arc::new(f));
        self
    }

    /// Set the hook run after each acknowledged message
    pub fn with_post_handle(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.post_handle = Some(Arc::new(f));
        self
    }
}

/// Consumer construction options
#[derive(Clone)]
pub struct ConsumerOptions {
    /// Poll interval while paused
    pub pause_delay: Duration,
    /// Default serializer for the source and forward queues
    pub serializer: Serializer,
    /// Default compression for the source and forward queues
    pub compression: Option<Compression>,
    pub requeue_on_failure: bool,
    pub reject_on_failure: bool,
    pub on_exception: Option<ExceptionCallback>,
    pub hooks: ConsumerHooks,
    pub metrics: MetricsOptions,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            pause_delay: Duration::from_secs(5),
            serializer: Serializer::default(),
            compression: None,
            requeue_on_failure: true,
            reject_on_failure: false,
            on_exception: None,
            hooks: ConsumerHooks::default(),
            metrics: MetricsOptions::default(),
        }
    }
}

impl ConsumerOptions {
    /// Options described by loaded worker settings
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            pause_delay: Duration::from_secs(settings.consumer.pause_delay_seconds),
            serializer: settings.consumer.serializer,
            compression: settings.consumer.compression,
            requeue_on_failure: settings.consumer.requeue_on_failure,
            reject_on_failure: settings.consumer.reject_on_failure,
            on_exception: None,
            hooks: ConsumerHooks::default(),
            metrics: settings.metrics.clone(),
        }
    }

    /// Set the poll interval used while paused
    pub fn with_pause_delay(mut self, pause_delay: Duration) -> Self {
        self.pause_delay = pause_delay;
        self
    }

    /// Set the default serializer and compression for queue handles
    pub fn with_encoding(mut self, serializer: Serializer, compression: Option<Compression>) -> Self {
        self.serializer = serializer;
        self.compression = compression;
        self
    }

    /// Set the failure flags; requeue wins when both are true
    pub fn with_failure_flags(mut self, requeue_on_failure: bool, reject_on_failure: bool) -> Self {
        self.requeue_on_failure = requeue_on_failure;
        self.reject_on_failure = reject_on_failure;
        self
    }

    /// Set the callback invoked with each handler error
    pub fn with_exception_callback(
        mut self,
        callback: impl Fn(&HandlerError) + Send + Sync + 'static,
    ) -> Self {
        self.on_exception = Some(Arc::new(callback));
        self
    }

    /// Replace the pause predicate and post-handle hook
    pub fn with_hooks(mut self, hooks: ConsumerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Set the StatsD metrics settings
    pub fn with_metrics(mut self, metrics: MetricsOptions) -> Self {
        self.metrics = metrics;
        self
    }
}

// ============================================================================
// Pause tracking
// ============================================================================

/// A change in the consumer's paused state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseTransition {
    Entered,
    Left,
}

/// Remembers whether the consumer is paused so transitions are reported once
#[derive(Debug, Default)]
pub struct PauseTracker {
    paused: bool,
}

impl PauseTracker {
    /// Feed the latest predicate result; returns a transition only on change
    pub fn observe(&mut self, paused: bool) -> Option<PauseTransition> {
        let transition = match (self.paused, paused) {
            (false, true) => Some(PauseTransition::Entered),
            (true, false) => Some(PauseTransition::Left),
            _ => None,
        };
        self.paused = paused;
        transition
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Final state of one processed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Handler succeeded, forwards were published and the message was acked
    Acknowledged { forwarded: usize },
    /// Handler failed and the message was requeued
    Requeued,
    /// Handler failed and the message was rejected
    Rejected,
    /// Handler failed and the message was left as delivered
    LeftUnacknowledged,
    /// The broker refused the ack, requeue or reject
    SettleFailed { error: String },
}

/// Single-queue, one-message-at-a-time consumer
pub struct Consumer {
    source: Arc<QueueHandle>,
    queues: QueueCache,
    handler: Arc<dyn MessageHandler>,
    policy: RecoveryPolicy,
    pause_delay: Duration,
    hooks: ConsumerHooks,
    on_exception: Option<ExceptionCallback>,
    metrics: Arc<dyn MetricsSink>,
    pause: PauseTracker,
}

impl Consumer {
    /// Connect to the broker and open the source queue.
    ///
    /// Fails with [`QueueError::ConnectionFailed`] when the broker is
    /// unreachable.
    pub async fn connect(
        provider: Arc<dyn QueueProvider>,
        source: &QueueName,
        handler: impl MessageHandler + 'static,
        options: ConsumerOptions,
    ) -> Result<Self, QueueError> {
        ensure_reachable(provider.as_ref()).await?;

        let mut queues = QueueCache::new(provider, options.serializer, options.compression);
        let source = queues.get_queue(source, None, None).await?;
        let metrics = options.metrics.build_sink(source.name().as_str())?;
        let policy =
            RecoveryPolicy::from_flags(options.requeue_on_failure, options.reject_on_failure);

        info!(
            queue = %source.name(),
            policy = ?policy,
            serializer = ?options.serializer,
            compression = ?options.compression,
            "Consumer connected"
        );

        Ok(Self {
            source,
            queues,
            handler: Arc::new(handler),
            policy,
            pause_delay: options.pause_delay,
            hooks: options.hooks,
            on_exception: options.on_exception,
            metrics,
            pause: PauseTracker::default(),
        })
    }

    /// Replace the metrics sink built from the options
    pub fn with_metrics_sink(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Source queue name
    pub fn source(&self) -> &QueueName {
        self.source.name()
    }

    /// Recovery policy chosen at construction
    pub fn recovery_policy(&self) -> RecoveryPolicy {
        self.policy
    }

    /// Resolve a queue handle through this consumer's cache
    pub async fn get_queue(
        &mut self,
        name: &QueueName,
        serializer: Option<Serializer>,
        compression: Option<Compression>,
    ) -> Result<Arc<QueueHandle>, QueueError> {
        self.queues.get_queue(name, serializer, compression).await
    }

    /// Process messages until `shutdown` is cancelled.
    ///
    /// Cancellation interrupts waiting (for a message or while paused) but
    /// never a message that is already being processed.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(queue = %self.source.name(), "Consumer started");

        while !shutdown.is_cancelled() {
            if !self.wait_while_paused(&shutdown).await {
                break;
            }

            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.source.receive() => received,
            };

            match received {
                Ok(delivery) => {
                    self.process(delivery).await;
                }
                Err(err) => {
                    error!(
                        queue = %self.source.name(),
                        error = %err,
                        "Failed to receive message"
                    );
                    if !sleep_unless_cancelled(self.pause_delay, &shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(queue = %self.source.name(), "Consumer stopped");
    }

    /// Receive and process exactly one message
    pub async fn process_next(&mut self) -> Result<MessageOutcome, QueueError> {
        let delivery = self.source.receive().await?;
        Ok(self.process(delivery).await)
    }

    /// Block while the pause predicate holds; false when cancelled meanwhile
    async fn wait_while_paused(&mut self, shutdown: &CancellationToken) -> bool {
        let Some(is_paused) = self.hooks.is_paused.clone() else {
            return true;
        };

        loop {
            let paused = is_paused();
            match self.pause.observe(paused) {
                Some(PauseTransition::Entered) => {
                    info!(queue = %self.source.name(), "Consumer is now paused")
                }
                Some(PauseTransition::Left) => {
                    info!(queue = %self.source.name(), "Consumer is no longer paused")
                }
                None => {}
            }

            if !paused {
                return true;
            }
            if !sleep_unless_cancelled(self.pause_delay, shutdown).await {
                return false;
            }
        }
    }

    async fn process(&mut self, delivery: Delivery) -> MessageOutcome {
        let span = info_span!(
            "message",
            queue = %self.source.name(),
            message_id = %delivery.message_id(),
            delivery_count = delivery.message().delivery_count,
            delivered_at = %delivery.message().delivered_at,
        );

        async move {
            match self.handle_and_forward(&delivery).await {
                Ok(forwarded) => self.acknowledge(delivery, forwarded).await,
                Err(err) => self.recover(delivery, err).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Decode, run the handler and publish its forwards
    async fn handle_and_forward(&mut self, delivery: &Delivery) -> Result<usize, HandlerError> {
        let payload = self.source.decode(delivery)?;

        let started = Instant::now();
        let result = self.handler.handle(payload).await;
        self.metrics.record_timing(started.elapsed());

        let mut forwarded = 0;
        for directive in result? {
            let destination = self.queues.get_queue(&directive.queue, None, None).await?;
            destination.publish(&directive.payload).await?;
            debug!(destination = %directive.queue, "Forwarded message");
            forwarded += 1;
        }

        Ok(forwarded)
    }

    async fn acknowledge(&mut self, delivery: Delivery, forwarded: usize) -> MessageOutcome {
        if let Err(err) = delivery.ack().await {
            error!(error = %err, "Failed to acknowledge message");
            self.metrics.record_failure();
            return MessageOutcome::SettleFailed {
                error: err.to_string(),
            };
        }

        self.metrics.record_success();
        debug!(forwarded, "Message processed");

        if let Some(post_handle) = &self.hooks.post_handle {
            post_handle();
        }

        MessageOutcome::Acknowledged { forwarded }
    }

    async fn recover(&mut self, delivery: Delivery, err: HandlerError) -> MessageOutcome {
        error!(error = ?err, "Exception handling data");

        if let Some(callback) = &self.on_exception {
            callback(&err);
        }

        let outcome = match self.policy {
            RecoveryPolicy::Requeue => delivery.requeue().await.map(|_| MessageOutcome::Requeued),
            RecoveryPolicy::Reject => delivery.reject().await.map(|_| MessageOutcome::Rejected),
            RecoveryPolicy::LeaveUnacknowledged => {
                warn!("Leaving failed message unacknowledged");
                Ok(MessageOutcome::LeftUnacknowledged)
            }
        };

        self.metrics.record_failure();

        outcome.unwrap_or_else(|settle_err| {
            error!(error = %settle_err, policy = ?self.policy, "Failed to apply recovery policy");
            MessageOutcome::SettleFailed {
                error: settle_err.to_string(),
            }
        })
    }
}

/// Sleep for `delay`; false if `shutdown` fired first
async fn sleep_unless_cancelled(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
