//! # Queue Worker
//!
//! Single-queue message processing for a message broker: a consumer loop that
//! receives one message at a time, runs a handler and forwards its output, and
//! a producer that publishes batches under queue-depth backpressure.
//!
//! This library provides:
//! - A consumer loop with configurable failure recovery (requeue, reject or
//!   leave unacknowledged), pause support and per-message metrics
//! - Ordered forwarding of handler output before acknowledgement
//! - Flow-controlled batch publishing driven by a queue-depth probe
//! - Per-instance queue handle caching keyed by name and encoding
//! - JSON/YAML serialization with optional zstd compression
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Queue names, wire messages, deliveries and forward directives
//! - [`provider`] - Provider types and configuration
//! - [`client`] - Broker transport trait and factory
//! - [`providers`] - Broker implementations
//! - [`codec`] - Payload serializers and compression
//! - [`handle`] - Queue handles and the handle cache
//! - [`consumer`] - The consumer loop
//! - [`producer`] - Single and buffered publishing
//! - [`probe`] - Queue depth probing through the management API
//! - [`monitoring`] - Metrics sinks
//! - [`settings`] - Layered configuration

// Module declarations
pub mod client;
pub mod codec;
pub mod consumer;
pub mod error;
pub mod handle;
pub mod message;
pub mod monitoring;
pub mod probe;
pub mod producer;
pub mod provider;
pub mod providers;
pub mod settings;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueClientFactory, QueueProvider};
pub use codec::{Compression, Serializer};
pub use consumer::{
    handler_fn, Consumer, ConsumerHooks, ConsumerOptions, Forwards, HandlerError, MessageHandler,
    MessageOutcome, RecoveryPolicy,
};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use handle::{QueueCache, QueueHandle};
pub use message::{
    Delivery, ForwardDirective, Message, MessageId, Payload, QueueName, ReceiptHandle,
    ReceivedMessage, Timestamp,
};
pub use monitoring::{MetricsIdentity, MetricsOptions, MetricsSink, StatsdMetricsSink};
pub use probe::{HttpDepthProbe, ManagementApiConfig, QueueDepthProbe};
pub use producer::{BufferedPutOptions, BufferedPutSummary, Producer};
pub use provider::{BrokerConfig, InMemoryConfig, ProviderConfig, ProviderType};
pub use providers::InMemoryProvider;
pub use settings::WorkerSettings;
