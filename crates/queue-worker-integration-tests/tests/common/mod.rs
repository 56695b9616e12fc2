//! Common test utilities for queue-worker integration tests
//!
//! This module provides:
//! - A counting metrics sink
//! - Helpers for naming queues and reading queue contents

use queue_worker::{codec, InMemoryProvider, MetricsSink, Payload, QueueName, Serializer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Validated queue name for tests
pub fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

/// Decode every ready message in `queue`, head first
#[allow(dead_code)]
pub fn ready_payloads(broker: &InMemoryProvider, queue: &QueueName) -> Vec<Payload> {
    broker
        .peek_bodies(queue)
        .iter()
        .map(|body| codec::decode(body, &HashMap::new(), Serializer::Json).unwrap())
        .collect()
}

/// Metrics sink counting each kind of sample
#[derive(Default)]
#[allow(dead_code)]
pub struct CountingMetrics {
    successes: AtomicUsize,
    failures: AtomicUsize,
    timings: AtomicUsize,
}

impl CountingMetrics {
    #[allow(dead_code)]
    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn timings(&self) -> usize {
        self.timings.load(Ordering::SeqCst)
    }
}

impl MetricsSink for CountingMetrics {
    fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn record_timing(&self, _duration: Duration) {
        self.timings.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or five seconds pass
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within five seconds"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
