//! Metrics collection for the consumer loop.
//!
//! The consumer reports three things per message: success, failure and the
//! time spent in the handler. Where those go is decided by a [`MetricsSink`]:
//!
//! - [`NoOpMetricsSink`] when metrics are disabled
//! - [`StatsdMetricsSink`] for a StatsD daemon reachable over UDP, via `cadence`
//!
//! # Best-Effort Pattern
//!
//! Recording a metric never fails from the caller's point of view. A sink
//! that cannot deliver a sample logs the problem and moves on; message
//! processing must not depend on the metrics backend.
//!
//! # Examples
//!
//! ```rust
//! use queue_worker::monitoring::{MetricsIdentity, MetricsSink, NoOpMetricsSink};
//! use std::time::Duration;
//!
//! let identity = MetricsIdentity::new("svc", "orders", "host.local", "3");
//! assert_eq!(identity.to_prefix(), "svc.orders.host_local.3");
//!
//! let metrics = NoOpMetricsSink;
//! metrics.record_timing(Duration::from_millis(12));
//! metrics.record_success();
//! ```

use crate::error::QueueError;
use cadence::prelude::*;
use cadence::{StatsdClient, UdpMetricSink};
use serde::{Deserialize, Serialize};
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Counter key for messages handled successfully
pub const SUCCESS_KEY: &str = "successful_job";

/// Counter key for messages whose handling failed
pub const FAILURE_KEY: &str = "failed_job";

/// Timer key for handler execution time
pub const TIMING_KEY: &str = "handle_data";

/// Destination for per-message metrics.
///
/// All methods take `&self` so one sink can be shared behind an `Arc`.
pub trait MetricsSink: Send + Sync {
    /// Record a message that was handled, forwarded and acknowledged
    fn record_success(&self);

    /// Record a message whose handling failed
    fn record_failure(&self);

    /// Record the time spent in the handler for one message
    fn record_timing(&self, duration: Duration);
}

/// Metrics sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetricsSink;

impl MetricsSink for NoOpMetricsSink {
    fn record_success(&self) {}

    fn record_failure(&self) {}

    fn record_timing(&self, _duration: Duration) {}
}

// ============================================================================
// Metrics identity
// ============================================================================

/// Identity of one worker in the metrics hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsIdentity {
    pub prefix: String,
    pub queue_name: String,
    pub hostname: String,
    pub worker_id: String,
}

impl MetricsIdentity {
    /// Create an identity from explicit parts
    pub fn new(
        prefix: impl Into<String>,
        queue_name: impl Into<String>,
        hostname: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            queue_name: queue_name.into(),
            hostname: hostname.into(),
            worker_id: worker_id.into(),
        }
    }

    /// Build an identity for this process.
    ///
    /// The worker id defaults to the OS process id, which is unique per host.
    pub fn detect(prefix: &str, queue_name: &str, worker_id: Option<&str>) -> Self {
        let hostname = nix::unistd::gethostname()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        let worker_id = worker_id
            .map(str::to_string)
            .unwrap_or_else(|| std::process::id().to_string());

        Self::new(prefix, queue_name, hostname, worker_id)
    }

    /// Render `{prefix}.{queue}.{hostname}.{worker_id}`.
    ///
    /// Dots in the hostname become underscores because metrics backends use
    /// `.` as their hierarchy separator.
    pub fn to_prefix(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.prefix,
            self.queue_name,
            self.hostname.replace('.', "_"),
            self.worker_id
        )
    }
}

// ============================================================================
// StatsD sink
// ============================================================================

/// Metrics settings for a worker; metrics are disabled without a host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsOptions {
    pub statsd_host: Option<String>,
    pub statsd_port: u16,
    pub statsd_prefix: String,
    pub worker_id: Option<String>,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            statsd_host: None,
            statsd_port: 8125,
            statsd_prefix: "queue_util".to_string(),
            worker_id: None,
        }
    }
}

impl MetricsOptions {
    /// Build the sink these options describe for a given source queue
    pub fn build_sink(&self, queue_name: &str) -> Result<Arc<dyn MetricsSink>, QueueError> {
        match &self.statsd_host {
            Some(host) => {
                let identity =
                    MetricsIdentity::detect(&self.statsd_prefix, queue_name, self.worker_id.as_deref());
                let sink = StatsdMetricsSink::connect(host, self.statsd_port, &identity)?;
                Ok(Arc::new(sink))
            }
            None => Ok(Arc::new(NoOpMetricsSink)),
        }
    }
}

/// Sends samples to a StatsD daemon over UDP
pub struct StatsdMetricsSink {
    client: StatsdClient,
    prefix: String,
}

impl std::fmt::Debug for StatsdMetricsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsdMetricsSink")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl StatsdMetricsSink {
    /// Open a non-blocking UDP socket aimed at the StatsD daemon
    pub fn connect(host: &str, port: u16, identity: &MetricsIdentity) -> Result<Self, QueueError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(|e| QueueError::ConnectionFailed {
            message: format!("failed to bind StatsD socket: {}", e),
        })?;
        socket
            .set_nonblocking(true)
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("failed to configure StatsD socket: {}", e),
            })?;

        let sink = UdpMetricSink::from((host, port), socket).map_err(|e| {
            QueueError::ConnectionFailed {
                message: format!("failed to resolve StatsD host {}:{}: {}", host, port, e),
            }
        })?;

        let prefix = identity.to_prefix();
        let client = StatsdClient::from_sink(&prefix, sink);
        info!(host = host, port = port, prefix = %prefix, "StatsD metrics enabled");

        Ok(Self { client, prefix })
    }

    /// Prefix prepended to every key
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn increment(&self, key: &str) {
        if let Err(e) = self.client.count(key, 1_i64) {
            debug!(error = %e, metric = key, "Dropped StatsD counter");
        }
    }
}

impl MetricsSink for StatsdMetricsSink {
    fn record_success(&self) {
        self.increment(SUCCESS_KEY);
    }

    fn record_failure(&self) {
        self.increment(FAILURE_KEY);
    }

    fn record_timing(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        if let Err(e) = self.client.time(TIMING_KEY, millis) {
            debug!(error = %e, metric = TIMING_KEY, "Dropped StatsD timer");
        }
    }
}

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;
