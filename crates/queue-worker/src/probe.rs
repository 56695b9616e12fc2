//! Out-of-band queue depth probing.
//!
//! Depth is read from the broker's management HTTP API rather than the
//! messaging connection. Counts are approximate and lag recent publishes;
//! callers must treat them as eventually consistent.

use crate::error::QueueError;
use crate::message::QueueName;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Approximate message count for a named queue
#[async_trait]
pub trait QueueDepthProbe: Send + Sync {
    /// Number of messages currently waiting in `queue`
    async fn message_count(&self, queue: &QueueName) -> Result<u64, QueueError>;
}

/// Connection settings for the broker management API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagementApiConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Virtual host, unencoded (`/` is the broker default)
    pub vhost: String,
    pub username: String,
    pub password: String,
    pub timeout_seconds: u64,
}

impl Default for ManagementApiConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 15672,
            vhost: "/".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl ManagementApiConfig {
    /// Settings for `host` with every other field at its default
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// URL of the queue resource in the management API
    pub fn queue_url(&self, queue: &QueueName) -> String {
        format!(
            "{}://{}:{}/api/queues/{}/{}",
            self.scheme,
            self.host,
            self.port,
            urlencoding::encode(&self.vhost),
            urlencoding::encode(queue.as_str())
        )
    }
}

#[derive(Debug, Deserialize)]
struct QueueInfo {
    messages: u64,
}

/// Depth probe backed by the management HTTP API
#[derive(Debug, Clone)]
pub struct HttpDepthProbe {
    client: reqwest::Client,
    config: ManagementApiConfig,
}

impl HttpDepthProbe {
    /// Create a probe with its own HTTP client
    pub fn new(config: ManagementApiConfig) -> Result<Self, QueueError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Settings this probe was built with
    pub fn config(&self) -> &ManagementApiConfig {
        &self.config
    }
}

#[async_trait]
impl QueueDepthProbe for HttpDepthProbe {
    async fn message_count(&self, queue: &QueueName) -> Result<u64, QueueError> {
        let url = self.config.queue_url(queue);
        debug!(queue = %queue, url = %url, "Probing queue depth");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    QueueError::Timeout {
                        duration: chrono::Duration::seconds(self.config.timeout_seconds as i64),
                    }
                } else {
                    QueueError::ConnectionFailed {
                        message: format!("management API unreachable: {}", e),
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            });
        }
        if !status.is_success() {
            warn!(queue = %queue, status = %status, "Queue depth probe rejected");
            return Err(QueueError::DepthProbeFailed {
                queue_name: queue.to_string(),
                message: format!("management API returned {}", status),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| QueueError::DepthProbeFailed {
                queue_name: queue.to_string(),
                message: format!("failed to read response body: {}", e),
            })?;
        let info: QueueInfo =
            serde_json::from_slice(&body).map_err(|e| QueueError::DepthProbeFailed {
                queue_name: queue.to_string(),
                message: format!("malformed queue info: {}", e),
            })?;

        Ok(info.messages)
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
