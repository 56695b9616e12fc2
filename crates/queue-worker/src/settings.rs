//! Layered worker configuration.
//!
//! Settings are merged from, in order of increasing precedence:
//!
//! 1. `./config/worker.yaml` (optional)
//! 2. An explicit file passed to [`WorkerSettings::load`], or named by the
//!    `QUEUE_WORKER_CONFIG` environment variable (required when given)
//! 3. Environment variables prefixed `QW__` with `__` between path segments,
//!    e.g. `QW__CONSUMER__PAUSE_DELAY_SECONDS=10` sets
//!    `consumer.pause_delay_seconds`
//!
//! Every field has a default, so an absent file and an empty environment
//! produce usable settings. A malformed file or a value that cannot be
//! converted to its field's type is an error.

use crate::codec::{Compression, Serializer};
use crate::error::ConfigurationError;
use crate::monitoring::MetricsOptions;
use crate::probe::ManagementApiConfig;
use crate::producer::BufferedPutOptions;
use crate::provider::BrokerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Base name of the optional local configuration file
pub const DEFAULT_CONFIG_FILE: &str = "config/worker";

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV_VAR: &str = "QUEUE_WORKER_CONFIG";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "QW";

/// Complete worker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub broker: BrokerConfig,
    pub consumer: ConsumerSettings,
    pub metrics: MetricsOptions,
    pub management: ManagementApiConfig,
    pub producer: ProducerSettings,
}

/// Consumer loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    pub pause_delay_seconds: u64,
    pub requeue_on_failure: bool,
    pub reject_on_failure: bool,
    pub serializer: Serializer,
    pub compression: Option<Compression>,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            pause_delay_seconds: 5,
            requeue_on_failure: true,
            reject_on_failure: false,
            serializer: Serializer::default(),
            compression: None,
        }
    }
}

/// Batch publishing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerSettings {
    pub batch_size: usize,
    pub resume_threshold: f64,
    pub delay_seconds: u64,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            resume_threshold: 0.1,
            delay_seconds: 5,
        }
    }
}

impl WorkerSettings {
    /// Load settings from the standard sources.
    ///
    /// `explicit` takes precedence over `QUEUE_WORKER_CONFIG`.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigurationError> {
        let from_env = std::env::var(CONFIG_FILE_ENV_VAR)
            .ok()
            .filter(|path| !path.is_empty());
        let explicit = explicit.map(Path::to_path_buf).or(from_env.map(Into::into));

        Self::load_from(explicit.as_deref(), None)
    }

    /// Load settings, reading variables from `environment` instead of the
    /// process environment when given
    pub fn load_from(
        explicit: Option<&Path>,
        environment: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder().add_source(
            config::File::with_name(DEFAULT_CONFIG_FILE)
                .required(false)
                .format(config::FileFormat::Yaml),
        );

        if let Some(path) = explicit {
            info!(path = %path.display(), "Loading configuration from explicit path");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(environment.map(|vars| vars.into_iter().collect())),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        debug!(settings = ?settings.redacted(), "Configuration loaded");
        Ok(settings)
    }

    /// Reject settings no worker can run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        BufferedPutOptions::from(&self.producer)
            .validate()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("producer: {}", e),
            })?;

        if self.management.host.trim().is_empty() {
            return Err(ConfigurationError::Invalid {
                message: "management.host must not be empty".to_string(),
            });
        }
        if self.management.timeout_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                message: "management.timeout_seconds must be at least 1".to_string(),
            });
        }

        if let Some(host) = &self.metrics.statsd_host {
            if host.trim().is_empty() {
                return Err(ConfigurationError::Invalid {
                    message: "metrics.statsd_host must not be empty when set".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Copy with credentials masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.management.password = "********".to_string();
        copy
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
