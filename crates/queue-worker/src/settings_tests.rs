//! Tests for layered settings loading.

use super::*;
use crate::consumer::{ConsumerOptions, RecoveryPolicy};
use crate::provider::ProviderConfig;
use std::io::Write;
use std::time::Duration;

fn env(vars: &[(&str, &str)]) -> Option<HashMap<String, String>> {
    Some(
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_defaults_without_any_source() {
    let settings = WorkerSettings::load_from(None, env(&[])).unwrap();

    assert_eq!(settings.consumer.pause_delay_seconds, 5);
    assert!(settings.consumer.requeue_on_failure);
    assert!(!settings.consumer.reject_on_failure);
    assert_eq!(settings.consumer.serializer, Serializer::Json);
    assert!(settings.consumer.compression.is_none());
    assert!(settings.metrics.statsd_host.is_none());
    assert_eq!(settings.management.port, 15672);
    assert_eq!(settings.producer.batch_size, 100);
    assert!(matches!(settings.broker.provider, ProviderConfig::InMemory(_)));
}

#[test]
fn test_file_values_override_defaults() {
    let file = yaml_file(
        r#"
consumer:
  pause_delay_seconds: 10
  reject_on_failure: true
  serializer: yaml
  compression: zstd
metrics:
  statsd_host: statsd.internal
  worker_id: "4"
management:
  host: rabbit.internal
  vhost: team
producer:
  batch_size: 50
  resume_threshold: 0.25
"#,
    );

    let settings = WorkerSettings::load_from(Some(file.path()), env(&[])).unwrap();

    assert_eq!(settings.consumer.pause_delay_seconds, 10);
    assert!(settings.consumer.reject_on_failure);
    assert_eq!(settings.consumer.serializer, Serializer::Yaml);
    assert_eq!(settings.consumer.compression, Some(Compression::Zstd));
    assert_eq!(settings.metrics.statsd_host.as_deref(), Some("statsd.internal"));
    assert_eq!(settings.metrics.worker_id.as_deref(), Some("4"));
    assert_eq!(settings.metrics.statsd_port, 8125);
    assert_eq!(settings.management.host, "rabbit.internal");
    assert_eq!(settings.management.vhost, "team");
    assert_eq!(settings.producer.batch_size, 50);
    assert_eq!(settings.producer.resume_threshold, 0.25);
    assert_eq!(settings.producer.delay_seconds, 5);
}

#[test]
fn test_environment_overrides_file() {
    let file = yaml_file("consumer:\n  pause_delay_seconds: 10\nproducer:\n  batch_size: 50\n");

    let settings = WorkerSettings::load_from(
        Some(file.path()),
        env(&[
            ("QW__CONSUMER__PAUSE_DELAY_SECONDS", "30"),
            ("QW__CONSUMER__REQUEUE_ON_FAILURE", "false"),
            ("QW__METRICS__STATSD_PORT", "9125"),
        ]),
    )
    .unwrap();

    assert_eq!(settings.consumer.pause_delay_seconds, 30);
    assert!(!settings.consumer.requeue_on_failure);
    assert_eq!(settings.metrics.statsd_port, 9125);
    assert_eq!(settings.producer.batch_size, 50);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let result = WorkerSettings::load_from(
        Some(Path::new("/nonexistent/queue-worker/settings.yaml")),
        env(&[]),
    );

    assert!(matches!(result, Err(ConfigurationError::Parsing { .. })));
}

#[test]
fn test_unconvertible_value_is_an_error() {
    let file = yaml_file("consumer:\n  pause_delay_seconds: soon\n");

    let result = WorkerSettings::load_from(Some(file.path()), env(&[]));

    assert!(matches!(result, Err(ConfigurationError::Parsing { .. })));
}

#[test]
fn test_invalid_producer_settings_are_rejected() {
    let file = yaml_file("producer:\n  batch_size: 0\n");

    let result = WorkerSettings::load_from(Some(file.path()), env(&[]));

    match result {
        Err(ConfigurationError::Invalid { message }) => assert!(message.contains("batch_size")),
        other => panic!("Expected Invalid, got: {:?}", other),
    }
}

#[test]
fn test_resume_threshold_above_one_loads() {
    let file = yaml_file("producer:\n  batch_size: 4\n  resume_threshold: 1.5\n");

    let settings = WorkerSettings::load_from(Some(file.path()), env(&[])).unwrap();

    assert_eq!(settings.producer.resume_threshold, 1.5);
    assert_eq!(BufferedPutOptions::from(&settings.producer).resume_depth(), 6.0);
}

#[test]
fn test_validate_rejects_unusable_settings() {
    let mut settings = WorkerSettings::default();
    settings.management.host = "  ".to_string();
    assert!(settings.validate().is_err());

    let mut settings = WorkerSettings::default();
    settings.metrics.statsd_host = Some(String::new());
    assert!(settings.validate().is_err());

    let mut settings = WorkerSettings::default();
    settings.producer.resume_threshold = -1.0;
    assert!(settings.validate().is_err());

    let mut settings = WorkerSettings::default();
    settings.producer.resume_threshold = 2.0;
    assert!(settings.validate().is_ok());

    assert!(WorkerSettings::default().validate().is_ok());
}

#[test]
fn test_redacted_masks_password_only() {
    let mut settings = WorkerSettings::default();
    settings.management.password = "s3cret".to_string();

    let redacted = settings.redacted();

    assert_eq!(redacted.management.password, "********");
    assert_eq!(redacted.management.username, "guest");
    assert_eq!(settings.management.password, "s3cret");
}

#[test]
fn test_settings_drive_component_options() {
    let mut settings = WorkerSettings::default();
    settings.consumer.pause_delay_seconds = 2;
    settings.consumer.requeue_on_failure = false;
    settings.consumer.reject_on_failure = true;
    settings.consumer.compression = Some(Compression::Zstd);
    settings.producer.batch_size = 20;
    settings.producer.delay_seconds = 1;

    let consumer = ConsumerOptions::from_settings(&settings);
    assert_eq!(consumer.pause_delay, Duration::from_secs(2));
    assert_eq!(
        RecoveryPolicy::from_flags(consumer.requeue_on_failure, consumer.reject_on_failure),
        RecoveryPolicy::Reject
    );
    assert_eq!(consumer.compression, Some(Compression::Zstd));

    let producer = BufferedPutOptions::from(&settings.producer);
    assert_eq!(producer.batch_size, 20);
    assert_eq!(producer.resume_threshold, 0.1);
    assert_eq!(producer.delay, Duration::from_secs(1));
}
