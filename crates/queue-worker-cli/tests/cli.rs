//! End-to-end tests for the queue-worker binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn queue_worker() -> Command {
    let mut cmd = Command::cargo_bin("queue-worker").unwrap();
    cmd.env_remove("QUEUE_WORKER_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    queue_worker()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("depth"));
}

#[test]
fn test_config_prints_defaults_as_json() {
    queue_worker()
        .args(["config", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pause_delay_seconds\": 5"))
        .stdout(predicate::str::contains("********"));
}

#[test]
fn test_environment_overrides_reach_config_output() {
    queue_worker()
        .env("QW__PRODUCER__BATCH_SIZE", "42")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("batch_size: 42"));
}

#[test]
fn test_missing_config_file_exits_with_configuration_code() {
    queue_worker()
        .args(["--config", "/nonexistent/worker.yaml", "config"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_invalid_queue_name_exits_with_argument_code() {
    queue_worker()
        .args(["depth", "bad/queue"])
        .assert()
        .code(3);
}

#[test]
fn test_unreachable_management_api_exits_with_queue_code() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    queue_worker()
        .args(["depth", "orders", "--host", "127.0.0.1", "--port", &port.to_string()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Queue error"));
}
