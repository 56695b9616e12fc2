//! # Queue Worker CLI
//!
//! Operational commands for queue workers:
//! - Show the resolved, validated worker configuration
//! - Probe a queue's depth through the broker management API

use clap::{Parser, Subcommand};
use queue_worker::{
    ConfigurationError, HttpDepthProbe, QueueDepthProbe, QueueError, QueueName, WorkerSettings,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// queue-worker CLI - inspect worker configuration and queues
#[derive(Parser, Debug)]
#[command(name = "queue-worker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect queue worker configuration and broker queues")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUEUE_WORKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the resolved configuration
    Config {
        /// Output format
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// Print the number of messages waiting in a queue
    Depth {
        /// Queue to probe
        queue: String,

        /// Management API host
        #[arg(long)]
        host: Option<String>,

        /// Management API port
        #[arg(long)]
        port: Option<u16>,

        /// Virtual host
        #[arg(long)]
        vhost: Option<String>,

        /// Management API user
        #[arg(long)]
        username: Option<String>,

        /// Management API password
        #[arg(long, env = "QUEUE_WORKER_MANAGEMENT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

/// Configuration output formats
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Output failed: {message}")]
    Output { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Output { .. } | Self::Io(_) => 1,
            Self::Queue(_) => 2,
            Self::InvalidArgument { .. } => 3,
        }
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&cli, &mut out).await
}

/// Run the parsed command, writing its result to `out`
pub async fn execute(cli: &Cli, out: &mut dyn Write) -> Result<(), CliError> {
    let settings = WorkerSettings::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Config { format } => execute_config_command(&settings, format, out),
        Commands::Depth {
            queue,
            host,
            port,
            vhost,
            username,
            password,
        } => {
            let overrides = ManagementOverrides {
                host: host.clone(),
                port: *port,
                vhost: vhost.clone(),
                username: username.clone(),
                password: password.clone(),
            };
            execute_depth_command(&settings, queue, overrides, out).await
        }
    }
}

/// Install the global subscriber; logs go to stderr so stdout stays parseable
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!(
            "queue_worker={level},queue_worker_cli={level}",
            level = cli.log_level
        ))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?,
    };

    let json_layer = cli.json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!cli.json_logs)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| CliError::Output {
            message: format!("failed to initialize logging: {}", e),
        })
}

// ============================================================================
// Command Implementations
// ============================================================================

fn execute_config_command(
    settings: &WorkerSettings,
    format: &ConfigFormat,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    debug!(format = ?format, "Rendering configuration");

    let redacted = settings.redacted();
    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(&redacted).map_err(|e| CliError::Output {
            message: e.to_string(),
        })?,
        ConfigFormat::Json => {
            serde_json::to_string_pretty(&redacted).map_err(|e| CliError::Output {
                message: e.to_string(),
            })?
        }
    };

    writeln!(out, "{}", rendered.trim_end())?;
    Ok(())
}

/// Command-line replacements for the configured management API settings
#[derive(Debug, Default, Clone)]
struct ManagementOverrides {
    host: Option<String>,
    port: Option<u16>,
    vhost: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

async fn execute_depth_command(
    settings: &WorkerSettings,
    queue: &str,
    overrides: ManagementOverrides,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let queue = QueueName::new(queue.to_string()).map_err(|e| CliError::InvalidArgument {
        arg: "queue".to_string(),
        message: e.to_string(),
    })?;

    let mut management = settings.management.clone();
    if let Some(host) = overrides.host {
        management.host = host;
    }
    if let Some(port) = overrides.port {
        if port == 0 {
            return Err(CliError::InvalidArgument {
                arg: "port".to_string(),
                message: "must be between 1 and 65535".to_string(),
            });
        }
        management.port = port;
    }
    if let Some(vhost) = overrides.vhost {
        management.vhost = vhost;
    }
    if let Some(username) = overrides.username {
        management.username = username;
    }
    if let Some(password) = overrides.password {
        management.password = password;
    }

    info!(queue = %queue, host = %management.host, port = management.port, "Probing queue depth");

    let probe = HttpDepthProbe::new(management)?;
    let count = probe.message_count(&queue).await?;

    writeln!(out, "{}", count)?;
    Ok(())
}
