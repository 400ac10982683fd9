//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Cloud Forwarder - forwards telemetry events to an MQTT broker
#[derive(Parser, Debug)]
#[command(
    name = "cloud-forwarder",
    author,
    version,
    about = "Forward telemetry events to a cloud MQTT broker",
    long_about = "Reads telemetry events, publishes each one to the broker with at-least-once \n\
                  delivery, and announces device metadata the first time a device is seen."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CLOUD_FORWARDER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "CLOUD_FORWARDER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the forwarder
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "forwarder.toml",
        env = "CLOUD_FORWARDER_CONFIG"
    )]
    pub config: PathBuf,

    /// Override broker URL from configuration
    #[arg(long, env = "MQTT_SERVER")]
    pub server: Option<String>,

    /// Override MQTT client id from configuration
    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub client_id: Option<String>,

    /// JSON-lines event file ("-" or omitted = stdin)
    #[arg(short, long, env = "CLOUD_FORWARDER_INPUT", conflicts_with = "mock")]
    pub input: Option<PathBuf>,

    /// Generate synthetic events instead of reading input
    #[arg(long)]
    pub mock: bool,

    /// Device names used by --mock
    #[arg(long, value_delimiter = ',', default_value = "mock-device-1,mock-device-2,mock-device-3")]
    pub mock_devices: Vec<String>,

    /// Events per second produced by --mock
    #[arg(long, default_value = "1.0")]
    pub mock_rate: f64,

    /// Maximum number of events to forward (0 = unlimited)
    #[arg(long, default_value = "0", env = "CLOUD_FORWARDER_MAX_EVENTS")]
    pub max_events: u64,

    /// Stop taking input after this many seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "CLOUD_FORWARDER_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without connecting
    #[arg(long)]
    pub dry_run: bool,

    /// Channel buffer size between input and dispatcher
    #[arg(long, default_value = "64", env = "CLOUD_FORWARDER_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "CLOUD_FORWARDER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "forwarder.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "forwarder.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
