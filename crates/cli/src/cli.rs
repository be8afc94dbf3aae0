//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log Shipper - forwards log lines to a broker through its REST proxy
#[derive(Parser, Debug)]
#[command(
    name = "log-shipper",
    author,
    version,
    about = "Ship log lines to a message broker via its REST proxy",
    long_about = "Reads log lines and ships them as structured records.\n\n\
                  Topics are routed to brokers through a discovery call on the REST proxy \n\
                  coordinator; records arriving before the proxy is reachable are held for \n\
                  a short grace window."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "LOG_SHIPPER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "LOG_SHIPPER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ship log lines from stdin or a file
    Ship(ShipArgs),

    /// Run one topic discovery round and print the routing table
    Discover(DiscoverArgs),

    /// Validate configuration file without shipping
    Validate(ValidateArgs),
}

/// Arguments for the `ship` command
#[derive(Parser, Debug, Clone)]
pub struct ShipArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "shipper.toml",
        env = "LOG_SHIPPER_CONFIG"
    )]
    pub config: PathBuf,

    /// Read lines from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Level attached to every shipped line
    #[arg(short, long, default_value = "info")]
    pub level: String,

    /// Override the topic from configuration
    #[arg(long, env = "LOG_SHIPPER_TOPIC")]
    pub topic: Option<String>,

    /// Override the REST proxy host from configuration
    #[arg(long, env = "LOG_SHIPPER_PROXY_HOST")]
    pub proxy_host: Option<String>,

    /// Override the REST proxy port from configuration
    #[arg(long, env = "LOG_SHIPPER_PROXY_PORT")]
    pub proxy_port: Option<u16>,

    /// Log records through tracing instead of shipping them
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "LOG_SHIPPER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `discover` command
#[derive(Parser, Debug)]
pub struct DiscoverArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "shipper.toml", env = "LOG_SHIPPER_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "shipper.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
