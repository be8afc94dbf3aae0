//! # Log Shipper CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 读取日志行并分发
//! - topic 路由发现

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_discover, run_ship, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging based on CLI options
    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Log Shipper CLI starting");

    // Execute command
    let result = match &cli.command {
        Commands::Ship(args) => run_ship(args).await,
        Commands::Discover(args) => run_discover(args).await,
        Commands::Validate(args) => run_validate(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
///
/// The Prometheus exporter is started by `ship` when asked for.
fn init_logging(cli: &Cli) -> Result<()> {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::init_with_config(observability::ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        default_log_level: default_log_level.to_string(),
    })
    .context("Failed to initialize logging")
}
