//! `ship` command implementation.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use contracts::{RestProxyConfig, ShipperConfig, ShipperError};
use dispatcher::{DispatcherBuilder, LogTransport, MessageDispatcher};
use observability::DeliveryAggregator;

use crate::cli::ShipArgs;

/// Execute the `ship` command
pub async fn run_ship(args: &ShipArgs) -> Result<()> {
    let config = load_config(args)?;

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    info!(
        topic = %config.topic,
        coordinator = ?config.rest.as_ref().and_then(RestProxyConfig::coordinator),
        dry_run = args.dry_run,
        "Configuration loaded"
    );

    let dispatcher = build_dispatcher(config.clone(), args.dry_run)
        .context("Failed to start dispatcher")?;

    if !dispatcher.wait_ready(config.grace_period()).await {
        warn!(
            states = ?dispatcher.states(),
            "No transport connected within the grace window, shipping best-effort"
        );
    }

    let (tx, rx) = mpsc::unbounded_channel();

    let shipped = tokio::select! {
        result = ship_input(&dispatcher, args, &tx) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Received Ctrl+C, stopping input");
            0
        }
    };
    drop(tx);

    dispatcher.shutdown().await;

    let summary = collect_outcomes(rx).await.summary();
    info!(
        lines = shipped,
        delivered = summary.delivered,
        failed = summary.failed,
        "Shipping finished"
    );
    print!("{summary}");

    let lost = shipped.saturating_sub(summary.total);
    if lost > 0 {
        println!("Dropped before delivery: {lost}");
    }

    if summary.failed > 0 || lost > 0 {
        anyhow::bail!("{} of {} lines were not delivered", summary.failed + lost, shipped);
    }
    Ok(())
}

fn load_config(args: &ShipArgs) -> Result<ShipperConfig> {
    let mut config = if args.config.exists() {
        config_loader::ConfigLoader::load_from_path(&args.config)
            .with_context(|| format!("Failed to load config from {}", args.config.display()))?
    } else {
        info!(config = %args.config.display(), "No config file, using defaults");
        ShipperConfig::default()
    };

    apply_overrides(&mut config, args);
    config_loader::ConfigLoader::validate(&config).context("Invalid configuration")?;
    Ok(config)
}

/// Apply CLI overrides on top of the loaded configuration
fn apply_overrides(config: &mut ShipperConfig, args: &ShipArgs) {
    if let Some(ref topic) = args.topic {
        info!(topic = %topic, "Overriding topic from CLI");
        config.topic = topic.clone();
    }

    if args.proxy_host.is_some() || args.proxy_port.is_some() {
        let rest = config.rest.get_or_insert_with(RestProxyConfig::default);
        if let Some(ref host) = args.proxy_host {
            rest.proxy_host = host.clone();
        }
        if let Some(port) = args.proxy_port {
            rest.proxy_port = Some(port);
        }
    }

    if args.dry_run {
        config.rest = None;
    }
}

fn build_dispatcher(config: ShipperConfig, dry_run: bool) -> Result<MessageDispatcher, ShipperError> {
    let rest_configured = config
        .rest
        .as_ref()
        .is_some_and(|rest| rest.proxy_port.is_some());

    let mut builder = DispatcherBuilder::new(config).with_failure_handler(Arc::new(
        |error: &ShipperError, record: &contracts::LogRecord| {
            warn!(error = %error, level = record.level(), "Record not delivered");
        },
    ));

    if dry_run || !rest_configured {
        builder = builder.with_connected_transport(LogTransport::new("stdout"));
    }
    builder.build()
}

async fn ship_input(
    dispatcher: &MessageDispatcher,
    args: &ShipArgs,
    outcomes: &mpsc::UnboundedSender<Result<(), ShipperError>>,
) -> Result<u64> {
    match &args.input {
        Some(path) => {
            let file = open_input(path).await?;
            ship_lines(dispatcher, &args.level, BufReader::new(file), outcomes).await
        }
        None => {
            ship_lines(
                dispatcher,
                &args.level,
                BufReader::new(tokio::io::stdin()),
                outcomes,
            )
            .await
        }
    }
}

async fn open_input(path: &Path) -> Result<tokio::fs::File> {
    tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open input {}", path.display()))
}

/// Dispatch every non-empty line, returning how many were dispatched
async fn ship_lines<R>(
    dispatcher: &MessageDispatcher,
    level: &str,
    reader: R,
    outcomes: &mpsc::UnboundedSender<Result<(), ShipperError>>,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut shipped = 0u64;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        if line.trim().is_empty() {
            continue;
        }
        let tx = outcomes.clone();
        dispatcher.dispatch(
            level,
            line,
            Some(Box::new(move |outcome| {
                let _ = tx.send(outcome);
            })),
        );
        shipped += 1;
    }

    Ok(shipped)
}

/// Drain outcomes until every callback ran or was dropped
async fn collect_outcomes(
    mut rx: mpsc::UnboundedReceiver<Result<(), ShipperError>>,
) -> DeliveryAggregator {
    let mut aggregator = DeliveryAggregator::new();
    while let Some(outcome) = rx.recv().await {
        aggregator.update(&outcome);
    }
    aggregator
}
