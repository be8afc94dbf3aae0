//! `discover` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use route_cache::BrokerRouteCache;

use crate::cli::DiscoverArgs;

/// Discovery result for JSON output
#[derive(Serialize)]
struct DiscoveryReport {
    coordinator: String,
    topic_count: usize,
    /// topic -> endpoint, sorted by topic
    routes: Vec<Route>,
}

#[derive(Serialize)]
struct Route {
    topic: String,
    endpoint: String,
}

/// Execute the `discover` command
pub async fn run_discover(args: &DiscoverArgs) -> Result<()> {
    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let rest = config
        .rest
        .as_ref()
        .filter(|rest| rest.proxy_port.is_some())
        .context("No REST proxy configured: set [rest] proxy_port")?;

    let cache = BrokerRouteCache::new(rest)?;
    info!(coordinator = %cache.coordinator(), "Running topic discovery");

    let discovered = cache.discover().await;
    let report = discovered.map(|_| build_report(&cache));
    cache.close();
    let report = report.context("Topic discovery failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .context("Failed to serialize discovery report")?;
        println!("{json}");
    } else {
        print_report(&report);
    }
    Ok(())
}

fn build_report(cache: &BrokerRouteCache) -> DiscoveryReport {
    let table = cache.table();
    let routes: Vec<Route> = table
        .entries()
        .into_iter()
        .map(|(topic, endpoint)| Route {
            topic: topic.to_string(),
            endpoint: endpoint.to_string(),
        })
        .collect();

    DiscoveryReport {
        coordinator: cache.coordinator().to_string(),
        topic_count: routes.len(),
        routes,
    }
}

fn print_report(report: &DiscoveryReport) {
    println!("Coordinator: {}", report.coordinator);
    println!("Topics: {}\n", report.topic_count);

    let width = report
        .routes
        .iter()
        .map(|r| r.topic.len())
        .max()
        .unwrap_or(0);
    for route in &report.routes {
        println!("  {:<width$}  ->  {}", route.topic, route.endpoint);
    }
}
