//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::ShipperConfig;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    topic: String,
    host: String,
    grace_period_ms: u64,
    date_fields: Vec<String>,
    property_count: usize,
    coordinator: Option<String>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    topic: config.topic.clone(),
                    host: config.host.clone(),
                    grace_period_ms: config.grace_period_ms,
                    date_fields: config.date_formats.keys().cloned().collect(),
                    property_count: config.properties.len(),
                    coordinator: config.rest.as_ref().and_then(|r| r.coordinator()),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &ShipperConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    match &config.rest {
        None => warnings.push("No [rest] section - records will not leave the process".to_string()),
        Some(rest) if rest.proxy_port.is_none() => {
            warnings.push("rest.proxy_port is not set - REST transport disabled".to_string())
        }
        Some(rest) if rest.refresh_interval_ms == 0 => {
            warnings.push("rest.refresh_interval_ms is 0 - topic routes are never refreshed".to_string())
        }
        Some(_) => {}
    }

    if config.topic == "unknown" {
        warnings.push("topic is not set - shipping to 'unknown'".to_string());
    }

    if config.grace_period_ms == 0 {
        warnings.push("grace_period_ms is 0 - records are never held while connecting".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Topic: {}", summary.topic);
            println!("  Host: {}", summary.host);
            println!("  Grace period: {}ms", summary.grace_period_ms);
            println!("  Date fields: {}", summary.date_fields.join(", "));
            println!("  Properties: {}", summary.property_count);
            match summary.coordinator {
                Some(ref coordinator) => println!("  REST proxy: {}", coordinator),
                None => println!("  REST proxy: disabled"),
            }
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
