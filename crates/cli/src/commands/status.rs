//! Optimizer status command

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::client::{ApiClient, HealthReport, OptimizerStats};
use crate::output::{
    color_status, format_ms, format_percent, format_timestamp_ms, print_json, print_warning,
    OutputFormat,
};

#[derive(Serialize)]
struct StatusReport {
    health: HealthReport,
    stats: OptimizerStats,
}

/// Show component health and optimizer counters
pub async fn show_status(client: &ApiClient, format: OutputFormat, verbose: bool) -> Result<()> {
    let health = client.health().await?;
    let stats = client.stats().await?;

    match format {
        OutputFormat::Json => print_json(&StatusReport { health, stats })?,
        OutputFormat::Table => {
            println!("{}", "Optimizer Status".bold());
            println!("{}", "=".repeat(50));
            println!("Agent:                  {}", client.base_url().as_str().cyan());
            println!("Version:                {}", stats.version);
            println!("Health:                 {}", color_status(&health.status));
            if !stats.enabled {
                print_warning("Optimizer is disabled; requests are forwarded untouched");
            }
            println!();

            println!("{}", "Components".bold());
            println!("{}", "-".repeat(50));
            for (name, component) in &health.components {
                match &component.message {
                    Some(message) => println!(
                        "{:<24}{} ({})",
                        name,
                        color_status(&component.status),
                        message
                    ),
                    None => println!("{:<24}{}", name, color_status(&component.status)),
                }
            }
            println!();

            println!("{}", "Traffic".bold());
            println!("{}", "-".repeat(50));
            println!(
                "Samples:                {} / {}",
                stats.store.entries, stats.store.capacity
            );
            println!("Requests (last 60s):    {}", stats.current_load);
            println!(
                "Throughput target:      {}",
                format_percent(stats.throughput_utilization)
            );
            println!("Tracked endpoints:      {}", stats.tracked_endpoints);
            println!("Query patterns:         {}", stats.query_patterns);
            println!("Alerts raised:          {}", stats.alerts_total);
            println!();

            println!("{}", "Learning".bold());
            println!("{}", "-".repeat(50));
            println!(
                "Predictions:            {} ({} fallback)",
                stats.predictor.total_predictions, stats.predictor.fallback_predictions
            );
            println!("Trained endpoints:      {}", stats.predictor.trained_endpoints);
            println!("Baselines:              {}", stats.baselines);
            println!(
                "Allocator:              {} decisions, {} updates, {} states",
                stats.allocator.decisions, stats.allocator.updates, stats.allocator.states_visited
            );
            match &stats.last_training {
                Some(report) => println!(
                    "Last training:          {} ({} samples in {})",
                    format_timestamp_ms(report.completed_at_ms),
                    report.samples,
                    format_ms(report.duration_ms as f64)
                ),
                None => println!("Last training:          {}", "never".dimmed()),
            }

            if verbose {
                println!();
                println!("{}", "Features".bold());
                println!("{}", "-".repeat(50));
                for (feature, enabled) in &stats.features {
                    let state = if *enabled {
                        "on".green()
                    } else {
                        "off".dimmed()
                    };
                    println!("{:<24}{}", feature, state);
                }
                println!("Epsilon:                {:.3}", stats.allocator.epsilon);
            }
        }
    }

    Ok(())
}
