//! Adaptive Request Optimizer CLI
//!
//! A command-line tool for inspecting a running optimizer agent: health,
//! learned baselines, anomaly alerts, query patterns and endpoint scores.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{insights, status};

/// Adaptive Request Optimizer CLI
#[derive(Parser)]
#[command(name = "optctl")]
#[command(author, version, about = "CLI for the Adaptive Request Optimizer", long_about = None)]
pub struct Cli {
    /// Agent URL (can also be set via OPTCTL_API_URL env var)
    #[arg(long, env = "OPTCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show component health and optimizer counters
    Status,

    /// Show per-endpoint latency baselines
    Baselines,

    /// Show recent anomaly alerts
    Alerts {
        /// Maximum number of alerts to fetch
        #[arg(long, short, default_value_t = 20)]
        limit: usize,

        /// Only show alerts at or above this severity
        #[arg(long, short)]
        severity: Option<insights::Severity>,
    },

    /// Show learned query patterns and index suggestions
    Queries {
        /// Only show patterns flagged as slow
        #[arg(long)]
        slow_only: bool,
    },

    /// Show endpoint health scores
    Endpoints,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let api_url = config::resolve_api_url(cli.api_url, &config);

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Status => {
            status::show_status(&client, cli.format, cli.verbose).await?;
        }
        Commands::Baselines => {
            insights::show_baselines(&client, cli.format).await?;
        }
        Commands::Alerts { limit, severity } => {
            insights::show_alerts(&client, limit, severity, cli.format, cli.verbose).await?;
        }
        Commands::Queries { slow_only } => {
            insights::show_queries(&client, slow_only, cli.format).await?;
        }
        Commands::Endpoints => {
            insights::show_endpoints(&client, cli.format).await?;
        }
    }

    Ok(())
}
