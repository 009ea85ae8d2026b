//! Device Sentinel CLI
//!
//! A command-line tool for querying a running sentinel agent: its status,
//! the latest device sample and the rolling series.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{samples, status};
use std::time::Duration;

/// Device Sentinel CLI
#[derive(Parser)]
#[command(name = "sentinelctl")]
#[command(author, version, about = "CLI for Device Sentinel", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via SENTINEL_API_URL or the config file)
    #[arg(long, env = "SENTINEL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Show device, connection and health status
    Status,

    /// Show the most recent sample
    Latest,

    /// Show the rolling sample series
    Series {
        /// Only show the newest N samples
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Print new samples as they are recorded
    Watch {
        /// Seconds between polls of the agent
        #[arg(long, default_value_t = 1)]
        every: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let api_url = config::Config::load()?.resolve_api_url(cli.api_url.as_deref());
    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Latest => status::show_latest(&client, cli.format).await?,
        Commands::Series { limit } => samples::show_series(&client, limit, cli.format).await?,
        Commands::Watch { every } => {
            samples::watch(&client, Duration::from_secs(every.max(1)), cli.format).await?
        }
    }

    Ok(())
}
