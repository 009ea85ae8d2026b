//! Agent status and latest sample commands

use anyhow::Result;
use colored::Colorize;

use super::SampleRow;
use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_table, print_warning, OutputFormat};

/// Show the monitored device, connection state and health
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            println!("{}", "Sentinel Status".bold());
            println!("{}", "=".repeat(50));
            println!(
                "Device:      {}",
                format!("{}:{}", status.device.address, status.device.port).cyan()
            );
            println!("Connection:  {}", color_status(&status.connection));
            println!("Health:      {}", color_status(&status.health));
            println!("Samples:     {} / {}", status.samples, status.capacity);
            println!();

            match &status.latest {
                Some(sample) => {
                    println!("{}", "Latest Sample".bold());
                    print_table(&[SampleRow::from(sample)]);
                }
                None => print_warning("No samples recorded yet"),
            }
        }
    }

    Ok(())
}

/// Show the most recent sample
pub async fn show_latest(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let Some(sample) = client.latest().await? else {
        print_warning("No samples recorded yet");
        return Ok(());
    };

    match format {
        OutputFormat::Json => print_json(&sample)?,
        OutputFormat::Table => print_table(&[SampleRow::from(&sample)]),
    }

    Ok(())
}
