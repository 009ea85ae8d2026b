//! Series and watch commands

use anyhow::Result;
use colored::Colorize;
use std::time::Duration;
use tabled::Tabled;

use super::SampleRow;
use crate::client::{ApiClient, Sample, Series};
use crate::output::{
    format_cpu, format_kbps, print_info, print_json, print_table, print_warning, OutputFormat,
};

/// Row for the series table
#[derive(Tabled)]
struct SeriesRow {
    #[tabled(rename = "t (s)")]
    elapsed: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Inbound")]
    inbound: String,
    #[tabled(rename = "Outbound")]
    outbound: String,
}

/// Row for the per-metric summary table
#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "Max")]
    max: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Summary {
    min: f64,
    avg: f64,
    max: f64,
}

fn summarize(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    Some(Summary { min, avg, max })
}

fn format_memory(percent: f64) -> String {
    format!("{:.0}%", percent)
}

/// One row per sample; a column shorter than the rest cuts the table short
fn series_rows(series: &Series) -> Vec<SeriesRow> {
    series
        .timestamps
        .iter()
        .zip(&series.cpu)
        .zip(&series.memory)
        .zip(&series.inbound)
        .zip(&series.outbound)
        .map(|((((t, cpu), memory), inbound), outbound)| SeriesRow {
            elapsed: format!("{:.1}", t),
            cpu: format_cpu(*cpu),
            memory: format_memory(*memory),
            inbound: format_kbps(*inbound),
            outbound: format_kbps(*outbound),
        })
        .collect()
}

fn summary_rows(series: &Series) -> Vec<SummaryRow> {
    let columns: [(&'static str, &[f64], fn(f64) -> String); 4] = [
        ("cpu", series.cpu.as_slice(), format_cpu),
        ("memory", series.memory.as_slice(), format_memory),
        ("inbound", series.inbound.as_slice(), format_kbps),
        ("outbound", series.outbound.as_slice(), format_kbps),
    ];

    columns
        .into_iter()
        .filter_map(|(metric, values, fmt)| {
            summarize(values).map(|s| SummaryRow {
                metric,
                min: fmt(s.min),
                avg: fmt(s.avg),
                max: fmt(s.max),
            })
        })
        .collect()
}

/// Show the newest samples of the rolling series
pub async fn show_series(client: &ApiClient, limit: Option<usize>, format: OutputFormat) -> Result<()> {
    let series = client.series(limit).await?;

    match format {
        OutputFormat::Json => print_json(&series)?,
        OutputFormat::Table => {
            println!(
                "{} ({} shown, {} retained, capacity {})",
                "Sample Series".bold(),
                series.timestamps.len(),
                series.retained,
                series.capacity
            );
            print_table(&series_rows(&series));

            let summary = summary_rows(&series);
            if !summary.is_empty() {
                println!();
                println!("{}", "Summary".bold());
                print_table(&summary);
            }
        }
    }

    Ok(())
}

/// Tracks the last sample printed by `watch`
#[derive(Debug, Default)]
struct WatchCursor {
    last: Option<(f64, i64)>,
}

impl WatchCursor {
    /// Whether `sample` has not been seen yet. A lower session timestamp with
    /// a later wall clock means the agent restarted.
    fn advance(&mut self, sample: &Sample) -> bool {
        let fresh = match self.last {
            None => true,
            Some((timestamp, recorded_at)) => {
                sample.timestamp > timestamp
                    || (sample.timestamp < timestamp && sample.recorded_at > recorded_at)
            }
        };
        if fresh {
            self.last = Some((sample.timestamp, sample.recorded_at));
        }
        fresh
    }
}

/// Fetch the latest sample and return it only if it is new
async fn poll_latest(client: &ApiClient, cursor: &mut WatchCursor) -> Result<Option<Sample>> {
    Ok(client
        .latest()
        .await?
        .filter(|sample| cursor.advance(sample)))
}

/// Print each new sample as it arrives until interrupted
pub async fn watch(client: &ApiClient, every: Duration, format: OutputFormat) -> Result<()> {
    print_info("Watching for new samples, press Ctrl-C to stop");

    let mut ticker = tokio::time::interval(every);
    let mut cursor = WatchCursor::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = match poll_latest(client, &mut cursor).await {
                    Ok(Some(sample)) => sample,
                    Ok(None) => continue,
                    Err(e) => {
                        print_warning(&format!("Poll failed: {:#}", e));
                        continue;
                    }
                };

                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string(&sample)?),
                    OutputFormat::Table => print_table(&[SampleRow::from(&sample)]),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
