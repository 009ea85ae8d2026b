//! CLI command implementations

pub mod samples;
pub mod status;

use crate::client::Sample;
use crate::output::{color_percent, format_cpu, format_kbps, format_recorded_at};
use tabled::Tabled;

/// One sample as a table row
#[derive(Tabled)]
pub struct SampleRow {
    #[tabled(rename = "Time")]
    time: String,
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

impl From<&Sample> for SampleRow {
    fn from(sample: &Sample) -> Self {
        let memory = f64::from(sample.memory_percent);
        Self {
            time: format_recorded_at(sample.recorded_at),
            elapsed: format!("{:.1}", sample.timestamp),
            cpu: color_percent(sample.cpu_percent, format_cpu(sample.cpu_percent)),
            memory: color_percent(memory, format!("{}%", sample.memory_percent)),
            inbound: format_kbps(sample.inbound_kbps),
            outbound: format_kbps(sample.outbound_kbps),
        }
    }
}
