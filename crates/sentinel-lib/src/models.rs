//! Core data models for the device sentinel

use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known scalars polled from the managed device every cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricId {
    /// Five-minute CPU busy percentage
    CpuLoad,
    /// Bytes in use in the processor memory pool
    MemoryUsed,
    /// Bytes free in the processor memory pool
    MemoryFree,
    /// Cumulative octets received on the monitored interface
    InOctets,
    /// Cumulative octets sent on the monitored interface
    OutOctets,
}

impl MetricId {
    /// Every identifier fetched in one cycle, in fetch order
    pub const ALL: [MetricId; 5] = [
        MetricId::CpuLoad,
        MetricId::MemoryUsed,
        MetricId::MemoryFree,
        MetricId::InOctets,
        MetricId::OutOctets,
    ];

    /// Object identifier of this metric on the device
    pub fn oid(&self) -> &'static str {
        match self {
            MetricId::CpuLoad => "1.3.6.1.4.1.9.2.1.56.0",
            MetricId::MemoryUsed => "1.3.6.1.4.1.9.9.48.1.1.1.5.1",
            MetricId::MemoryFree => "1.3.6.1.4.1.9.9.48.1.1.1.6.1",
            MetricId::InOctets => "1.3.6.1.2.1.2.2.1.10.1",
            MetricId::OutOctets => "1.3.6.1.2.1.2.2.1.16.1",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricId::CpuLoad => "cpu_load",
            MetricId::MemoryUsed => "memory_used",
            MetricId::MemoryFree => "memory_free",
            MetricId::InOctets => "in_octets",
            MetricId::OutOctets => "out_octets",
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar as returned by a metric source, before numeric conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RawValue {
    Integer(i64),
    Counter32(u32),
    Counter64(u64),
    Gauge(u64),
    Text(String),
}

impl RawValue {
    /// Numeric view of the value. Text is accepted only when it parses as a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Integer(v) => Some(*v as f64),
            RawValue::Counter32(v) => Some(*v as f64),
            RawValue::Counter64(v) => Some(*v as f64),
            RawValue::Gauge(v) => Some(*v as f64),
            RawValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Unsigned integer view, used for byte counts and octet counters
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RawValue::Integer(v) => u64::try_from(*v).ok(),
            RawValue::Counter32(v) => Some(u64::from(*v)),
            RawValue::Counter64(v) => Some(*v),
            RawValue::Gauge(v) => Some(*v),
            RawValue::Text(s) => s.trim().parse::<u64>().ok(),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Integer(v) => write!(f, "{}", v),
            RawValue::Counter32(v) => write!(f, "{}", v),
            RawValue::Counter64(v) => write!(f, "{}", v),
            RawValue::Gauge(v) => write!(f, "{}", v),
            RawValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// One polling cycle's result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the session started (monotonic)
    pub timestamp: f64,
    /// Wall-clock time the sample was recorded, Unix milliseconds
    pub recorded_at: i64,
    pub cpu_percent: f64,
    pub memory_percent: u8,
    pub inbound_kbps: f64,
    pub outbound_kbps: f64,
}

impl Sample {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Cpu => self.cpu_percent,
            Metric::Memory => f64::from(self.memory_percent),
            Metric::Inbound => self.inbound_kbps,
            Metric::Outbound => self.outbound_kbps,
        }
    }
}

/// The four displayed metrics sharing one timestamp axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cpu,
    Memory,
    Inbound,
    Outbound,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Cpu, Metric::Memory, Metric::Inbound, Metric::Outbound];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cpu => "cpu",
            Metric::Memory => "memory",
            Metric::Inbound => "inbound",
            Metric::Outbound => "outbound",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Cpu | Metric::Memory => "%",
            Metric::Inbound | Metric::Outbound => "kbps",
        }
    }
}

/// Whether polling is allowed to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// The single device being monitored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceTarget {
    pub address: String,
    pub port: u16,
    /// Shared read-only community secret
    #[serde(skip_serializing, default)]
    pub community: String,
}

impl DeviceTarget {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl Default for DeviceTarget {
    fn default() -> Self {
        Self {
            address: "192.168.10.100".to_string(),
            port: 161,
            community: "public".to_string(),
        }
    }
}
