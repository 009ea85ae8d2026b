//! Observability infrastructure for the sentinel agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, cycle outcomes, latest values, store size)
//! - Structured JSON logging with tracing

use crate::error::SampleError;
use crate::models::{ConnectionState, DeviceTarget, Metric, Sample};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for cycle latency (in seconds)
const CYCLE_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

struct SentinelMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles_total: IntCounter,
    samples_recorded: IntCounter,
    cycle_failures: IntCounterVec,
    latest_value: GaugeVec,
    series_samples: IntGauge,
    connected: IntGauge,
    device_info: GaugeVec,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "sentinel_cycle_latency_seconds",
                "Time spent on one polling cycle including all device round trips",
                CYCLE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles_total: register_int_counter!(
                "sentinel_cycles_total",
                "Total number of polling cycles attempted"
            )
            .expect("Failed to register cycles_total"),

            samples_recorded: register_int_counter!(
                "sentinel_samples_recorded_total",
                "Total number of samples appended to the series"
            )
            .expect("Failed to register samples_recorded"),

            cycle_failures: register_int_counter_vec!(
                "sentinel_cycle_failures_total",
                "Total number of failed polling cycles by failure kind",
                &["kind"]
            )
            .expect("Failed to register cycle_failures"),

            latest_value: register_gauge_vec!(
                "sentinel_latest_value",
                "Most recent value of each displayed metric",
                &["metric"]
            )
            .expect("Failed to register latest_value"),

            series_samples: register_int_gauge!(
                "sentinel_series_samples",
                "Number of samples retained in the rolling series"
            )
            .expect("Failed to register series_samples"),

            connected: register_int_gauge!(
                "sentinel_connected",
                "1 while polling is enabled for the device, 0 otherwise"
            )
            .expect("Failed to register connected"),

            device_info: register_gauge_vec!(
                "sentinel_device_info",
                "The device currently monitored",
                &["address", "port"]
            )
            .expect("Failed to register device_info"),
        }
    }
}

/// Handle to the global sentinel metrics. Clones share the same series.
#[derive(Clone)]
pub struct SentinelMetrics {
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelMetrics {
    /// Create a metrics handle (registers the global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new)
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode_text(&self) -> Result<Vec<u8>, prometheus::Error> {
        self.inner();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        let inner = self.inner();
        inner.cycle_latency_seconds.observe(duration_secs);
        inner.cycles_total.inc();
    }

    /// Record an appended sample and the resulting store size
    pub fn record_sample(&self, sample: &Sample, retained: usize) {
        let inner = self.inner();
        inner.samples_recorded.inc();
        for metric in Metric::ALL {
            inner
                .latest_value
                .with_label_values(&[metric.as_str()])
                .set(sample.value(metric));
        }
        inner.series_samples.set(retained as i64);
    }

    pub fn inc_cycle_failures(&self, kind: &str) {
        self.inner().cycle_failures.with_label_values(&[kind]).inc();
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        let value = match state {
            ConnectionState::Connected => 1,
            ConnectionState::Disconnected => 0,
        };
        self.inner().connected.set(value);
    }

    pub fn set_device(&self, target: &DeviceTarget) {
        let device_info = &self.inner().device_info;
        let port = target.port.to_string();
        device_info.reset();
        device_info
            .with_label_values(&[target.address.as_str(), port.as_str()])
            .set(1.0);
    }
}

/// Structured logger for sentinel events
///
/// Emits consistently named events so log pipelines can follow one device.
#[derive(Clone)]
pub struct StructuredLogger {
    device: String,
}

impl StructuredLogger {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn log_startup(&self, version: &str, interval_ms: u64, capacity: usize) {
        info!(
            event = "agent_started",
            device = %self.device,
            agent_version = %version,
            interval_ms = interval_ms,
            capacity = capacity,
            "Device sentinel started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            device = %self.device,
            reason = %reason,
            "Device sentinel shutting down"
        );
    }

    pub fn log_sample(&self, sample: &Sample) {
        debug!(
            event = "sample_recorded",
            device = %self.device,
            timestamp = sample.timestamp,
            cpu_percent = sample.cpu_percent,
            memory_percent = sample.memory_percent,
            inbound_kbps = sample.inbound_kbps,
            outbound_kbps = sample.outbound_kbps,
            "Sample recorded"
        );
    }

    pub fn log_cycle_failure(&self, error: &SampleError, consecutive_failures: u32) {
        warn!(
            event = "cycle_failed",
            device = %self.device,
            kind = error.kind(),
            metric = ?error.metric(),
            consecutive_failures = consecutive_failures,
            error = %error,
            "Polling cycle failed, no sample recorded"
        );
    }

    pub fn log_connection_change(&self, state: ConnectionState) {
        info!(
            event = "connection_changed",
            device = %self.device,
            state = ?state,
            "Polling {}",
            match state {
                ConnectionState::Connected => "resumed",
                ConnectionState::Disconnected => "paused",
            }
        );
    }
}
