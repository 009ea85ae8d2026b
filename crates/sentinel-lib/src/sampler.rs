//! One polling cycle
//!
//! The sampler fetches the five raw metrics, derives the four displayed
//! values and appends one [`Sample`] to the series store. A cycle either
//! appends a complete sample or nothing at all.

use crate::error::{FetchError, SampleError};
use crate::models::{MetricId, RawValue, Sample};
use crate::series::SeriesStore;
use crate::source::MetricSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default bound on a single metric round trip
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Last-seen cumulative octet counters and when they were read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawCounterState {
    pub in_octets: u64,
    pub out_octets: u64,
    pub read_at: Instant,
    /// False until a cycle has recorded a real baseline
    pub primed: bool,
}

impl RawCounterState {
    fn unprimed(now: Instant) -> Self {
        Self {
            in_octets: 0,
            out_octets: 0,
            read_at: now,
            primed: false,
        }
    }
}

/// How a cumulative counter behaves when it passes its maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterWrap {
    /// Rolls over at 2^32, like a Counter32
    Bits32,
    /// Never rolls over; any decrease is a reset
    Never,
}

impl CounterWrap {
    /// Only a Counter32 reading is unwrapped modulo 2^32
    pub fn of(raw: &RawValue) -> Self {
        match raw {
            RawValue::Counter32(_) => CounterWrap::Bits32,
            _ => CounterWrap::Never,
        }
    }
}

/// What a successful cycle produced
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The counter baseline was recorded; no sample appended
    Primed,
    /// A sample was appended to the store
    Recorded(Sample),
}

/// Raw values from one round of fetches
#[derive(Debug, Clone)]
struct Readings {
    cpu: RawValue,
    memory_used: RawValue,
    memory_free: RawValue,
    in_octets: RawValue,
    out_octets: RawValue,
}

/// Runs polling cycles against a metric source
pub struct Sampler {
    source: Arc<dyn MetricSource>,
    counters: RawCounterState,
    session_start: Instant,
    fetch_timeout: Duration,
}

impl Sampler {
    /// Create a sampler; the session clock starts now
    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        let now = Instant::now();
        Self {
            source,
            counters: RawCounterState::unprimed(now),
            session_start: now,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Set the per-fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn counters(&self) -> &RawCounterState {
        &self.counters
    }

    pub fn source(&self) -> &Arc<dyn MetricSource> {
        &self.source
    }

    /// Make the next cycle a priming cycle. Used after polling was paused,
    /// since a rate across the gap would not describe live traffic.
    pub fn reset_baseline(&mut self) {
        self.counters.primed = false;
    }

    /// Run one complete cycle and append its sample to `store`
    pub async fn run_cycle(&mut self, store: &SeriesStore) -> Result<CycleOutcome, SampleError> {
        let readings = self.fetch_all().await?;
        let now = Instant::now();

        let in_octets = counter_value(MetricId::InOctets, &readings.in_octets)?;
        let out_octets = counter_value(MetricId::OutOctets, &readings.out_octets)?;

        if !self.counters.primed {
            self.counters = RawCounterState {
                in_octets,
                out_octets,
                read_at: now,
                primed: true,
            };
            debug!(in_octets, out_octets, "Recorded counter baseline");
            return Ok(CycleOutcome::Primed);
        }

        let cpu = cpu_percent(&readings.cpu)?;
        let used = counter_value(MetricId::MemoryUsed, &readings.memory_used)?;
        let free = counter_value(MetricId::MemoryFree, &readings.memory_free)?;
        let memory = memory_percent(used, free)?;

        let elapsed = now.duration_since(self.counters.read_at).as_secs_f64();
        let inbound = throughput_kbps(
            in_octets,
            self.counters.in_octets,
            CounterWrap::of(&readings.in_octets),
            elapsed,
        )?;
        let outbound = throughput_kbps(
            out_octets,
            self.counters.out_octets,
            CounterWrap::of(&readings.out_octets),
            elapsed,
        )?;

        let sample = Sample {
            timestamp: now.duration_since(self.session_start).as_secs_f64(),
            recorded_at: chrono::Utc::now().timestamp_millis(),
            cpu_percent: cpu,
            memory_percent: memory,
            inbound_kbps: inbound,
            outbound_kbps: outbound,
        };

        // Counters move only once the sample is in the store. `&mut self` keeps
        // any other cycle from reading them between the append and this update.
        store.append(sample.clone()).await?;
        self.counters = RawCounterState {
            in_octets,
            out_octets,
            read_at: now,
            primed: true,
        };

        Ok(CycleOutcome::Recorded(sample))
    }

    /// Fetch all five metrics concurrently; every fetch settles before any is inspected
    async fn fetch_all(&self) -> Result<Readings, SampleError> {
        let (cpu, memory_used, memory_free, in_octets, out_octets) = tokio::join!(
            self.fetch(MetricId::CpuLoad),
            self.fetch(MetricId::MemoryUsed),
            self.fetch(MetricId::MemoryFree),
            self.fetch(MetricId::InOctets),
            self.fetch(MetricId::OutOctets),
        );

        Ok(Readings {
            cpu: cpu?,
            memory_used: memory_used?,
            memory_free: memory_free?,
            in_octets: in_octets?,
            out_octets: out_octets?,
        })
    }

    async fn fetch(&self, metric: MetricId) -> Result<RawValue, SampleError> {
        match tokio::time::timeout(self.fetch_timeout, self.source.fetch(metric)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(SampleError::Fetch { metric, source }),
            Err(_) => Err(SampleError::Fetch {
                metric,
                source: FetchError::Timeout(self.fetch_timeout),
            }),
        }
    }
}

/// CPU load as a percentage. Finite out-of-range readings are clamped to 0..=100.
pub fn cpu_percent(raw: &RawValue) -> Result<f64, SampleError> {
    let value = raw.as_f64().ok_or_else(|| SampleError::Conversion {
        metric: MetricId::CpuLoad,
        value: raw.clone(),
    })?;

    if !(0.0..=100.0).contains(&value) {
        warn!(cpu_percent = value, "CPU load out of range, clamping");
    }
    Ok(value.clamp(0.0, 100.0))
}

/// Memory utilization, truncated to a whole percent
pub fn memory_percent(used: u64, free: u64) -> Result<u8, SampleError> {
    let total = u128::from(used) + u128::from(free);
    if total == 0 {
        return Err(SampleError::DegenerateInput(
            "memory used and free are both zero".to_string(),
        ));
    }

    // used <= total, so the quotient is at most 100
    Ok((u128::from(used) * 100 / total) as u8)
}

/// Rate in kilobits per second between two reads of a cumulative octet counter
pub fn throughput_kbps(
    current: u64,
    previous: u64,
    wrap: CounterWrap,
    elapsed_secs: f64,
) -> Result<f64, SampleError> {
    if elapsed_secs.is_nan() || elapsed_secs <= 0.0 {
        return Err(SampleError::DegenerateInput(format!(
            "elapsed time must be positive, got {}s",
            elapsed_secs
        )));
    }

    let delta = match counter_delta(current, previous, wrap) {
        Some(delta) => delta,
        None => {
            debug!(current, previous, "Counter reset, reporting zero throughput");
            0
        }
    };
    Ok(delta as f64 * 8.0 / elapsed_secs / 1000.0)
}

/// Octets between two counter reads.
///
/// A decrease of a [`CounterWrap::Bits32`] counter whose reads both fit in
/// 32 bits is a wrap. Any other decrease is a counter reset and yields `None`.
pub fn counter_delta(current: u64, previous: u64, wrap: CounterWrap) -> Option<u64> {
    if current >= previous {
        return Some(current - previous);
    }

    let max32 = u64::from(u32::MAX);
    if wrap == CounterWrap::Bits32 && previous <= max32 && current <= max32 {
        Some(max32 - previous + current + 1)
    } else {
        None
    }
}

fn counter_value(metric: MetricId, raw: &RawValue) -> Result<u64, SampleError> {
    raw.as_u64().ok_or_else(|| SampleError::Conversion {
        metric,
        value: raw.clone(),
    })
}
