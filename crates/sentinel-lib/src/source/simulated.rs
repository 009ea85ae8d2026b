//! Simulated device
//!
//! Produces plausible readings for every [`MetricId`]: a wandering CPU load,
//! a memory pool split between used and free, and 32-bit interface octet
//! counters that advance with elapsed time and wrap like real ones.

use super::MetricSource;
use crate::error::FetchError;
use crate::models::{DeviceTarget, MetricId, RawValue};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Shape of the simulated traffic and resource usage
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    /// Total processor memory pool in bytes
    pub memory_pool_bytes: u64,
    /// Mean inbound rate in bytes per second
    pub inbound_bytes_per_sec: f64,
    /// Mean outbound rate in bytes per second
    pub outbound_bytes_per_sec: f64,
    /// Simulated round trip per fetch
    pub latency: Duration,
    /// Probability that a fetch fails
    pub failure_rate: f64,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            memory_pool_bytes: 512 * 1024 * 1024,
            inbound_bytes_per_sec: 250_000.0,
            outbound_bytes_per_sec: 120_000.0,
            latency: Duration::from_millis(5),
            failure_rate: 0.0,
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    rng: StdRng,
    cpu_percent: f64,
    memory_used_fraction: f64,
    in_octets: u32,
    out_octets: u32,
    counters_updated: Instant,
}

/// In-process stand-in for a managed network device
pub struct SimulatedDevice {
    target: DeviceTarget,
    profile: SimulationProfile,
    state: Mutex<DeviceState>,
}

impl SimulatedDevice {
    /// Create a simulated device seeded from system entropy
    pub fn new(target: DeviceTarget, profile: SimulationProfile) -> Self {
        Self::with_rng(target, profile, StdRng::from_entropy())
    }

    /// Create a simulated device with a fixed seed (for testing)
    pub fn with_seed(target: DeviceTarget, profile: SimulationProfile, seed: u64) -> Self {
        Self::with_rng(target, profile, StdRng::seed_from_u64(seed))
    }

    fn with_rng(target: DeviceTarget, profile: SimulationProfile, mut rng: StdRng) -> Self {
        let in_octets = rng.gen_range(0..u32::MAX / 2);
        let out_octets = rng.gen_range(0..u32::MAX / 2);

        Self {
            target,
            profile,
            state: Mutex::new(DeviceState {
                rng,
                cpu_percent: 15.0,
                memory_used_fraction: 0.45,
                in_octets,
                out_octets,
                counters_updated: Instant::now(),
            }),
        }
    }

    fn read(&self, metric: MetricId) -> Result<RawValue, FetchError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| FetchError::Exception("simulated device state poisoned".to_string()))?;

        let failure_rate = self.profile.failure_rate.clamp(0.0, 1.0);
        if failure_rate > 0.0 && state.rng.gen_bool(failure_rate) {
            return Err(FetchError::Indication(format!(
                "noSuchInstance for {}",
                metric.oid()
            )));
        }

        let value = match metric {
            MetricId::CpuLoad => {
                let step = state.rng.gen_range(-5.0..5.0);
                state.cpu_percent = (state.cpu_percent + step).clamp(1.0, 99.0);
                RawValue::Integer(state.cpu_percent.round() as i64)
            }
            MetricId::MemoryUsed | MetricId::MemoryFree => {
                if metric == MetricId::MemoryUsed {
                    let step = state.rng.gen_range(-0.01..0.01);
                    state.memory_used_fraction =
                        (state.memory_used_fraction + step).clamp(0.05, 0.95);
                }
                let pool = self.profile.memory_pool_bytes;
                let used = (pool as f64 * state.memory_used_fraction) as u64;
                if metric == MetricId::MemoryUsed {
                    RawValue::Gauge(used)
                } else {
                    RawValue::Gauge(pool - used)
                }
            }
            MetricId::InOctets | MetricId::OutOctets => {
                self.advance_counters(&mut state);
                if metric == MetricId::InOctets {
                    RawValue::Counter32(state.in_octets)
                } else {
                    RawValue::Counter32(state.out_octets)
                }
            }
        };

        Ok(value)
    }

    fn advance_counters(&self, state: &mut DeviceState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.counters_updated).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }

        let in_jitter = state.rng.gen_range(0.5..1.5);
        let out_jitter = state.rng.gen_range(0.5..1.5);
        let in_delta = (self.profile.inbound_bytes_per_sec * in_jitter * elapsed) as u64;
        let out_delta = (self.profile.outbound_bytes_per_sec * out_jitter * elapsed) as u64;

        state.in_octets = state.in_octets.wrapping_add(in_delta as u32);
        state.out_octets = state.out_octets.wrapping_add(out_delta as u32);
        state.counters_updated = now;
    }
}

#[async_trait]
impl MetricSource for SimulatedDevice {
    async fn fetch(&self, metric: MetricId) -> Result<RawValue, FetchError> {
        if !self.profile.latency.is_zero() {
            tokio::time::sleep(self.profile.latency).await;
        }
        self.read(metric)
    }

    fn target(&self) -> &DeviceTarget {
        &self.target
    }
}
