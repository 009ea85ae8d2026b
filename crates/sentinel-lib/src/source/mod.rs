//! Metric sources
//!
//! A metric source fetches one scalar from the managed device per call.
//! The transport behind it is opaque to the rest of the crate: the sampler
//! only sees a [`RawValue`] or a [`FetchError`].

mod simulated;

pub use simulated::{SimulatedDevice, SimulationProfile};

use crate::error::FetchError;
use crate::models::{DeviceTarget, MetricId, RawValue};
use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;

pub use async_trait::async_trait;

/// Trait for anything that can answer a single metric request
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Fetch the current value of one metric. One round trip, no retry.
    async fn fetch(&self, metric: MetricId) -> Result<RawValue, FetchError>;

    /// The device this source talks to
    fn target(&self) -> &DeviceTarget;
}

/// Which source implementation the agent should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Simulated,
}

/// Source selection and tuning
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// Probability (0.0..=1.0) that a simulated fetch fails
    #[serde(default)]
    pub failure_rate: f64,
    /// Fixed seed for the simulated device, random when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Simulated,
            failure_rate: 0.0,
            seed: None,
        }
    }
}

/// Create the configured metric source for a device
pub fn create_source(config: &SourceConfig, target: &DeviceTarget) -> Result<Arc<dyn MetricSource>> {
    if !(0.0..=1.0).contains(&config.failure_rate) {
        anyhow::bail!(
            "source.failure_rate must be between 0.0 and 1.0, got {}",
            config.failure_rate
        );
    }

    match config.kind {
        SourceKind::Simulated => {
            tracing::info!(
                device = %target.endpoint(),
                failure_rate = config.failure_rate,
                "Using simulated device source"
            );
            let profile = SimulationProfile {
                failure_rate: config.failure_rate,
                ..SimulationProfile::default()
            };
            let device = match config.seed {
                Some(seed) => SimulatedDevice::with_seed(target.clone(), profile, seed),
                None => SimulatedDevice::new(target.clone(), profile),
            };
            Ok(Arc::new(device))
        }
    }
}
