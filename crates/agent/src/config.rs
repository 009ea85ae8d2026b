//! Agent configuration
//!
//! Values come from an optional file named by `SENTINEL_CONFIG`, then from
//! `SENTINEL_*` environment variables. Nested keys use a double underscore,
//! e.g. `SENTINEL_DEVICE__ADDRESS` or `SENTINEL_POLLING__INTERVAL_MS`.

use anyhow::{bail, Context, Result};
use sentinel_lib::{scheduler::SchedulerConfig, series, DeviceTarget, SourceConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SENTINEL";
const CONFIG_FILE_VAR: &str = "SENTINEL_CONFIG";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Device to poll
    #[serde(default)]
    pub device: DeviceTarget,

    /// Where raw values come from
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// API server port for health/metrics/series
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Start polling immediately when the device has an address
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    #[serde(default = "default_unhealthy_after_failures")]
    pub unhealthy_after_failures: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Samples retained before the oldest are evicted
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_api_port() -> u16 {
    8080
}

fn default_auto_connect() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_fetch_timeout_ms() -> u64 {
    2000
}

fn default_unhealthy_after_failures() -> u32 {
    5
}

fn default_capacity() -> usize {
    series::DEFAULT_CAPACITY
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            unhealthy_after_failures: default_unhealthy_after_failures(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device: DeviceTarget::default(),
            source: SourceConfig::default(),
            polling: PollingConfig::default(),
            store: StoreConfig::default(),
            api_port: default_api_port(),
            auto_connect: default_auto_connect(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the process environment and config file
    pub fn load() -> Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_VAR).map(PathBuf::from);
        Self::from_sources(file.as_deref(), None)
    }

    /// Load from an optional file plus environment variables.
    ///
    /// `env` replaces the process environment when given.
    pub fn from_sources(file: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: AgentConfig = builder
            .build()
            .context("Failed to read agent configuration")?
            .try_deserialize()
            .context("Invalid agent configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler and store cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            bail!("polling.interval_ms must be greater than zero");
        }
        if self.polling.fetch_timeout_ms == 0 {
            bail!("polling.fetch_timeout_ms must be greater than zero");
        }
        if self.store.capacity == 0 {
            bail!("store.capacity must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.source.failure_rate) {
            bail!("source.failure_rate must be between 0.0 and 1.0");
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_millis(self.polling.interval_ms),
            fetch_timeout: Duration::from_millis(self.polling.fetch_timeout_ms),
            unhealthy_after_failures: self.polling.unhealthy_after_failures,
            ..SchedulerConfig::default()
        }
    }
}
