//! Device sentinel library
//!
//! This crate provides the core functionality for:
//! - Fetching raw values from a network device through a metric source
//! - Deriving CPU, memory and throughput samples from raw readings
//! - A bounded rolling series of samples
//! - A fixed-cadence polling scheduler gated on connection state
//! - Health checks, observability and the HTTP API

pub mod api;
pub mod connection;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod presenter;
pub mod sampler;
pub mod scheduler;
pub mod series;
pub mod source;

pub use connection::ConnectionControl;
pub use error::{FetchError, SampleError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SentinelMetrics, StructuredLogger};
pub use sampler::{CounterWrap, CycleOutcome, Sampler};
pub use scheduler::{PollingScheduler, PollingSchedulerBuilder, SchedulerConfig, SchedulerStats};
pub use series::{SeriesSnapshot, SeriesStore};
pub use source::{create_source, MetricSource, SourceConfig, SourceKind};
