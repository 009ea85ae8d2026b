//! Error types for polling cycles

use crate::models::{MetricId, RawValue};
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a metric source for a single fetch
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The device answered with an error status for the request
    #[error("device reported error: {0}")]
    Indication(String),
    /// The request could not be completed at the transport level
    #[error("transport failure: {0}")]
    Exception(String),
    /// No answer arrived within the fetch timeout
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Failure of one polling cycle. Nothing is appended when a cycle fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("failed to fetch {metric}: {source}")]
    Fetch {
        metric: MetricId,
        #[source]
        source: FetchError,
    },

    #[error("{metric} returned non-numeric value {value}")]
    Conversion { metric: MetricId, value: RawValue },

    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("sample timestamp {next} does not follow {previous}")]
    OutOfOrder { previous: f64, next: f64 },
}

impl SampleError {
    /// Stable label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            SampleError::Fetch { .. } => "fetch",
            SampleError::Conversion { .. } => "conversion",
            SampleError::DegenerateInput(_) => "degenerate_input",
            SampleError::OutOfOrder { .. } => "out_of_order",
        }
    }

    /// The metric involved, if the failure is tied to one fetch
    pub fn metric(&self) -> Option<MetricId> {
        match self {
            SampleError::Fetch { metric, .. } | SampleError::Conversion { metric, .. } => {
                Some(*metric)
            }
            _ => None,
        }
    }
}
