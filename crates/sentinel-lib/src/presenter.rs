//! Presenters
//!
//! A presenter consumes samples as the scheduler appends them. It subscribes
//! to the store's broadcast channel, so a slow presenter lags and drops
//! notifications instead of holding up the sampler.

use crate::models::Sample;
use crate::observability::StructuredLogger;
use crate::series::SeriesStore;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

/// Something that redraws from newly appended samples
pub trait Presenter: Send {
    fn present(&mut self, sample: &Sample);
}

/// Presenter that reports each sample as a structured log line
pub struct LogPresenter {
    logger: StructuredLogger,
    presented: u64,
}

impl LogPresenter {
    pub fn new(logger: StructuredLogger) -> Self {
        Self {
            logger,
            presented: 0,
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Presenter for LogPresenter {
    fn present(&mut self, sample: &Sample) {
        self.presented += 1;
        info!(
            event = "sample_presented",
            device = %self.logger.device(),
            t = format!("{:.1}s", sample.timestamp),
            cpu = format!("{:.1}%", sample.cpu_percent),
            memory = format!("{}%", sample.memory_percent),
            inbound = format!("{:.2} kbps", sample.inbound_kbps),
            outbound = format!("{:.2} kbps", sample.outbound_kbps),
            "Device health"
        );
    }
}

/// Feed every sample appended to `store` into `presenter` until shutdown
pub async fn run_presenter<P: Presenter>(
    store: &SeriesStore,
    presenter: P,
    shutdown: broadcast::Receiver<()>,
) -> P {
    present_updates(store.subscribe(), presenter, shutdown).await
}

/// Drain an already subscribed update stream into `presenter`
pub async fn present_updates<P: Presenter>(
    mut updates: broadcast::Receiver<Sample>,
    mut presenter: P,
    mut shutdown: broadcast::Receiver<()>,
) -> P {
    loop {
        tokio::select! {
            biased;
            received = updates.recv() => match received {
                Ok(sample) => presenter.present(&sample),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Presenter fell behind, skipping to newest samples");
                }
                Err(RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        }
    }

    presenter
}
