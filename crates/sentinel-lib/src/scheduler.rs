//! Polling scheduler
//!
//! Drives the sampler at a fixed cadence while the device is connected.
//! Each tick awaits a full cycle and only then sleeps for the interval, so
//! a slow round trip delays later ticks instead of overlapping them.

use crate::error::SampleError;
use crate::health::{components, HealthRegistry};
use crate::models::ConnectionState;
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::sampler::{CycleOutcome, Sampler, DEFAULT_FETCH_TIMEOUT};
use crate::series::SeriesStore;
use crate::source::MetricSource;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info};

/// Configuration for the polling scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay between the end of one cycle and the start of the next (default: 1 second)
    pub interval: Duration,
    /// Bound on each metric round trip (default: 2 seconds)
    pub fetch_timeout: Duration,
    /// Consecutive failed cycles before the sampler is reported unhealthy
    pub unhealthy_after_failures: u32,
    /// Emit a summary log line every this many cycles
    pub summary_every: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            unhealthy_after_failures: 5,
            summary_every: 60,
        }
    }
}

/// Counters describing what the scheduler did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub recorded: u64,
    pub primed: u64,
    pub failed: u64,
}

/// Why the inter-cycle sleep ended
#[derive(Debug, PartialEq, Eq)]
enum Wake {
    Elapsed,
    StateChanged,
    Shutdown,
}

/// Polling loop for a single device
pub struct PollingScheduler {
    sampler: Sampler,
    store: SeriesStore,
    config: SchedulerConfig,
    connection: watch::Receiver<ConnectionState>,
    health: HealthRegistry,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
    consecutive_failures: u32,
    /// Consecutive cycles in which the device failed to answer
    fetch_failures: u32,
    /// Set while the store is rejecting samples
    store_rejecting: bool,
    stats: SchedulerStats,
}

impl PollingScheduler {
    /// Create a scheduler
    pub fn new(
        source: Arc<dyn MetricSource>,
        store: SeriesStore,
        connection: watch::Receiver<ConnectionState>,
        config: SchedulerConfig,
    ) -> Self {
        let logger = StructuredLogger::new(source.target().endpoint());
        let sampler = Sampler::new(source).with_fetch_timeout(config.fetch_timeout);

        Self {
            sampler,
            store,
            config,
            connection,
            health: HealthRegistry::new(),
            metrics: SentinelMetrics::new(),
            logger,
            consecutive_failures: 0,
            fetch_failures: 0,
            store_rejecting: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Run until `shutdown` fires. Returns what the loop did.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> SchedulerStats {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            device = %self.logger.device(),
            "Starting polling scheduler"
        );

        // Set once every ConnectionControl is gone; the state can no longer change
        let mut control_closed = false;
        let mut state = *self.connection.borrow_and_update();
        self.metrics.set_connection_state(state);

        loop {
            if state == ConnectionState::Disconnected {
                if control_closed {
                    info!("Connection control dropped while disconnected, stopping scheduler");
                    break;
                }

                debug!("Polling paused while disconnected");
                tokio::select! {
                    changed = self.connection.changed() => {
                        if changed.is_err() {
                            control_closed = true;
                            continue;
                        }
                        state = self.on_connection_change();
                        continue;
                    }
                    _ = shutdown.recv() => {
                        info!("Shutting down polling scheduler");
                        break;
                    }
                }
            }

            self.tick().await;

            let sleep = tokio::time::sleep(self.config.interval);
            tokio::pin!(sleep);
            let wake = loop {
                tokio::select! {
                    _ = &mut sleep => break Wake::Elapsed,
                    changed = self.connection.changed(), if !control_closed => {
                        if changed.is_err() {
                            control_closed = true;
                        } else {
                            state = self.on_connection_change();
                            break Wake::StateChanged;
                        }
                    }
                    _ = shutdown.recv() => break Wake::Shutdown,
                }
            };

            if wake == Wake::Shutdown {
                info!("Shutting down polling scheduler");
                break;
            }
        }

        info!(
            cycles = self.stats.cycles,
            recorded = self.stats.recorded,
            failed = self.stats.failed,
            "Polling scheduler stopped"
        );
        self.stats
    }

    /// Apply the latest connection state. Any transition restarts the counter
    /// baseline, since the gap in polling makes the old one meaningless.
    fn on_connection_change(&mut self) -> ConnectionState {
        let state = *self.connection.borrow_and_update();
        self.metrics.set_connection_state(state);
        self.logger.log_connection_change(state);
        self.sampler.reset_baseline();
        state
    }

    /// Run one cycle and account for its outcome. Never propagates a failure.
    async fn tick(&mut self) {
        let start = Instant::now();
        let result = self.sampler.run_cycle(&self.store).await;
        let elapsed = start.elapsed();

        self.metrics.observe_cycle_latency(elapsed.as_secs_f64());
        self.stats.cycles += 1;

        match result {
            Ok(CycleOutcome::Primed) => {
                // The device answered, but the sampler has not recorded yet
                self.stats.primed += 1;
                self.source_answered().await;
                debug!("Counter baseline primed, first sample follows next cycle");
            }
            Ok(CycleOutcome::Recorded(sample)) => {
                self.stats.recorded += 1;
                self.source_answered().await;
                self.store_accepted().await;
                self.recover().await;
                self.metrics
                    .record_sample(&sample, self.store.len().await);
                self.logger.log_sample(&sample);
            }
            Err(e) => {
                self.stats.failed += 1;
                self.consecutive_failures += 1;
                self.metrics.inc_cycle_failures(e.kind());
                self.logger
                    .log_cycle_failure(&e, self.consecutive_failures);
                self.health
                    .record_cycle(
                        self.consecutive_failures,
                        self.config.unhealthy_after_failures,
                        Some(&e.to_string()),
                    )
                    .await;
                self.record_component_failure(&e).await;
            }
        }

        if self.config.summary_every > 0 && self.stats.cycles % self.config.summary_every == 0 {
            info!(
                cycles = self.stats.cycles,
                recorded = self.stats.recorded,
                failed = self.stats.failed,
                elapsed_ms = elapsed.as_millis() as u64,
                "Polling summary"
            );
        }
    }

    /// Attribute a failed cycle to the source or the store
    async fn record_component_failure(&mut self, error: &SampleError) {
        match error {
            SampleError::Fetch { .. } => {
                self.fetch_failures += 1;
                self.health
                    .record_streak(
                        components::SOURCE,
                        self.fetch_failures,
                        self.config.unhealthy_after_failures,
                        Some(&error.to_string()),
                    )
                    .await;
            }
            SampleError::OutOfOrder { .. } => {
                // Every fetch succeeded before the store refused the sample
                self.source_answered().await;
                self.store_rejecting = true;
                self.health
                    .set_degraded(components::STORE, error.to_string())
                    .await;
            }
            SampleError::Conversion { .. } | SampleError::DegenerateInput(_) => {
                self.source_answered().await;
            }
        }
    }

    async fn source_answered(&mut self) {
        if self.fetch_failures > 0 {
            self.fetch_failures = 0;
            self.health.set_healthy(components::SOURCE).await;
        }
    }

    async fn store_accepted(&mut self) {
        if self.store_rejecting {
            self.store_rejecting = false;
            self.health.set_healthy(components::STORE).await;
        }
    }

    async fn recover(&mut self) {
        if self.consecutive_failures > 0 {
            info!(
                after_failures = self.consecutive_failures,
                "Device polling recovered"
            );
            self.consecutive_failures = 0;
            self.health
                .record_cycle(0, self.config.unhealthy_after_failures, None)
                .await;
        }
    }
}

/// Builder for creating the polling scheduler
pub struct PollingSchedulerBuilder {
    source: Option<Arc<dyn MetricSource>>,
    store: Option<SeriesStore>,
    connection: Option<watch::Receiver<ConnectionState>>,
    health: Option<HealthRegistry>,
    metrics: Option<SentinelMetrics>,
    logger: Option<StructuredLogger>,
    config: SchedulerConfig,
}

impl PollingSchedulerBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            store: None,
            connection: None,
            health: None,
            metrics: None,
            logger: None,
            config: SchedulerConfig::default(),
        }
    }

    pub fn source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(mut self, store: SeriesStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Watch a connection state; without one the scheduler polls unconditionally
    pub fn connection(mut self, connection: watch::Receiver<ConnectionState>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn metrics(mut self, metrics: SentinelMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    pub fn unhealthy_after_failures(mut self, failures: u32) -> Self {
        self.config.unhealthy_after_failures = failures;
        self
    }

    pub fn summary_every(mut self, cycles: u64) -> Self {
        self.config.summary_every = cycles;
        self
    }

    pub fn build(self) -> Result<PollingScheduler> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Metric source is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Series store is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Polling interval must be greater than zero");
        }

        let connection = self.connection.unwrap_or_else(|| {
            // The sender drops immediately; the loop treats that as a fixed state
            let (_tx, rx) = watch::channel(ConnectionState::Connected);
            rx
        });

        let mut scheduler = PollingScheduler::new(source, store, connection, self.config);
        if let Some(health) = self.health {
            scheduler.health = health;
        }
        if let Some(metrics) = self.metrics {
            scheduler.metrics = metrics;
        }
        if let Some(logger) = self.logger {
            scheduler.logger = logger;
        }
        Ok(scheduler)
    }
}

impl Default for PollingSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionControl;
    use crate::error::FetchError;
    use crate::health::{components, ComponentStatus};
    use crate::models::{DeviceTarget, Metric, MetricId, RawValue, Sample};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    /// Mock device whose octet counters grow by a fixed step per fetch
    struct MockSource {
        target: DeviceTarget,
        fetches: AtomicUsize,
        octets: AtomicU64,
        fail_memory_free: AtomicBool,
        latency: Duration,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                target: DeviceTarget::new("192.0.2.10"),
                fetches: AtomicUsize::new(0),
                octets: AtomicU64::new(0),
                fail_memory_free: AtomicBool::new(false),
                latency: Duration::ZERO,
            }
        }

        fn with_latency(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::new()
            }
        }

        fn cycles_fetched(&self) -> usize {
            self.fetches.load(Ordering::SeqCst) / MetricId::ALL.len()
        }
    }

    #[async_trait]
    impl MetricSource for MockSource {
        async fn fetch(&self, metric: MetricId) -> Result<RawValue, FetchError> {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.fetches.fetch_add(1, Ordering::SeqCst);

            match metric {
                MetricId::CpuLoad => Ok(RawValue::Integer(20)),
                MetricId::MemoryUsed => Ok(RawValue::Gauge(300)),
                MetricId::MemoryFree => {
                    if self.fail_memory_free.load(Ordering::SeqCst) {
                        Err(FetchError::Exception("request timed out".to_string()))
                    } else {
                        Ok(RawValue::Gauge(700))
                    }
                }
                MetricId::InOctets | MetricId::OutOctets => Ok(RawValue::Counter64(
                    self.octets.fetch_add(1000, Ordering::SeqCst),
                )),
            }
        }

        fn target(&self) -> &DeviceTarget {
            &self.target
        }
    }

    fn spawn(
        scheduler: PollingScheduler,
    ) -> (broadcast::Sender<()>, tokio::task::JoinHandle<SchedulerStats>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));
        (shutdown_tx, handle)
    }

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.fetch_timeout, Duration::from_secs(2));
        assert_eq!(config.unhealthy_after_failures, 5);
    }

    #[tokio::test]
    async fn test_builder_requires_source() {
        let result = PollingSchedulerBuilder::new()
            .store(SeriesStore::new(10))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_builder_rejects_zero_interval() {
        let result = PollingSchedulerBuilder::new()
            .source(Arc::new(MockSource::new()))
            .store(SeriesStore::new(10))
            .interval(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_fixed_cadence() {
        let store = SeriesStore::new(100);
        let scheduler = PollingSchedulerBuilder::new()
            .source(Arc::new(MockSource::new()))
            .store(store.clone())
            .interval(Duration::from_secs(1))
            .build()
            .unwrap();

        let (shutdown, handle) = spawn(scheduler);
        tokio::time::sleep(Duration::from_millis(4500)).await;
        shutdown.send(()).unwrap();
        let stats = handle.await.unwrap();

        // Cycles at t = 0, 1, 2, 3, 4; the first one primes
        assert_eq!(stats.cycles, 5);
        assert_eq!(stats.primed, 1);
        assert_eq!(stats.recorded, 4);
        assert_eq!(store.len().await, 4);

        let axis = store.timestamps().await;
        assert!(axis.windows(2).all(|w| w[0] < w[1]));
        assert!(store
            .series(Metric::Memory)
            .await
            .iter()
            .all(|m| *m == 30.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycles_delay_ticks() {
        let source = Arc::new(MockSource::with_latency(Duration::from_millis(1500)));
        let scheduler = PollingSchedulerBuilder::new()
            .source(source.clone())
            .store(SeriesStore::new(100))
            .interval(Duration::from_secs(1))
            .build()
            .unwrap();

        let (shutdown, handle) = spawn(scheduler);
        // Each tick takes 1.5s of fetching plus 1s of sleep
        tokio::time::sleep(Duration::from_millis(6000)).await;
        shutdown.send(()).unwrap();
        let stats = handle.await.unwrap();

        // Cycles start at 0.0s, 2.5s and 5.0s; the third finishes at 6.5s before
        // shutdown is seen. A fixed-rate timer would have started seven.
        assert_eq!(stats.cycles, 3);
        assert_eq!(source.cycles_fetched(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_loop() {
        let source = Arc::new(MockSource::new());
        source.fail_memory_free.store(true, Ordering::SeqCst);
        let store = SeriesStore::new(100);
        let health = HealthRegistry::new();
        health.register(components::SAMPLER).await;

        let scheduler = PollingSchedulerBuilder::new()
            .source(source.clone())
            .store(store.clone())
            .health(health.clone())
            .unhealthy_after_failures(3)
            .build()
            .unwrap();

        let (shutdown, handle) = spawn(scheduler);
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert!(store.is_empty().await);
        assert_eq!(
            health.status_of(components::SAMPLER).await,
            Some(ComponentStatus::Unhealthy)
        );

        // The device recovers and the loop picks it up on later ticks
        source.fail_memory_free.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown.send(()).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(stats.failed, 4);
        assert!(stats.recorded >= 1);
        assert!(!store.is_empty().await);
        assert_eq!(
            health.status_of(components::SAMPLER).await,
            Some(ComponentStatus::Healthy)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_priming_cycle_does_not_restore_sampler_health() {
        let source = Arc::new(MockSource::new());
        source.fail_memory_free.store(true, Ordering::SeqCst);
        let health = HealthRegistry::new();
        health.register(components::SAMPLER).await;
        health.register(components::SOURCE).await;

        let scheduler = PollingSchedulerBuilder::new()
            .source(source.clone())
            .store(SeriesStore::new(100))
            .health(health.clone())
            .unhealthy_after_failures(3)
            .build()
            .unwrap();

        let (shutdown, handle) = spawn(scheduler);
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(
            health.status_of(components::SOURCE).await,
            Some(ComponentStatus::Unhealthy)
        );

        // The cycle at t = 4 only primes: the device answers again but no
        // sample has been recorded yet
        source.fail_memory_free.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            health.status_of(components::SOURCE).await,
            Some(ComponentStatus::Healthy)
        );
        assert_eq!(
            health.status_of(components::SAMPLER).await,
            Some(ComponentStatus::Unhealthy)
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            health.status_of(components::SAMPLER).await,
            Some(ComponentStatus::Healthy)
        );

        shutdown.send(()).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.primed, 1);
        assert_eq!(stats.recorded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_append_degrades_store() {
        let store = SeriesStore::new(100);
        store
            .append(Sample {
                timestamp: 1000.0,
                recorded_at: 1_700_000_000_000,
                cpu_percent: 10.0,
                memory_percent: 10,
                inbound_kbps: 0.0,
                outbound_kbps: 0.0,
            })
            .await
            .unwrap();
        let health = HealthRegistry::new();
        health.register(components::SOURCE).await;
        health.register(components::STORE).await;

        let scheduler = PollingSchedulerBuilder::new()
            .source(Arc::new(MockSource::new()))
            .store(store.clone())
            .health(health.clone())
            .build()
            .unwrap();

        let (shutdown, handle) = spawn(scheduler);
        // t = 0 primes, t = 1 is refused by the store
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(
            health.status_of(components::STORE).await,
            Some(ComponentStatus::Degraded)
        );
        assert_eq!(
            health.status_of(components::SOURCE).await,
            Some(ComponentStatus::Healthy)
        );

        store.clear().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            health.status_of(components::STORE).await,
            Some(ComponentStatus::Healthy)
        );

        shutdown.send(()).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_does_not_poll() {
        let source = Arc::new(MockSource::new());
        let control = ConnectionControl::default();
        let store = SeriesStore::new(100);

        let scheduler = PollingSchedulerBuilder::new()
            .source(source.clone())
            .store(store.clone())
            .connection(control.subscribe())
            .build()
            .unwrap();

        let (shutdown, handle) = spawn(scheduler);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.cycles_fetched(), 0);

        control.connect();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(store.len().await, 2);

        control.disconnect();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let fetched = source.cycles_fetched();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.cycles_fetched(), fetched);

        shutdown.send(()).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.primed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_reprimes_baseline() {
        let source = Arc::new(MockSource::new());
        let control = ConnectionControl::new(ConnectionState::Connected);
        let store = SeriesStore::new(100);

        let scheduler = PollingSchedulerBuilder::new()
            .source(source.clone())
            .store(store.clone())
            .connection(control.subscribe())
            .build()
            .unwrap();

        let (shutdown, handle) = spawn(scheduler);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        control.disconnect();
        tokio::time::sleep(Duration::from_secs(30)).await;
        control.connect();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        shutdown.send(()).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(stats.primed, 2);
        assert_eq!(store.len().await, 2);
        // Each cycle moves the inbound counter by 2000 octets over one second;
        // a rate across the 30 second gap would be far lower
        for kbps in store.series(Metric::Inbound).await {
            assert!((kbps - 16.0).abs() < 1e-9);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_paused() {
        let control = ConnectionControl::default();
        let scheduler = PollingSchedulerBuilder::new()
            .source(Arc::new(MockSource::new()))
            .store(SeriesStore::new(10))
            .connection(control.subscribe())
            .build()
            .unwrap();

        let (shutdown, handle) = spawn(scheduler);
        tokio::task::yield_now().await;
        shutdown.send(()).unwrap();

        let stats = handle.await.unwrap();
        assert_eq!(stats, SchedulerStats::default());
    }
}
