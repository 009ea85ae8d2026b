//! Rolling series store
//!
//! Bounded ring of samples sharing one timestamp axis:
//! - FIFO eviction once capacity is reached
//! - Strictly increasing timestamps
//! - Single writer / many readers through an async `RwLock`
//! - Broadcast notification of every appended sample

use crate::error::SampleError;
use crate::models::{Metric, Sample};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Default capacity (one hour at a 1 second interval)
pub const DEFAULT_CAPACITY: usize = 3600;

/// Buffered notifications per subscriber before it starts lagging
const UPDATE_CHANNEL_SIZE: usize = 64;

/// Shared handle to the rolling series. Clones share the same data.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    samples: Arc<RwLock<VecDeque<Sample>>>,
    capacity: usize,
    updates: broadcast::Sender<Sample>,
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SeriesStore {
    /// Create a store keeping at most `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_SIZE);
        Self {
            samples: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(10_000)))),
            capacity,
            updates,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub async fn append(&self, sample: Sample) -> Result<(), SampleError> {
        {
            let mut samples = self.samples.write().await;

            if let Some(last) = samples.back() {
                if sample.timestamp <= last.timestamp {
                    return Err(SampleError::OutOfOrder {
                        previous: last.timestamp,
                        next: sample.timestamp,
                    });
                }
            }

            while samples.len() >= self.capacity {
                samples.pop_front();
            }
            samples.push_back(sample.clone());
        }

        // No subscribers is fine
        let _ = self.updates.send(sample);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.samples.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.samples.read().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The shared timestamp axis, oldest first
    pub async fn timestamps(&self) -> Vec<f64> {
        self.samples.read().await.iter().map(|s| s.timestamp).collect()
    }

    /// All retained values of one metric, aligned with [`Self::timestamps`]
    pub async fn series(&self, metric: Metric) -> Vec<f64> {
        self.samples
            .read()
            .await
            .iter()
            .map(|s| s.value(metric))
            .collect()
    }

    /// Most recent sample, for display labels
    pub async fn latest(&self) -> Option<Sample> {
        self.samples.read().await.back().cloned()
    }

    /// Consistent view of the newest `limit` samples (all when `None`)
    pub async fn snapshot(&self, limit: Option<usize>) -> SeriesSnapshot {
        let samples = self.samples.read().await;
        let take = limit.unwrap_or(samples.len()).min(samples.len());
        let window = samples.iter().skip(samples.len() - take);

        let mut snapshot = SeriesSnapshot {
            capacity: self.capacity,
            retained: samples.len(),
            timestamps: Vec::with_capacity(take),
            cpu: Vec::with_capacity(take),
            memory: Vec::with_capacity(take),
            inbound: Vec::with_capacity(take),
            outbound: Vec::with_capacity(take),
        };

        for sample in window {
            snapshot.timestamps.push(sample.timestamp);
            snapshot.cpu.push(sample.cpu_percent);
            snapshot.memory.push(f64::from(sample.memory_percent));
            snapshot.inbound.push(sample.inbound_kbps);
            snapshot.outbound.push(sample.outbound_kbps);
        }

        snapshot
    }

    /// Receive every sample appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Sample> {
        self.updates.subscribe()
    }

    /// Drop all retained samples
    pub async fn clear(&self) {
        self.samples.write().await.clear();
    }
}

/// Column-oriented copy of the series, ready for charting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    pub capacity: usize,
    /// Samples held by the store, which may exceed the window returned
    pub retained: usize,
    pub timestamps: Vec<f64>,
    pub cpu: Vec<f64>,
    pub memory: Vec<f64>,
    pub inbound: Vec<f64>,
    pub outbound: Vec<f64>,
}

impl SeriesSnapshot {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn values(&self, metric: Metric) -> &[f64] {
        match metric {
            Metric::Cpu => &self.cpu,
            Metric::Memory => &self.memory,
            Metric::Inbound => &self.inbound,
            Metric::Outbound => &self.outbound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(timestamp: f64) -> Sample {
        Sample {
            timestamp,
            recorded_at: 1_700_000_000_000 + (timestamp * 1000.0) as i64,
            cpu_percent: timestamp,
            memory_percent: 40,
            inbound_kbps: 8.0 * timestamp,
            outbound_kbps: 4.0,
        }
    }

    #[tokio::test]
    async fn test_subscriber_waits_for_append() {
        let store = SeriesStore::new(4);
        let mut updates = store.subscribe();
        let mut recv = tokio_test::task::spawn(updates.recv());

        tokio_test::assert_pending!(recv.poll());

        store.append(sample_at(1.0)).await.unwrap();
        assert!(recv.is_woken());
        let sample = tokio_test::assert_ready_ok!(recv.poll());
        assert_eq!(sample.timestamp, 1.0);
    }

    #[tokio::test]
    async fn test_append_and_read_series() {
        let store = SeriesStore::new(10);

        for t in 1..=3 {
            store.append(sample_at(t as f64)).await.unwrap();
        }

        assert_eq!(store.len().await, 3);
        assert_eq!(store.timestamps().await, vec![1.0, 2.0, 3.0]);
        assert_eq!(store.series(Metric::Cpu).await, vec![1.0, 2.0, 3.0]);
        assert_eq!(store.series(Metric::Memory).await, vec![40.0; 3]);
        assert_eq!(store.latest().await.unwrap().timestamp, 3.0);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = SeriesStore::new(5);

        for t in 1..=10 {
            store.append(sample_at(t as f64)).await.unwrap();
        }

        assert_eq!(store.len().await, 5);
        assert_eq!(store.timestamps().await, vec![6.0, 7.0, 8.0, 9.0, 10.0]);
    }

    #[tokio::test]
    async fn test_rejects_non_increasing_timestamp() {
        let store = SeriesStore::new(10);
        store.append(sample_at(2.0)).await.unwrap();

        let same = store.append(sample_at(2.0)).await.unwrap_err();
        assert_eq!(same.kind(), "out_of_order");
        assert!(store.append(sample_at(1.5)).await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increasing() {
        let store = SeriesStore::new(100);
        for t in [0.5, 1.0, 1.25, 7.0, 7.001] {
            store.append(sample_at(t)).await.unwrap();
        }

        let axis = store.timestamps().await;
        assert!(axis.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_snapshot_window() {
        let store = SeriesStore::new(10);
        for t in 1..=6 {
            store.append(sample_at(t as f64)).await.unwrap();
        }

        let snapshot = store.snapshot(Some(2)).await;
        assert_eq!(snapshot.retained, 6);
        assert_eq!(snapshot.timestamps, vec![5.0, 6.0]);
        assert_eq!(snapshot.values(Metric::Inbound), &[40.0, 48.0]);

        let all = store.snapshot(None).await;
        assert_eq!(all.len(), 6);

        let oversized = store.snapshot(Some(100)).await;
        assert_eq!(oversized.len(), 6);
    }

    #[tokio::test]
    async fn test_subscribers_see_appends() {
        let store = SeriesStore::new(10);
        let mut rx = store.subscribe();

        store.append(sample_at(1.0)).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.timestamp, 1.0);
    }

    #[tokio::test]
    async fn test_rejected_append_is_not_broadcast() {
        let store = SeriesStore::new(10);
        store.append(sample_at(3.0)).await.unwrap();

        let mut rx = store.subscribe();
        assert!(store.append(sample_at(1.0)).await.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clear_and_zero_capacity() {
        let store = SeriesStore::new(0);
        assert_eq!(store.capacity(), 1);

        store.append(sample_at(1.0)).await.unwrap();
        store.append(sample_at(2.0)).await.unwrap();
        assert_eq!(store.len().await, 1);

        store.clear().await;
        assert!(store.is_empty().await);
        assert!(store.snapshot(None).await.is_empty());
    }
}
