//! Per-instance metrics store
//!
//! Each instance owns one bounded [`MetricsWindow`]. Writers lock only the
//! shard holding their instance, and readers take an owned snapshot so the
//! summarize/recommend computation never runs under a store lock.

mod window;

pub use window::{MetricsWindow, Rejected, WindowStats};

use crate::error::{EngineError, EngineResult};
use crate::models::MetricSample;
use dashmap::DashMap;
use tracing::debug;

pub struct MetricsStore {
    windows: DashMap<String, MetricsWindow>,
    capacity: usize,
}

impl MetricsStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity,
        }
    }

    /// Start tracking an instance with an empty window
    pub fn track(&self, instance: &str) {
        self.windows
            .entry(instance.to_string())
            .or_insert_with(|| MetricsWindow::new(self.capacity));
    }

    /// Drop an instance's window
    pub fn remove(&self, instance: &str) -> Option<MetricsWindow> {
        debug!(instance = %instance, "Dropping metrics window");
        self.windows.remove(instance).map(|(_, w)| w)
    }

    /// Append a sample to an instance's window
    pub fn append(&self, instance: &str, sample: MetricSample) -> EngineResult<()> {
        let mut window = self
            .windows
            .get_mut(instance)
            .ok_or_else(|| EngineError::UnknownInstance(instance.to_string()))?;

        let timestamp = sample.timestamp;
        window
            .push(sample)
            .map_err(|rejected| EngineError::OutOfOrderSample {
                instance: instance.to_string(),
                timestamp,
                latest: rejected.latest,
            })
    }

    /// Read-only snapshot of an instance's window, oldest first
    pub fn window(&self, instance: &str) -> EngineResult<Vec<MetricSample>> {
        self.windows
            .get(instance)
            .map(|w| w.snapshot())
            .ok_or_else(|| EngineError::UnknownInstance(instance.to_string()))
    }

    pub fn stats(&self, instance: &str) -> Option<WindowStats> {
        self.windows.get(instance).map(|w| w.stats())
    }

    pub fn sample_count(&self, instance: &str) -> usize {
        self.windows.get(instance).map(|w| w.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn sample(timestamp: chrono::DateTime<Utc>, cpu: f64) -> MetricSample {
        MetricSample {
            timestamp,
            cpu_percent: cpu,
            memory_percent: 40.0,
            disk_percent: 20.0,
            network_bytes_per_sec: 0.0,
            gpu_percent: None,
        }
    }

    #[test]
    fn test_append_requires_tracking() {
        let store = MetricsStore::new(10);
        let err = store.append("ws-1", sample(Utc::now(), 5.0)).unwrap_err();
        assert!(matches!(err, EngineError::UnknownInstance(_)));
    }

    #[test]
    fn test_out_of_order_maps_to_engine_error() {
        let store = MetricsStore::new(10);
        store.track("ws-1");
        let now = Utc::now();
        store.append("ws-1", sample(now, 5.0)).unwrap();

        let err = store
            .append("ws-1", sample(now - Duration::minutes(2), 6.0))
            .unwrap_err();
        match err {
            EngineError::OutOfOrderSample { latest, .. } => assert_eq!(latest, now),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.sample_count("ws-1"), 1);
    }

    #[test]
    fn test_track_is_idempotent() {
        let store = MetricsStore::new(10);
        store.track("ws-1");
        store.append("ws-1", sample(Utc::now(), 5.0)).unwrap();
        store.track("ws-1");
        assert_eq!(store.sample_count("ws-1"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_per_instance() {
        let store = Arc::new(MetricsStore::new(100));
        let start = Utc::now();
        let mut handles = Vec::new();
        for i in 0..4 {
            let name = format!("ws-{i}");
            store.track(&name);
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for minute in 0..50 {
                    store
                        .append(&name, sample(start + Duration::minutes(minute), 10.0))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        for i in 0..4 {
            assert_eq!(store.window(&format!("ws-{i}")).unwrap().len(), 50);
        }
    }
}
