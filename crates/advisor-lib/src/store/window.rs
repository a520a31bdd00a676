//! Bounded per-instance sample window

use crate::models::MetricSample;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Ring buffer of utilization samples in strictly increasing timestamp order
#[derive(Debug, Clone)]
pub struct MetricsWindow {
    samples: VecDeque<MetricSample>,
    capacity: usize,
    /// Samples dropped to make room since the window was created
    evicted: u64,
}

/// Why a sample was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    pub latest: DateTime<Utc>,
}

impl MetricsWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    /// Append at the tail, evicting the oldest sample when full.
    ///
    /// A sample whose timestamp is not after the latest stored one is
    /// refused and the window is left untouched.
    pub fn push(&mut self, sample: MetricSample) -> Result<(), Rejected> {
        if let Some(latest) = self.samples.back().map(|s| s.timestamp) {
            if sample.timestamp <= latest {
                return Err(Rejected { latest });
            }
        }

        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
            self.evicted += 1;
        }
        self.samples.push_back(sample);
        Ok(())
    }

    /// Owned copy of the samples, oldest first
    pub fn snapshot(&self) -> Vec<MetricSample> {
        self.samples.iter().cloned().collect()
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.back().map(|s| s.timestamp)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats {
            samples: self.samples.len(),
            capacity: self.capacity,
            evicted: self.evicted,
            oldest: self.samples.front().map(|s| s.timestamp),
            newest: self.latest_timestamp(),
        }
    }
}

/// Window occupancy statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStats {
    pub samples: usize,
    pub capacity: usize,
    pub evicted: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}
