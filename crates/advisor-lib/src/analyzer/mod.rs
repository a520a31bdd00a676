//! Resource analyzer
//!
//! Turns a window of samples into per-dimension statistics and
//! bottleneck/underutilization flags. Summaries are derived on every read
//! and never stored.

pub mod stats;

pub use stats::WorkloadPattern;

use crate::config::AnalyzerThresholds;
use crate::models::MetricSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource dimension tracked by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Cpu,
    Memory,
    Disk,
    Network,
    Gpu,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Cpu => write!(f, "CPU"),
            Dimension::Memory => write!(f, "memory"),
            Dimension::Disk => write!(f, "disk"),
            Dimension::Network => write!(f, "network"),
            Dimension::Gpu => write!(f, "GPU"),
        }
    }
}

/// Statistics for one dimension, in percent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionSummary {
    pub average: f64,
    pub peak: f64,
    pub p95: f64,
    pub p99: f64,
    pub bottleneck: bool,
    pub underutilized: bool,
}

impl DimensionSummary {
    fn from_values(values: &[f64], thresholds: &AnalyzerThresholds) -> Self {
        let average = stats::mean(values);
        let peak = stats::max(values);
        let bottleneck =
            average > thresholds.bottleneck_average || peak > thresholds.bottleneck_peak;
        // Flags are exclusive; a bottleneck always wins.
        let underutilized = !bottleneck
            && average < thresholds.underutilized_average
            && peak < thresholds.underutilized_peak;

        Self {
            average,
            peak,
            p95: stats::percentile(values, 95.0),
            p99: stats::percentile(values, 99.0),
            bottleneck,
            underutilized,
        }
    }
}

/// Rolling utilization summary for one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub sample_count: usize,
    /// Set when the window held fewer than the minimum sample count; every
    /// other field is zeroed and must not be trusted
    pub insufficient_data: bool,
    pub cpu: DimensionSummary,
    pub memory: DimensionSummary,
    pub disk: DimensionSummary,
    /// Network load as a percentage of the reference throughput
    pub network: DimensionSummary,
    pub network_average_bytes_per_sec: f64,
    pub network_peak_bytes_per_sec: f64,
    /// Present when at least one sample carried a GPU reading
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<DimensionSummary>,
    pub workload_pattern: WorkloadPattern,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

impl ResourceSummary {
    fn insufficient(sample_count: usize, samples: &[MetricSample]) -> Self {
        Self {
            sample_count,
            insufficient_data: true,
            cpu: DimensionSummary::default(),
            memory: DimensionSummary::default(),
            disk: DimensionSummary::default(),
            network: DimensionSummary::default(),
            network_average_bytes_per_sec: 0.0,
            network_peak_bytes_per_sec: 0.0,
            gpu: None,
            workload_pattern: WorkloadPattern::Steady,
            window_start: samples.first().map(|s| s.timestamp),
            window_end: samples.last().map(|s| s.timestamp),
        }
    }

    /// Span between the first and last sample, in hours
    pub fn analysis_period_hours(&self) -> f64 {
        match (self.window_start, self.window_end) {
            (Some(start), Some(end)) => (end - start).num_seconds() as f64 / 3600.0,
            _ => 0.0,
        }
    }

    /// All summarised dimensions in a fixed order
    pub fn dimensions(&self) -> Vec<(Dimension, &DimensionSummary)> {
        let mut dims = vec![
            (Dimension::Cpu, &self.cpu),
            (Dimension::Memory, &self.memory),
            (Dimension::Disk, &self.disk),
            (Dimension::Network, &self.network),
        ];
        if let Some(gpu) = &self.gpu {
            dims.push((Dimension::Gpu, gpu));
        }
        dims
    }

    /// Dimensions flagged as bottlenecks
    pub fn bottlenecks(&self) -> Vec<(Dimension, &DimensionSummary)> {
        self.dimensions()
            .into_iter()
            .filter(|(_, d)| d.bottleneck)
            .collect()
    }
}

/// Computes [`ResourceSummary`] values from sample windows
#[derive(Debug, Clone)]
pub struct ResourceAnalyzer {
    thresholds: AnalyzerThresholds,
}

impl ResourceAnalyzer {
    pub fn new(thresholds: AnalyzerThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AnalyzerThresholds {
        &self.thresholds
    }

    /// Summarize a window of samples ordered oldest first
    pub fn summarize(&self, samples: &[MetricSample]) -> ResourceSummary {
        if samples.len() < self.thresholds.min_samples {
            return ResourceSummary::insufficient(samples.len(), samples);
        }

        let cpu: Vec<f64> = samples.iter().map(|s| s.cpu_percent).collect();
        let memory: Vec<f64> = samples.iter().map(|s| s.memory_percent).collect();
        let disk: Vec<f64> = samples.iter().map(|s| s.disk_percent).collect();
        let network_bytes: Vec<f64> = samples.iter().map(|s| s.network_bytes_per_sec).collect();
        let reference = self.thresholds.network_reference_bytes_per_sec;
        let network_pct: Vec<f64> = network_bytes
            .iter()
            .map(|b| b / reference * 100.0)
            .collect();
        let gpu: Vec<f64> = samples.iter().filter_map(|s| s.gpu_percent).collect();

        ResourceSummary {
            sample_count: samples.len(),
            insufficient_data: false,
            cpu: DimensionSummary::from_values(&cpu, &self.thresholds),
            memory: DimensionSummary::from_values(&memory, &self.thresholds),
            disk: DimensionSummary::from_values(&disk, &self.thresholds),
            network: DimensionSummary::from_values(&network_pct, &self.thresholds),
            network_average_bytes_per_sec: stats::mean(&network_bytes),
            network_peak_bytes_per_sec: stats::max(&network_bytes),
            gpu: (!gpu.is_empty()).then(|| DimensionSummary::from_values(&gpu, &self.thresholds)),
            workload_pattern: WorkloadPattern::classify(&cpu),
            window_start: samples.first().map(|s| s.timestamp),
            window_end: samples.last().map(|s| s.timestamp),
        }
    }
}

impl Default for ResourceAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerThresholds::default())
    }
}
