//! Descriptive statistics over one resource dimension

use serde::{Deserialize, Serialize};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

pub fn min(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Percentile by linear interpolation at rank `p/100 * (n - 1)` of the sorted values
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Sample variance
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    sum_sq / (values.len() - 1) as f64
}

/// Shape of CPU demand over the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadPattern {
    Steady,
    Variable,
    Bursty,
}

impl WorkloadPattern {
    /// Classify by range relative to the mean: `(max - min) / max(mean, 1)`
    pub fn classify(values: &[f64]) -> Self {
        if values.is_empty() {
            return WorkloadPattern::Steady;
        }
        let variability = (max(values) - min(values)) / mean(values).max(1.0);
        if variability < 0.5 {
            WorkloadPattern::Steady
        } else if variability < 1.5 {
            WorkloadPattern::Variable
        } else {
            WorkloadPattern::Bursty
        }
    }
}

impl std::fmt::Display for WorkloadPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadPattern::Steady => write!(f, "steady"),
            WorkloadPattern::Variable => write!(f, "variable"),
            WorkloadPattern::Bursty => write!(f, "bursty"),
        }
    }
}
