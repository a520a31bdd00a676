//! Engine configuration
//!
//! Every tunable threshold of the analyzer and recommendation engine lives
//! here so callers and tests share a single source of truth.

use crate::catalog::{default_specs, SizeSpec};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default metrics window capacity (about 33 hours at a 2-minute cadence)
pub const DEFAULT_WINDOW_CAPACITY: usize = 1000;

/// Minimum samples before a summary is trusted (about 1 hour at a 2-minute cadence)
pub const DEFAULT_MIN_SAMPLES: usize = 30;

/// Reference network throughput used to express network load as a percentage (1 Gbit/s)
pub const DEFAULT_NETWORK_REFERENCE_BYTES_PER_SEC: f64 = 125_000_000.0;

/// Default provider call timeout
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub thresholds: AnalyzerThresholds,
    pub recommendation: RecommendationConfig,
    pub lifecycle: LifecycleConfig,
    pub idle: IdleConfig,
    pub catalog: Vec<SizeSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            thresholds: AnalyzerThresholds::default(),
            recommendation: RecommendationConfig::default(),
            lifecycle: LifecycleConfig::default(),
            idle: IdleConfig::default(),
            catalog: default_specs(),
        }
    }
}

impl EngineConfig {
    /// Reject configurations that would break engine invariants
    pub fn validate(&self) -> EngineResult<()> {
        if self.store.window_capacity == 0 {
            return Err(EngineError::Config(
                "store.window_capacity must be greater than zero".to_string(),
            ));
        }
        self.thresholds.validate()?;
        self.recommendation.validate()?;
        if self.lifecycle.provider_timeout_secs == 0 {
            return Err(EngineError::Config(
                "lifecycle.provider_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.idle.history_capacity == 0 {
            return Err(EngineError::Config(
                "idle.history_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Metrics store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum samples kept per instance
    pub window_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
        }
    }
}

/// Classification thresholds for the resource analyzer (percentages)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerThresholds {
    /// Bottleneck when the average exceeds this
    pub bottleneck_average: f64,
    /// Bottleneck when the peak exceeds this
    pub bottleneck_peak: f64,
    /// Underutilized requires the average below this...
    pub underutilized_average: f64,
    /// ...and the peak below this
    pub underutilized_peak: f64,
    /// Minimum samples before the summary is considered trustworthy
    pub min_samples: usize,
    /// Throughput treated as 100% network utilization
    pub network_reference_bytes_per_sec: f64,
}

impl Default for AnalyzerThresholds {
    fn default() -> Self {
        Self {
            bottleneck_average: 80.0,
            bottleneck_peak: 95.0,
            underutilized_average: 20.0,
            underutilized_peak: 40.0,
            min_samples: DEFAULT_MIN_SAMPLES,
            network_reference_bytes_per_sec: DEFAULT_NETWORK_REFERENCE_BYTES_PER_SEC,
        }
    }
}

impl AnalyzerThresholds {
    pub fn validate(&self) -> EngineResult<()> {
        let pct = [
            ("bottleneck_average", self.bottleneck_average),
            ("bottleneck_peak", self.bottleneck_peak),
            ("underutilized_average", self.underutilized_average),
            ("underutilized_peak", self.underutilized_peak),
        ];
        for (name, value) in pct {
            if !(0.0..=100.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "thresholds.{name} must be within 0-100, got {value}"
                )));
            }
        }
        // The underutilized band must sit strictly below both bottleneck triggers,
        // otherwise a dimension could carry both flags.
        if self.underutilized_peak > self.bottleneck_average
            || self.underutilized_peak > self.bottleneck_peak
        {
            return Err(EngineError::Config(format!(
                "thresholds.underutilized_peak ({}) overlaps the bottleneck band",
                self.underutilized_peak
            )));
        }
        if self.underutilized_average > self.underutilized_peak {
            return Err(EngineError::Config(
                "thresholds.underutilized_average must not exceed underutilized_peak".to_string(),
            ));
        }
        if self.min_samples == 0 {
            return Err(EngineError::Config(
                "thresholds.min_samples must be greater than zero".to_string(),
            ));
        }
        if self.network_reference_bytes_per_sec <= 0.0 {
            return Err(EngineError::Config(
                "thresholds.network_reference_bytes_per_sec must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Recommendation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Below this many monitored hours confidence is Low
    pub medium_confidence_hours: f64,
    /// Below this many monitored hours confidence is Medium
    pub high_confidence_hours: f64,
    /// Below this many monitored hours confidence is High, VeryHigh after
    pub very_high_confidence_hours: f64,
    /// Fixed month length used to project daily cost deltas
    pub days_per_month: f64,
    /// Fixed year length used to project daily cost deltas
    pub days_per_year: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            medium_confidence_hours: 1.0,
            high_confidence_hours: 24.0,
            very_high_confidence_hours: 168.0,
            days_per_month: 30.0,
            days_per_year: 365.0,
        }
    }
}

impl RecommendationConfig {
    fn validate(&self) -> EngineResult<()> {
        if !(self.medium_confidence_hours < self.high_confidence_hours
            && self.high_confidence_hours < self.very_high_confidence_hours)
        {
            return Err(EngineError::Config(
                "recommendation confidence horizons must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle state machine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on any single cloud provider call
    pub provider_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT.as_secs(),
        }
    }
}

impl LifecycleConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Idle policy evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Maximum idle actions kept in the history log
    pub history_capacity: usize,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            history_capacity: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.window_capacity, 1000);
        assert_eq!(config.thresholds.min_samples, 30);
        assert_eq!(config.catalog.len(), 5);
    }

    #[test]
    fn test_overlapping_bands_rejected() {
        let mut config = EngineConfig::default();
        config.thresholds.underutilized_peak = 85.0;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = EngineConfig::default();
        config.store.window_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"thresholds":{"bottleneck_average":75.0}}"#).unwrap();
        assert_eq!(config.thresholds.bottleneck_average, 75.0);
        assert_eq!(config.thresholds.bottleneck_peak, 95.0);
        assert_eq!(config.store.window_capacity, DEFAULT_WINDOW_CAPACITY);
    }
}
