//! Fleet-wide aggregation of per-instance recommendations

use crate::analyzer::ResourceSummary;
use crate::config::AnalyzerThresholds;
use crate::error::EngineError;
use crate::models::{Confidence, Recommendation, RecommendationType};
use serde::{Deserialize, Serialize};

/// Instance left out of a fleet listing, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedInstance {
    pub instance_name: String,
    pub code: String,
    pub reason: String,
    pub retryable: bool,
}

impl SkippedInstance {
    pub fn from_error(instance_name: &str, err: &EngineError) -> Self {
        Self {
            instance_name: instance_name.to_string(),
            code: err.code().to_string(),
            reason: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Aggregate view over the fleet's recommendations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub analyzed: usize,
    pub skipped: usize,
    pub optimal: usize,
    pub downsize: usize,
    pub upsize: usize,
    pub low_confidence: usize,
    pub medium_confidence: usize,
    pub high_confidence: usize,
    pub very_high_confidence: usize,
    pub total_current_daily_cost: f64,
    /// Savings from downsize recommendations only
    pub potential_monthly_savings: f64,
    pub potential_annual_savings: f64,
    /// Instances whose average CPU sits below the underutilized average
    pub low_cpu_instances: usize,
    /// Instances whose CPU p95 sits above the bottleneck average
    pub high_cpu_instances: usize,
}

impl FleetSummary {
    pub fn build(
        results: &[(Recommendation, ResourceSummary)],
        skipped: usize,
        thresholds: &AnalyzerThresholds,
    ) -> Self {
        let mut summary = FleetSummary {
            analyzed: results.len(),
            skipped,
            ..Default::default()
        };

        for (rec, usage) in results {
            match rec.recommendation_type {
                RecommendationType::Optimal => summary.optimal += 1,
                RecommendationType::Downsize => {
                    summary.downsize += 1;
                    summary.potential_monthly_savings += rec.cost_impact.monthly_savings;
                    summary.potential_annual_savings += rec.cost_impact.annual_savings;
                }
                RecommendationType::Upsize => summary.upsize += 1,
            }
            match rec.confidence {
                Confidence::Low => summary.low_confidence += 1,
                Confidence::Medium => summary.medium_confidence += 1,
                Confidence::High => summary.high_confidence += 1,
                Confidence::VeryHigh => summary.very_high_confidence += 1,
            }
            summary.total_current_daily_cost += rec.cost_impact.current_daily_cost;

            if usage.cpu.average < thresholds.underutilized_average {
                summary.low_cpu_instances += 1;
            }
            if usage.cpu.p95 > thresholds.bottleneck_average {
                summary.high_cpu_instances += 1;
            }
        }

        summary
    }
}

/// Result of listing recommendations for every instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetRecommendations {
    pub recommendations: Vec<Recommendation>,
    pub skipped: Vec<SkippedInstance>,
    pub summary: FleetSummary,
}
