//! Recommendation engine
//!
//! Classifies an instance as under-, over- or optimally provisioned from its
//! [`ResourceSummary`] and prices the move through the size catalog.

pub mod cost;
pub mod fleet;
pub mod scheduler;

pub use fleet::{FleetRecommendations, FleetSummary, SkippedInstance};
pub use scheduler::{RecommendationRefresher, RefreshConfig, RefreshScheduler};

use crate::analyzer::{Dimension, DimensionSummary, ResourceSummary};
use crate::catalog::SizeCatalog;
use crate::config::RecommendationConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{Confidence, Recommendation, RecommendationType, SizeTier};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// What the engine needs to know about an instance to recommend for it
#[derive(Debug, Clone, Copy)]
pub struct InstanceProfile<'a> {
    pub name: &'a str,
    pub tier: SizeTier,
    pub launched_at: DateTime<Utc>,
}

pub struct RecommendationEngine {
    catalog: Arc<SizeCatalog>,
    config: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(catalog: Arc<SizeCatalog>, config: RecommendationConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &SizeCatalog {
        &self.catalog
    }

    /// Produce a recommendation, or `InsufficientMetrics` when the summary
    /// cannot be trusted yet.
    ///
    /// Precedence: any bottleneck upsizes; otherwise CPU and memory both
    /// underutilized downsizes; otherwise optimal. Running off either end of
    /// the catalog degrades to optimal.
    pub fn recommend(
        &self,
        instance: InstanceProfile<'_>,
        summary: &ResourceSummary,
        required_samples: usize,
        now: DateTime<Utc>,
    ) -> EngineResult<Recommendation> {
        if summary.insufficient_data {
            return Err(EngineError::InsufficientMetrics {
                instance: instance.name.to_string(),
                samples: summary.sample_count,
                required: required_samples,
            });
        }

        let current = instance.tier;
        let (recommended, recommendation_type, reasoning) = self.classify(current, summary)?;
        let cost_impact = cost::cost_impact(&self.catalog, &self.config, current, recommended)?;

        Ok(Recommendation {
            instance_name: instance.name.to_string(),
            current_tier: current,
            recommended_tier: recommended,
            recommendation_type,
            reasoning,
            confidence: self.confidence(now - instance.launched_at),
            cost_impact,
            samples_analyzed: summary.sample_count,
            analysis_period_hours: summary.analysis_period_hours(),
            generated_at: now,
        })
    }

    fn classify(
        &self,
        current: SizeTier,
        summary: &ResourceSummary,
    ) -> EngineResult<(SizeTier, RecommendationType, String)> {
        let bottlenecks = summary.bottlenecks();
        if !bottlenecks.is_empty() {
            let detail = describe(&bottlenecks);
            return match self.catalog.next_larger(current) {
                Ok(larger) => Ok((
                    larger,
                    RecommendationType::Upsize,
                    format!("Bottleneck on {detail}; upsizing {current} -> {larger}"),
                )),
                Err(EngineError::Boundary { .. }) => Ok((
                    current,
                    RecommendationType::Optimal,
                    format!("Already at maximum tier despite bottleneck on {detail}"),
                )),
                Err(e) => Err(e),
            };
        }

        if summary.cpu.underutilized && summary.memory.underutilized {
            let detail = describe(&[
                (Dimension::Cpu, &summary.cpu),
                (Dimension::Memory, &summary.memory),
            ]);
            return match self.catalog.next_smaller(current) {
                Ok(smaller) => Ok((
                    smaller,
                    RecommendationType::Downsize,
                    format!("Underutilized {detail}; downsizing {current} -> {smaller}"),
                )),
                Err(EngineError::Boundary { .. }) => Ok((
                    current,
                    RecommendationType::Optimal,
                    format!("Already at minimum tier despite underutilized {detail}"),
                )),
                Err(e) => Err(e),
            };
        }

        let detail = describe(&[
            (Dimension::Cpu, &summary.cpu),
            (Dimension::Memory, &summary.memory),
        ]);
        Ok((
            current,
            RecommendationType::Optimal,
            format!(
                "Utilization within range on {detail}; {} workload fits {current}",
                summary.workload_pattern
            ),
        ))
    }

    /// Confidence from how long the instance has been monitored
    pub fn confidence(&self, monitored: chrono::Duration) -> Confidence {
        let hours = monitored.num_seconds() as f64 / 3600.0;
        if hours < self.config.medium_confidence_hours {
            Confidence::Low
        } else if hours < self.config.high_confidence_hours {
            Confidence::Medium
        } else if hours < self.config.very_high_confidence_hours {
            Confidence::High
        } else {
            Confidence::VeryHigh
        }
    }
}

fn describe(dimensions: &[(Dimension, &DimensionSummary)]) -> String {
    dimensions
        .iter()
        .map(|(dim, s)| {
            format!(
                "{dim} (avg {:.1}%, peak {:.1}%, p95 {:.1}%)",
                s.average, s.peak, s.p95
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
