//! Cost delta between two tiers

use crate::catalog::SizeCatalog;
use crate::config::RecommendationConfig;
use crate::error::EngineResult;
use crate::models::{CostImpact, SizeTier};

/// Cost impact of moving from `current` to `recommended`.
///
/// Monthly and annual figures use fixed multipliers, not calendar lengths.
pub fn cost_impact(
    catalog: &SizeCatalog,
    config: &RecommendationConfig,
    current: SizeTier,
    recommended: SizeTier,
) -> EngineResult<CostImpact> {
    let current_daily_cost = catalog.cost_of(current)?;
    let recommended_daily_cost = catalog.cost_of(recommended)?;
    let daily_difference = recommended_daily_cost - current_daily_cost;
    let percentage_change = if current_daily_cost > 0.0 {
        daily_difference / current_daily_cost * 100.0
    } else {
        0.0
    };

    Ok(CostImpact {
        current_daily_cost,
        recommended_daily_cost,
        daily_difference,
        percentage_change,
        monthly_savings: -daily_difference * config.days_per_month,
        annual_savings: -daily_difference * config.days_per_year,
        is_increase: daily_difference > 0.0,
    })
}
