//! Size catalog
//!
//! Read-only mapping between abstract tiers and concrete instance types,
//! with the resources and list price behind each tier.

use crate::error::{Boundary, EngineError, EngineResult};
use crate::models::SizeTier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const HOURS_PER_DAY: f64 = 24.0;

/// Resources and price of one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeSpec {
    pub tier: SizeTier,
    /// Canonical concrete instance type for the tier
    pub instance_type: String,
    /// Other concrete types that map onto this tier
    #[serde(default)]
    pub aliases: Vec<String>,
    pub vcpus: u32,
    pub memory_gb: u32,
    pub storage_gb: u32,
    pub hourly_cost: f64,
    pub network_performance: String,
}

impl SizeSpec {
    pub fn daily_cost(&self) -> f64 {
        self.hourly_cost * HOURS_PER_DAY
    }
}

fn spec(
    tier: SizeTier,
    instance_type: &str,
    aliases: &[&str],
    vcpus: u32,
    memory_gb: u32,
    storage_gb: u32,
    hourly_cost: f64,
    network_performance: &str,
) -> SizeSpec {
    SizeSpec {
        tier,
        instance_type: instance_type.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
        vcpus,
        memory_gb,
        storage_gb,
        hourly_cost,
        network_performance: network_performance.to_string(),
    }
}

/// Built-in ARM-first catalog with x86 burstable aliases
pub fn default_specs() -> Vec<SizeSpec> {
    vec![
        spec(
            SizeTier::XS,
            "t4g.nano",
            &["t4g.micro", "t3.nano", "t3.micro", "t3a.nano", "t3a.micro"],
            1,
            2,
            20,
            0.021,
            "Low",
        ),
        spec(
            SizeTier::S,
            "t4g.small",
            &["t3.small", "t3a.small"],
            2,
            4,
            30,
            0.042,
            "Low to Moderate",
        ),
        spec(
            SizeTier::M,
            "t4g.medium",
            &["t3.medium", "t3a.medium"],
            2,
            8,
            50,
            0.084,
            "Moderate",
        ),
        spec(
            SizeTier::L,
            "t4g.large",
            &["t3.large", "t3a.large"],
            4,
            16,
            100,
            0.168,
            "High",
        ),
        spec(
            SizeTier::XL,
            "t4g.xlarge",
            &["t4g.2xlarge", "t3.xlarge", "t3.2xlarge", "t3a.xlarge", "t3a.2xlarge"],
            8,
            32,
            200,
            0.336,
            "High",
        ),
    ]
}

/// Validated, immutable size catalog
#[derive(Debug, Clone)]
pub struct SizeCatalog {
    specs: BTreeMap<SizeTier, SizeSpec>,
    by_type: HashMap<String, SizeTier>,
}

impl SizeCatalog {
    pub fn builtin() -> Self {
        // The built-in table satisfies every check in from_specs.
        Self::index(default_specs())
    }

    /// Build a catalog, rejecting tables that break ordering or uniqueness.
    ///
    /// Tiers must be listed in ascending order with strictly increasing
    /// cost, and no concrete type may belong to two tiers.
    pub fn from_specs(specs: Vec<SizeSpec>) -> EngineResult<Self> {
        if specs.is_empty() {
            return Err(EngineError::Config("size catalog is empty".to_string()));
        }
        for pair in specs.windows(2) {
            if pair[0].tier >= pair[1].tier {
                return Err(EngineError::Config(format!(
                    "size catalog tiers out of order: {} listed before {}",
                    pair[0].tier, pair[1].tier
                )));
            }
            if pair[0].hourly_cost >= pair[1].hourly_cost {
                return Err(EngineError::Config(format!(
                    "size catalog cost must increase with tier: {} costs {} and {} costs {}",
                    pair[0].tier, pair[0].hourly_cost, pair[1].tier, pair[1].hourly_cost
                )));
            }
        }

        let mut seen: HashMap<&str, SizeTier> = HashMap::new();
        for s in &specs {
            for name in std::iter::once(&s.instance_type).chain(s.aliases.iter()) {
                if let Some(other) = seen.insert(name.as_str(), s.tier) {
                    return Err(EngineError::Config(format!(
                        "instance type {name} claimed by both {other} and {}",
                        s.tier
                    )));
                }
            }
        }

        Ok(Self::index(specs))
    }

    fn index(specs: Vec<SizeSpec>) -> Self {
        let mut by_type = HashMap::new();
        for s in &specs {
            by_type.insert(s.instance_type.clone(), s.tier);
            for alias in &s.aliases {
                by_type.insert(alias.clone(), s.tier);
            }
        }
        Self {
            specs: specs.into_iter().map(|s| (s.tier, s)).collect(),
            by_type,
        }
    }

    pub fn spec_of(&self, tier: SizeTier) -> EngineResult<&SizeSpec> {
        self.specs.get(&tier).ok_or(EngineError::UnknownTier(tier))
    }

    /// Daily cost of a tier
    pub fn cost_of(&self, tier: SizeTier) -> EngineResult<f64> {
        self.spec_of(tier).map(SizeSpec::daily_cost)
    }

    /// Tier of a concrete instance type (canonical or alias)
    pub fn tier_of(&self, instance_type: &str) -> EngineResult<SizeTier> {
        self.by_type
            .get(instance_type)
            .copied()
            .ok_or_else(|| EngineError::UnknownInstanceType(instance_type.to_string()))
    }

    /// Canonical concrete instance type of a tier
    pub fn instance_type_of(&self, tier: SizeTier) -> EngineResult<&str> {
        self.spec_of(tier).map(|s| s.instance_type.as_str())
    }

    pub fn next_larger(&self, tier: SizeTier) -> EngineResult<SizeTier> {
        self.spec_of(tier)?;
        self.specs
            .range((std::ops::Bound::Excluded(tier), std::ops::Bound::Unbounded))
            .next()
            .map(|(t, _)| *t)
            .ok_or(EngineError::Boundary {
                tier,
                boundary: Boundary::Largest,
            })
    }

    pub fn next_smaller(&self, tier: SizeTier) -> EngineResult<SizeTier> {
        self.spec_of(tier)?;
        self.specs
            .range(..tier)
            .next_back()
            .map(|(t, _)| *t)
            .ok_or(EngineError::Boundary {
                tier,
                boundary: Boundary::Smallest,
            })
    }

    /// Tiers in ascending order
    pub fn tiers(&self) -> impl Iterator<Item = SizeTier> + '_ {
        self.specs.keys().copied()
    }

    pub fn specs(&self) -> impl Iterator<Item = &SizeSpec> {
        self.specs.values()
    }
}

impl Default for SizeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
