//! Core data models for the workstation advisor

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Utilization sample pushed by a telemetry collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    /// CPU utilization percentage (0-100)
    pub cpu_percent: f64,
    /// Memory utilization percentage (0-100)
    pub memory_percent: f64,
    /// Disk utilization percentage (0-100)
    pub disk_percent: f64,
    /// Network throughput, bytes/sec in + out
    pub network_bytes_per_sec: f64,
    /// GPU utilization percentage, when the instance has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_percent: Option<f64>,
}

impl MetricSample {
    /// Reject percentages outside 0-100 and negative or non-finite throughput
    pub fn validate(&self) -> EngineResult<()> {
        let percentages = [
            ("cpu_percent", Some(self.cpu_percent)),
            ("memory_percent", Some(self.memory_percent)),
            ("disk_percent", Some(self.disk_percent)),
            ("gpu_percent", self.gpu_percent),
        ];
        for (field, value) in percentages {
            if let Some(value) = value {
                if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                    return Err(EngineError::InvalidInput(format!(
                        "{field} must be within 0-100, got {value}"
                    )));
                }
            }
        }
        let network = self.network_bytes_per_sec;
        if !network.is_finite() || network < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "network_bytes_per_sec must be non-negative, got {network}"
            )));
        }
        Ok(())
    }
}

/// Abstract size class decoupling user-facing sizing from concrete instance types
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SizeTier {
    XS,
    S,
    M,
    L,
    XL,
}

impl SizeTier {
    pub const ALL: [SizeTier; 5] = [
        SizeTier::XS,
        SizeTier::S,
        SizeTier::M,
        SizeTier::L,
        SizeTier::XL,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeTier::XS => "XS",
            SizeTier::S => "S",
            SizeTier::M => "M",
            SizeTier::L => "L",
            SizeTier::XL => "XL",
        }
    }
}

impl fmt::Display for SizeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a monitored instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Hibernating,
    Hibernated,
    Resuming,
    Terminated,
}

impl LifecycleState {
    /// States an instance passes through while a provider call is in flight
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            LifecycleState::Starting
                | LifecycleState::Stopping
                | LifecycleState::Hibernating
                | LifecycleState::Resuming
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Hibernating => "hibernating",
            LifecycleState::Hibernated => "hibernated",
            LifecycleState::Resuming => "resuming",
            LifecycleState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition a caller can request from the lifecycle state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Start,
    Stop,
    Hibernate,
    Resume,
    Terminate,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Hibernate => "hibernate",
            LifecycleAction::Resume => "resume",
            LifecycleAction::Terminate => "terminate",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a sizing recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationType {
    Optimal,
    Downsize,
    Upsize,
}

impl fmt::Display for RecommendationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendationType::Optimal => write!(f, "optimal"),
            RecommendationType::Downsize => write!(f, "downsize"),
            RecommendationType::Upsize => write!(f, "upsize"),
        }
    }
}

/// Confidence derived from how long the instance has been monitored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
            Confidence::VeryHigh => write!(f, "very_high"),
        }
    }
}

/// Cost delta between the current and the recommended tier
///
/// Savings fields are positive when the recommendation saves money and
/// negative when it adds cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostImpact {
    pub current_daily_cost: f64,
    pub recommended_daily_cost: f64,
    /// Recommended minus current; negative for a downsize
    pub daily_difference: f64,
    pub percentage_change: f64,
    pub monthly_savings: f64,
    pub annual_savings: f64,
    pub is_increase: bool,
}

/// Sizing recommendation for one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub instance_name: String,
    pub current_tier: SizeTier,
    pub recommended_tier: SizeTier,
    pub recommendation_type: RecommendationType,
    pub reasoning: String,
    pub confidence: Confidence,
    pub cost_impact: CostImpact,
    pub samples_analyzed: usize,
    pub analysis_period_hours: f64,
    pub generated_at: DateTime<Utc>,
}

/// Result of a lifecycle transition request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub instance_name: String,
    pub requested: LifecycleAction,
    /// Action actually carried out; differs from `requested` when a fallback applied
    pub performed: LifecycleAction,
    pub previous_state: LifecycleState,
    pub new_state: LifecycleState,
    pub fallback_applied: bool,
    /// True when the instance was already in the target state
    pub no_op: bool,
}

/// Point-in-time view of a monitored instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub name: String,
    pub instance_type: String,
    pub tier: SizeTier,
    pub state: LifecycleState,
    pub launched_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_policy: Option<crate::idle::IdlePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    pub samples_stored: usize,
}

/// Registration request for a new instance to monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRegistration {
    pub name: String,
    pub instance_type: String,
    #[serde(default = "Utc::now")]
    pub launched_at: DateTime<Utc>,
    #[serde(default = "default_initial_state")]
    pub initial_state: LifecycleState,
}

fn default_initial_state() -> LifecycleState {
    LifecycleState::Pending
}
