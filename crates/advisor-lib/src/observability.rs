//! Observability infrastructure for the advisor engine
//!
//! Provides:
//! - Prometheus metrics (ingestion, analysis latency, transitions, idle actions, savings)
//! - Structured JSON logging with tracing

use crate::models::{LifecycleAction, LifecycleState, Recommendation};
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for summarize + recommend latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    samples_ingested: IntCounter,
    samples_rejected: IntCounter,
    instances_monitored: IntGauge,
    recommendations_generated: IntCounterVec,
    analysis_latency_seconds: Histogram,
    transitions: IntCounterVec,
    hibernate_fallbacks: IntCounter,
    idle_actions: IntCounterVec,
    potential_monthly_savings: Gauge,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            samples_ingested: register_int_counter!(
                "workstation_advisor_samples_ingested_total",
                "Utilization samples accepted into metrics windows"
            )
            .expect("Failed to register samples_ingested"),

            samples_rejected: register_int_counter!(
                "workstation_advisor_samples_rejected_total",
                "Utilization samples rejected as out of order"
            )
            .expect("Failed to register samples_rejected"),

            instances_monitored: register_int_gauge!(
                "workstation_advisor_instances_monitored",
                "Number of instances currently registered with the engine"
            )
            .expect("Failed to register instances_monitored"),

            recommendations_generated: register_int_counter_vec!(
                "workstation_advisor_recommendations_generated_total",
                "Sizing recommendations generated, by type",
                &["type"]
            )
            .expect("Failed to register recommendations_generated"),

            analysis_latency_seconds: register_histogram!(
                "workstation_advisor_analysis_latency_seconds",
                "Time spent summarizing a window and producing a recommendation",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_latency_seconds"),

            transitions: register_int_counter_vec!(
                "workstation_advisor_transitions_total",
                "Lifecycle transitions requested, by action and outcome",
                &["action", "outcome"]
            )
            .expect("Failed to register transitions"),

            hibernate_fallbacks: register_int_counter!(
                "workstation_advisor_hibernate_fallbacks_total",
                "Hibernate requests that were carried out as stop"
            )
            .expect("Failed to register hibernate_fallbacks"),

            idle_actions: register_int_counter_vec!(
                "workstation_advisor_idle_actions_total",
                "Actions fired by idle policies, by performed action",
                &["action"]
            )
            .expect("Failed to register idle_actions"),

            potential_monthly_savings: register_gauge!(
                "workstation_advisor_potential_monthly_savings",
                "Fleet-wide monthly savings available from downsize recommendations"
            )
            .expect("Failed to register potential_monthly_savings"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics").finish_non_exhaustive()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn inc_samples_ingested(&self) {
        self.inner().samples_ingested.inc();
    }

    pub fn inc_samples_rejected(&self) {
        self.inner().samples_rejected.inc();
    }

    pub fn set_instances_monitored(&self, count: usize) {
        self.inner().instances_monitored.set(count as i64);
    }

    pub fn record_recommendation(&self, recommendation: &Recommendation) {
        let label = recommendation.recommendation_type.to_string();
        self.inner()
            .recommendations_generated
            .with_label_values(&[label.as_str()])
            .inc();
    }

    pub fn observe_analysis_latency(&self, duration_secs: f64) {
        self.inner().analysis_latency_seconds.observe(duration_secs);
    }

    /// Count a transition; `outcome` is "ok", "no_op" or an error code
    pub fn record_transition(&self, action: LifecycleAction, outcome: &str) {
        self.inner()
            .transitions
            .with_label_values(&[action.as_str(), outcome])
            .inc();
    }

    pub fn inc_hibernate_fallbacks(&self) {
        self.inner().hibernate_fallbacks.inc();
    }

    pub fn inc_idle_actions(&self, performed: LifecycleAction) {
        self.inner()
            .idle_actions
            .with_label_values(&[performed.as_str()])
            .inc();
    }

    pub fn set_potential_monthly_savings(&self, amount: f64) {
        self.inner().potential_monthly_savings.set(amount);
    }
}

/// Structured logger for engine events
///
/// Every event carries an `event` field and the fleet name so log
/// pipelines can filter on them.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    fleet: String,
}

impl StructuredLogger {
    pub fn new(fleet: impl Into<String>) -> Self {
        Self {
            fleet: fleet.into(),
        }
    }

    pub fn fleet(&self) -> &str {
        &self.fleet
    }

    /// Log a generated sizing recommendation
    pub fn log_recommendation(&self, recommendation: &Recommendation) {
        info!(
            event = "recommendation_generated",
            fleet = %self.fleet,
            instance = %recommendation.instance_name,
            current_tier = %recommendation.current_tier,
            recommended_tier = %recommendation.recommended_tier,
            recommendation_type = %recommendation.recommendation_type,
            confidence = %recommendation.confidence,
            daily_difference = recommendation.cost_impact.daily_difference,
            samples = recommendation.samples_analyzed,
            "Generated sizing recommendation"
        );
    }

    /// Log a completed lifecycle transition
    pub fn log_transition(
        &self,
        instance: &str,
        requested: LifecycleAction,
        performed: LifecycleAction,
        previous: LifecycleState,
        new_state: LifecycleState,
        no_op: bool,
    ) {
        info!(
            event = "transition_completed",
            fleet = %self.fleet,
            instance = %instance,
            requested = %requested,
            performed = %performed,
            previous_state = %previous,
            new_state = %new_state,
            no_op = no_op,
            "Lifecycle transition completed"
        );
    }

    /// Log a hibernate request carried out as stop
    pub fn log_hibernate_fallback(&self, instance: &str, instance_type: &str, reason: &str) {
        warn!(
            event = "hibernate_fallback",
            fleet = %self.fleet,
            instance = %instance,
            instance_type = %instance_type,
            reason = %reason,
            "Hibernation unavailable, stopping instead"
        );
    }

    /// Log an action fired by an idle policy
    pub fn log_idle_action(
        &self,
        instance: &str,
        policy: &str,
        performed: LifecycleAction,
        idle_minutes: i64,
        fallback_applied: bool,
    ) {
        info!(
            event = "idle_action_fired",
            fleet = %self.fleet,
            instance = %instance,
            policy = %policy,
            action = %performed,
            idle_minutes = idle_minutes,
            fallback_applied = fallback_applied,
            "Idle policy triggered lifecycle action"
        );
    }

    /// Log a dropped telemetry sample
    pub fn log_sample_rejected(&self, instance: &str, reason: &str) {
        warn!(
            event = "sample_rejected",
            fleet = %self.fleet,
            instance = %instance,
            reason = %reason,
            "Dropped utilization sample"
        );
    }

    /// Log the outcome of a periodic recommendation refresh
    pub fn log_refresh_cycle(&self, refreshed: usize, insufficient: usize, failed: usize) {
        if failed == 0 {
            info!(
                event = "refresh_cycle",
                fleet = %self.fleet,
                refreshed = refreshed,
                insufficient = insufficient,
                failed = failed,
                "Recommendation refresh completed"
            );
        } else {
            warn!(
                event = "refresh_cycle",
                fleet = %self.fleet,
                refreshed = refreshed,
                insufficient = insufficient,
                failed = failed,
                "Recommendation refresh completed with failures"
            );
        }
    }

    /// Log engine startup
    pub fn log_startup(&self, version: &str, instances: usize) {
        info!(
            event = "engine_started",
            fleet = %self.fleet,
            version = %version,
            instances = instances,
            "Workstation advisor engine started"
        );
    }

    /// Log engine shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            fleet = %self.fleet,
            reason = %reason,
            "Workstation advisor engine shutting down"
        );
    }
}
