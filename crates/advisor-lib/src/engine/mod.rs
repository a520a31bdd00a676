//! Advisor engine
//!
//! Registry of monitored instances and the operations exposed to callers.
//! Entries are `Arc`s in a sharded map; every operation clones the entry it
//! needs and releases the map before awaiting, so fleet-wide listings never
//! hold a lock across instances.

mod instance;

use crate::analyzer::{ResourceAnalyzer, ResourceSummary};
use crate::catalog::SizeCatalog;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::health::HealthRegistry;
use crate::idle::{
    EvaluatorContext, IdleDecision, IdleEvaluator, IdleEvent, IdleHistory, IdlePolicy,
};
use crate::lifecycle::{CloudProvider, LifecycleStateMachine};
use crate::models::{
    InstanceRegistration, InstanceSnapshot, LifecycleAction, LifecycleState, MetricSample,
    Recommendation, TransitionOutcome,
};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::recommender::{
    FleetRecommendations, FleetSummary, InstanceProfile, RecommendationEngine, SkippedInstance,
};
use crate::store::MetricsStore;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use instance::{ManagedInstance, PolicyAssignment};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of one recommendation refresh pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshReport {
    pub attempted: usize,
    pub refreshed: usize,
    pub insufficient: usize,
    pub failed: Vec<SkippedInstance>,
    pub potential_monthly_savings: f64,
    /// Samples accepted since the previous refresh
    pub samples_accepted: u64,
    /// Samples rejected since the previous refresh
    pub samples_rejected: u64,
}

/// Ingest outcomes since the last refresh
#[derive(Debug, Default)]
struct IngestCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl IngestCounters {
    fn take(&self) -> (u64, u64) {
        (
            self.accepted.swap(0, Ordering::Relaxed),
            self.rejected.swap(0, Ordering::Relaxed),
        )
    }
}

pub struct AdvisorEngine {
    config: EngineConfig,
    store: MetricsStore,
    analyzer: ResourceAnalyzer,
    recommender: RecommendationEngine,
    provider: Arc<dyn CloudProvider>,
    clock: Arc<dyn Clock>,
    instances: DashMap<String, Arc<ManagedInstance>>,
    history: Arc<IdleHistory>,
    ingest: IngestCounters,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl AdvisorEngine {
    /// Build an engine from validated configuration
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn CloudProvider>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        Self::with_logger(config, provider, clock, StructuredLogger::new("default"))
    }

    pub fn with_logger(
        config: EngineConfig,
        provider: Arc<dyn CloudProvider>,
        clock: Arc<dyn Clock>,
        logger: StructuredLogger,
    ) -> EngineResult<Self> {
        config.validate()?;
        let catalog = Arc::new(SizeCatalog::from_specs(config.catalog.clone())?);

        Ok(Self {
            store: MetricsStore::new(config.store.window_capacity),
            analyzer: ResourceAnalyzer::new(config.thresholds.clone()),
            recommender: RecommendationEngine::new(catalog, config.recommendation.clone()),
            history: Arc::new(IdleHistory::new(config.idle.history_capacity)),
            provider,
            clock,
            instances: DashMap::new(),
            ingest: IngestCounters::default(),
            metrics: EngineMetrics::new(),
            logger,
            health: None,
            config,
        })
    }

    /// Feed lifecycle and idle evaluator failures into `health`.
    /// Applies to instances registered afterwards.
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SizeCatalog {
        self.recommender.catalog()
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    fn get(&self, name: &str) -> EngineResult<Arc<ManagedInstance>> {
        self.instances
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::UnknownInstance(name.to_string()))
    }

    /// Entries sorted by name, with no map guard held
    fn entries(&self) -> Vec<Arc<ManagedInstance>> {
        let mut entries: Vec<Arc<ManagedInstance>> =
            self.instances.iter().map(|e| Arc::clone(e.value())).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    // ---- registry ----

    /// Begin monitoring an instance
    pub async fn register_instance(
        &self,
        registration: InstanceRegistration,
    ) -> EngineResult<InstanceSnapshot> {
        let name = registration.name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::InvalidInput(
                "instance name must not be empty".to_string(),
            ));
        }
        if !matches!(
            registration.initial_state,
            LifecycleState::Pending
                | LifecycleState::Running
                | LifecycleState::Stopped
                | LifecycleState::Hibernated
        ) {
            return Err(EngineError::InvalidInput(format!(
                "initial state must be pending, running, stopped or hibernated, got {}",
                registration.initial_state
            )));
        }
        let tier = self.catalog().tier_of(&registration.instance_type)?;

        let mut machine = LifecycleStateMachine::new(
            name.clone(),
            registration.instance_type.clone(),
            registration.initial_state,
            Arc::clone(&self.provider),
            self.config.lifecycle.provider_timeout(),
            self.logger.clone(),
        );
        if let Some(health) = &self.health {
            machine = machine.with_health(health.clone());
        }
        let managed = Arc::new(ManagedInstance::new(
            name.clone(),
            registration.instance_type,
            tier,
            registration.launched_at,
            Arc::new(machine),
        ));

        match self.instances.entry(name.clone()) {
            Entry::Occupied(_) => return Err(EngineError::InstanceExists(name)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&managed));
            }
        }
        self.store.track(&name);
        self.metrics.set_instances_monitored(self.instances.len());
        info!(instance = %name, tier = %tier, "Registered instance");

        Ok(managed.snapshot(0).await)
    }

    /// Stop monitoring an instance: halts its evaluator and drops its window.
    /// Past lifecycle actions are not reversed.
    pub async fn deregister_instance(&self, name: &str) -> EngineResult<()> {
        let (_, managed) = self
            .instances
            .remove(name)
            .ok_or_else(|| EngineError::UnknownInstance(name.to_string()))?;
        managed.detach_policy().await;
        self.store.remove(name);
        self.metrics.set_instances_monitored(self.instances.len());
        info!(instance = %name, "Deregistered instance");
        Ok(())
    }

    pub async fn instance(&self, name: &str) -> EngineResult<InstanceSnapshot> {
        let managed = self.get(name)?;
        Ok(managed.snapshot(self.store.sample_count(name)).await)
    }

    pub async fn list_instances(&self) -> Vec<InstanceSnapshot> {
        let mut snapshots = Vec::new();
        for managed in self.entries() {
            let samples = self.store.sample_count(&managed.name);
            snapshots.push(managed.snapshot(samples).await);
        }
        snapshots
    }

    // ---- telemetry ----

    /// Append a telemetry sample. Out-of-range and out-of-order samples are
    /// logged, counted and dropped without touching the window.
    pub fn record_sample(&self, name: &str, sample: MetricSample) -> EngineResult<()> {
        let result = sample
            .validate()
            .and_then(|()| self.store.append(name, sample));
        match result {
            Ok(()) => {
                self.metrics.inc_samples_ingested();
                self.ingest.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e @ (EngineError::OutOfOrderSample { .. } | EngineError::InvalidInput(_))) => {
                self.metrics.inc_samples_rejected();
                self.ingest.rejected.fetch_add(1, Ordering::Relaxed);
                self.logger.log_sample_rejected(name, &e.to_string());
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Record activity; `None` means now. Returns the resulting last-active time.
    pub fn record_activity(
        &self,
        name: &str,
        at: Option<DateTime<Utc>>,
    ) -> EngineResult<DateTime<Utc>> {
        let managed = self.get(name)?;
        Ok(managed.activity.record(at.unwrap_or_else(|| self.clock.now())))
    }

    pub fn window(&self, name: &str) -> EngineResult<Vec<MetricSample>> {
        self.store.window(name)
    }

    // ---- analysis and recommendations ----

    pub fn get_utilization_summary(&self, name: &str) -> EngineResult<ResourceSummary> {
        let samples = self.store.window(name)?;
        Ok(self.analyzer.summarize(&samples))
    }

    /// Generate a fresh recommendation and cache it on the instance
    pub async fn get_recommendation(&self, name: &str) -> EngineResult<Recommendation> {
        let managed = self.get(name)?;
        self.recommend_for(&managed).await.map(|(rec, _)| rec)
    }

    pub async fn cached_recommendation(&self, name: &str) -> EngineResult<Option<Recommendation>> {
        let managed = self.get(name)?;
        let cached = managed.recommendation.read().await.clone();
        Ok(cached)
    }

    async fn recommend_for(
        &self,
        managed: &ManagedInstance,
    ) -> EngineResult<(Recommendation, ResourceSummary)> {
        let state = managed.machine.state().await;
        if state.is_terminal() {
            return Err(EngineError::State {
                instance: managed.name.clone(),
                actual: state,
                expected: vec![
                    LifecycleState::Pending,
                    LifecycleState::Running,
                    LifecycleState::Stopped,
                    LifecycleState::Hibernated,
                ],
            });
        }

        let started = Instant::now();
        // Snapshot first; the computation below runs without any store lock.
        let samples = self.store.window(&managed.name)?;
        let summary = self.analyzer.summarize(&samples);
        let recommendation = self.recommender.recommend(
            InstanceProfile {
                name: &managed.name,
                tier: managed.tier,
                launched_at: managed.launched_at,
            },
            &summary,
            self.config.thresholds.min_samples,
            self.clock.now(),
        )?;
        self.metrics
            .observe_analysis_latency(started.elapsed().as_secs_f64());

        // Superseded, never merged
        *managed.recommendation.write().await = Some(recommendation.clone());
        self.metrics.record_recommendation(&recommendation);
        self.logger.log_recommendation(&recommendation);

        Ok((recommendation, summary))
    }

    /// Recommendations for every non-terminated instance plus the fleet
    /// aggregate. A failure for one instance is reported in `skipped` and
    /// never aborts the listing.
    pub async fn list_recommendations(&self) -> FleetRecommendations {
        let mut results = Vec::new();
        let mut skipped = Vec::new();

        for managed in self.entries() {
            if managed.machine.state().await.is_terminal() {
                continue;
            }
            match self.recommend_for(&managed).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    debug!(instance = %managed.name, error = %e, "Skipping instance");
                    skipped.push(SkippedInstance::from_error(&managed.name, &e));
                }
            }
        }

        let summary = FleetSummary::build(&results, skipped.len(), &self.config.thresholds);
        self.metrics
            .set_potential_monthly_savings(summary.potential_monthly_savings);

        FleetRecommendations {
            recommendations: results.into_iter().map(|(rec, _)| rec).collect(),
            skipped,
            summary,
        }
    }

    /// Regenerate every cached recommendation
    pub async fn refresh_recommendations(&self) -> RefreshReport {
        let fleet = self.list_recommendations().await;
        let (insufficient, failed): (Vec<_>, Vec<_>) = fleet
            .skipped
            .into_iter()
            .partition(|s| s.code == "insufficient_metrics");

        let (samples_accepted, samples_rejected) = self.ingest.take();
        let report = RefreshReport {
            attempted: fleet.summary.analyzed + insufficient.len() + failed.len(),
            refreshed: fleet.summary.analyzed,
            insufficient: insufficient.len(),
            failed,
            potential_monthly_savings: fleet.summary.potential_monthly_savings,
            samples_accepted,
            samples_rejected,
        };
        self.logger
            .log_refresh_cycle(report.refreshed, report.insufficient, report.failed.len());
        report
    }

    // ---- lifecycle ----

    /// Request a lifecycle transition.
    ///
    /// A successful start or resume marks the instance active, beginning a
    /// new idle episode.
    pub async fn request_transition(
        &self,
        name: &str,
        action: LifecycleAction,
    ) -> EngineResult<TransitionOutcome> {
        let managed = self.get(name)?;
        let outcome = managed.machine.request(action).await?;

        if !outcome.no_op && outcome.new_state == LifecycleState::Running {
            managed.activity.record(self.clock.now());
        }
        Ok(outcome)
    }

    // ---- idle policies ----

    /// Built-in policy templates
    pub fn policy_templates(&self) -> Vec<IdlePolicy> {
        IdlePolicy::templates()
    }

    /// Attach a policy, replacing any existing one, and start its evaluator
    pub async fn assign_policy(&self, name: &str, policy: IdlePolicy) -> EngineResult<()> {
        policy.validate()?;
        let managed = self.get(name)?;

        let hourly_cost = self.catalog().spec_of(managed.tier)?.hourly_cost;

        let evaluator = Arc::new(
            IdleEvaluator::new(
                policy.clone(),
                Arc::clone(&managed.machine),
                Arc::clone(&managed.activity),
                EvaluatorContext {
                    clock: Arc::clone(&self.clock),
                    history: Arc::clone(&self.history),
                    metrics: self.metrics.clone(),
                    logger: self.logger.clone(),
                    health: self.health.clone(),
                },
            )
            .with_hourly_cost(hourly_cost),
        );

        {
            // Held across the swap so two evaluators never run for one instance.
            // Readers go through `current_evaluator` and never wait on it.
            let mut slot = managed.policy.lock().await;
            managed.set_evaluator(Some(Arc::clone(&evaluator)));
            if let Some(previous) = slot.take() {
                previous.stop().await;
            }
            *slot = Some(PolicyAssignment::spawn(evaluator));
        }

        info!(
            instance = %name,
            policy = %policy.name,
            idle_minutes = policy.idle_minutes,
            action = ?policy.action,
            "Assigned idle policy"
        );
        Ok(())
    }

    /// Detach the policy; returns it if one was assigned
    pub async fn remove_policy(&self, name: &str) -> EngineResult<Option<IdlePolicy>> {
        let managed = self.get(name)?;
        let removed = managed.detach_policy().await;
        if let Some(policy) = &removed {
            info!(instance = %name, policy = %policy.name, "Removed idle policy");
        }
        Ok(removed)
    }

    /// Run one idle evaluation pass, the same one each background tick runs
    pub async fn evaluate_idle(&self, name: &str) -> EngineResult<IdleDecision> {
        let managed = self.get(name)?;
        let evaluator = managed
            .evaluator()
            .ok_or_else(|| EngineError::UnknownPolicy(format!("no policy assigned to {name}")))?;
        evaluator.evaluate_once().await
    }

    pub fn idle_history(&self) -> Vec<IdleEvent> {
        self.history.entries()
    }

    pub fn idle_history_for(&self, name: &str) -> Vec<IdleEvent> {
        self.history.for_instance(name)
    }

    /// Stop every background evaluator, letting in-flight work finish
    pub async fn shutdown(&self) {
        self.logger.log_shutdown("shutdown requested");
        let mut stopped = 0;
        for managed in self.entries() {
            if managed.detach_policy().await.is_some() {
                stopped += 1;
            }
        }
        info!(evaluators_stopped = stopped, "Advisor engine stopped");
    }
}
