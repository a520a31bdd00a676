//! Background idle policy evaluation for one instance

use super::activity::ActivitySignal;
use super::history::{IdleEvent, IdleHistory};
use super::policy::IdlePolicy;
use super::tracker::{IdleCheck, IdleTracker};
use crate::clock::Clock;
use crate::error::EngineResult;
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::lifecycle::LifecycleStateMachine;
use crate::models::{LifecycleAction, LifecycleState, TransitionOutcome};
use crate::observability::{EngineMetrics, StructuredLogger};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of one evaluation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum IdleDecision {
    NotRunning {
        state: LifecycleState,
    },
    Active {
        idle_minutes: i64,
        remaining_minutes: i64,
    },
    AlreadyFired {
        idle_minutes: i64,
    },
    Fired {
        idle_minutes: i64,
        outcome: TransitionOutcome,
    },
}

/// Shared handles an evaluator needs from the engine
#[derive(Clone)]
pub struct EvaluatorContext {
    pub clock: Arc<dyn Clock>,
    pub history: Arc<IdleHistory>,
    pub metrics: EngineMetrics,
    pub logger: StructuredLogger,
    pub health: Option<HealthRegistry>,
}

pub struct IdleEvaluator {
    policy: IdlePolicy,
    machine: Arc<LifecycleStateMachine>,
    activity: Arc<ActivitySignal>,
    tracker: Mutex<IdleTracker>,
    ctx: EvaluatorContext,
    /// Compute cost avoided per hour once the action lands
    hourly_cost: f64,
}

impl IdleEvaluator {
    pub fn new(
        policy: IdlePolicy,
        machine: Arc<LifecycleStateMachine>,
        activity: Arc<ActivitySignal>,
        ctx: EvaluatorContext,
    ) -> Self {
        Self {
            policy,
            machine,
            activity,
            tracker: Mutex::new(IdleTracker::new()),
            ctx,
            hourly_cost: 0.0,
        }
    }

    pub fn with_hourly_cost(mut self, hourly_cost: f64) -> Self {
        self.hourly_cost = hourly_cost;
        self
    }

    pub fn policy(&self) -> &IdlePolicy {
        &self.policy
    }

    /// Evaluate once. Passes are serialized per instance; a failed action
    /// leaves the episode armed so the next tick retries it.
    pub async fn evaluate_once(&self) -> EngineResult<IdleDecision> {
        let result = self.evaluate().await;
        self.report_health(&result).await;
        result
    }

    /// A failed pass degrades `idle_evaluator` and a clean one restores it.
    /// Retryable contention leaves it untouched.
    async fn report_health(&self, result: &EngineResult<IdleDecision>) {
        let Some(health) = &self.ctx.health else {
            return;
        };
        match result {
            Ok(_) => {
                if health.status_of(components::IDLE_EVALUATOR).await
                    != Some(ComponentStatus::Healthy)
                {
                    health.set_healthy(components::IDLE_EVALUATOR).await;
                }
            }
            Err(e) if e.is_retryable() => {}
            Err(e) => {
                health
                    .set_degraded(
                        components::IDLE_EVALUATOR,
                        format!("{} ({}): {e}", self.machine.instance(), self.policy.name),
                    )
                    .await;
            }
        }
    }

    async fn evaluate(&self) -> EngineResult<IdleDecision> {
        let mut tracker = self.tracker.lock().await;
        let state = self.machine.state().await;
        let last_active = self.activity.last_active();
        let now = self.ctx.clock.now();

        let decision = match tracker.observe(&self.policy, state, last_active, now) {
            IdleCheck::NotRunning(state) => IdleDecision::NotRunning { state },
            IdleCheck::Active { idle_for, remaining } => IdleDecision::Active {
                idle_minutes: idle_for.num_minutes(),
                remaining_minutes: remaining.num_minutes(),
            },
            IdleCheck::AlreadyFired { idle_for } => IdleDecision::AlreadyFired {
                idle_minutes: idle_for.num_minutes(),
            },
            IdleCheck::Breach { idle_for } => {
                let requested = LifecycleAction::from(self.policy.action);
                let outcome = self.machine.request(requested).await?;
                tracker.record_fired(last_active, outcome.new_state);

                let idle_minutes = idle_for.num_minutes();
                let estimated_hourly_savings = if outcome.new_state == LifecycleState::Running {
                    0.0
                } else {
                    self.hourly_cost
                };
                self.ctx.history.record(IdleEvent {
                    instance_name: self.machine.instance().to_string(),
                    policy: self.policy.name.clone(),
                    requested,
                    performed: outcome.performed,
                    fallback_applied: outcome.fallback_applied,
                    idle_minutes,
                    resulting_state: outcome.new_state,
                    estimated_hourly_savings,
                    fired_at: now,
                });
                self.ctx.metrics.inc_idle_actions(outcome.performed);
                self.ctx.logger.log_idle_action(
                    self.machine.instance(),
                    &self.policy.name,
                    outcome.performed,
                    idle_minutes,
                    outcome.fallback_applied,
                );
                IdleDecision::Fired {
                    idle_minutes,
                    outcome,
                }
            }
        };

        debug!(
            instance = %self.machine.instance(),
            policy = %self.policy.name,
            decision = ?decision,
            "Idle evaluation"
        );
        Ok(decision)
    }

    /// Tick at the policy's check interval until `stop` flips to true or
    /// its sender is dropped. An evaluation in progress always finishes.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        info!(
            instance = %self.machine.instance(),
            policy = %self.policy.name,
            interval_secs = self.policy.check_interval().as_secs(),
            "Starting idle evaluator"
        );

        // First evaluation one interval after assignment
        let period = self.policy.check_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.evaluate_once().await {
                        warn!(
                            instance = %self.machine.instance(),
                            policy = %self.policy.name,
                            error = %e,
                            "Idle evaluation failed"
                        );
                    }
                }
            }
        }

        info!(
            instance = %self.machine.instance(),
            policy = %self.policy.name,
            "Idle evaluator stopped"
        );
    }
}
