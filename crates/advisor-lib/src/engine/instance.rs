//! Registry entry for one monitored instance

use crate::idle::{ActivitySignal, IdleEvaluator, IdlePolicy};
use crate::lifecycle::LifecycleStateMachine;
use crate::models::{InstanceSnapshot, Recommendation, SizeTier};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::warn;

pub(crate) struct ManagedInstance {
    pub name: String,
    pub instance_type: String,
    pub tier: SizeTier,
    pub launched_at: DateTime<Utc>,
    pub machine: Arc<LifecycleStateMachine>,
    pub activity: Arc<ActivitySignal>,
    /// Swap guard; held while a previous evaluator winds down
    pub policy: Mutex<Option<PolicyAssignment>>,
    /// Evaluator readers see, updated under `policy` but never awaited on
    pub current_evaluator: StdRwLock<Option<Arc<IdleEvaluator>>>,
    pub recommendation: RwLock<Option<Recommendation>>,
}

impl ManagedInstance {
    pub fn new(
        name: String,
        instance_type: String,
        tier: SizeTier,
        launched_at: DateTime<Utc>,
        machine: Arc<LifecycleStateMachine>,
    ) -> Self {
        Self {
            name,
            instance_type,
            tier,
            launched_at,
            machine,
            activity: Arc::new(ActivitySignal::new(launched_at)),
            policy: Mutex::new(None),
            current_evaluator: StdRwLock::new(None),
            recommendation: RwLock::new(None),
        }
    }

    pub fn evaluator(&self) -> Option<Arc<IdleEvaluator>> {
        self.current_evaluator
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_evaluator(&self, evaluator: Option<Arc<IdleEvaluator>>) {
        *self
            .current_evaluator
            .write()
            .unwrap_or_else(|e| e.into_inner()) = evaluator;
    }

    pub async fn snapshot(&self, samples_stored: usize) -> InstanceSnapshot {
        let idle_policy = self.evaluator().map(|e| e.policy().clone());
        InstanceSnapshot {
            name: self.name.clone(),
            instance_type: self.instance_type.clone(),
            tier: self.tier,
            state: self.machine.state().await,
            launched_at: self.launched_at,
            last_active_at: self.activity.last_active(),
            idle_policy,
            recommendation: self.recommendation.read().await.clone(),
            samples_stored,
        }
    }

    /// Detach the current policy, if any, and wait for its evaluator to stop
    pub async fn detach_policy(&self) -> Option<IdlePolicy> {
        let mut slot = self.policy.lock().await;
        self.set_evaluator(None);
        let assignment = slot.take()?;
        let policy = assignment.evaluator.policy().clone();
        assignment.stop().await;
        Some(policy)
    }
}

/// Running evaluator bound to an instance
pub(crate) struct PolicyAssignment {
    pub evaluator: Arc<IdleEvaluator>,
    pub stop: watch::Sender<bool>,
    pub handle: JoinHandle<()>,
}

impl PolicyAssignment {
    pub fn spawn(evaluator: Arc<IdleEvaluator>) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(evaluator.clone().run(stop_rx));
        Self {
            evaluator,
            stop,
            handle,
        }
    }

    /// Signal the evaluator and let any in-flight evaluation finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            warn!(
                policy = %self.evaluator.policy().name,
                error = %e,
                "Idle evaluator task ended abnormally"
            );
        }
    }
}
