//! Per-instance lifecycle state machine

use super::provider::{CloudProvider, ProviderError};
use super::transitions::{plan, Plan};
use crate::error::{EngineError, EngineResult};
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::models::{LifecycleAction, LifecycleState, TransitionOutcome};
use crate::observability::{EngineMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Owns one instance's lifecycle state.
///
/// Transitions are serialized by `transition_lock`, taken without waiting:
/// a request that finds another in flight fails with `TransitionInProgress`.
pub struct LifecycleStateMachine {
    instance: String,
    instance_type: String,
    state: RwLock<LifecycleState>,
    transition_lock: Mutex<()>,
    provider: Arc<dyn CloudProvider>,
    timeout: Duration,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl LifecycleStateMachine {
    pub fn new(
        instance: impl Into<String>,
        instance_type: impl Into<String>,
        initial: LifecycleState,
        provider: Arc<dyn CloudProvider>,
        timeout: Duration,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            instance: instance.into(),
            instance_type: instance_type.into(),
            state: RwLock::new(initial),
            transition_lock: Mutex::new(()),
            provider,
            timeout,
            metrics: EngineMetrics::new(),
            logger,
            health: None,
        }
    }

    /// Report provider failures into the `lifecycle` health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    async fn set_state(&self, next: LifecycleState) {
        *self.state.write().await = next;
    }

    /// Request a transition.
    ///
    /// The work runs on its own task so that a caller dropping this future
    /// never strands the instance in an intermediate state.
    pub async fn request(self: &Arc<Self>, action: LifecycleAction) -> EngineResult<TransitionOutcome> {
        let machine = Arc::clone(self);
        let result = tokio::spawn(async move { machine.transition(action).await })
            .await
            .map_err(|e| EngineError::Provider {
                instance: self.instance.clone(),
                action,
                message: format!("transition task failed: {e}"),
            })?;

        let outcome_label = match &result {
            Ok(outcome) if outcome.no_op => "no_op",
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        self.metrics.record_transition(action, outcome_label);
        result
    }

    async fn transition(&self, requested: LifecycleAction) -> EngineResult<TransitionOutcome> {
        let _guard = match self.transition_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                return Err(EngineError::TransitionInProgress {
                    instance: self.instance.clone(),
                    state: self.state().await,
                })
            }
        };

        let previous = self.state().await;

        // Capability check for hibernate happens up front, and only from
        // Running; every other source gets the same answer either way.
        let mut performed = requested;
        let mut fallback_applied = false;
        if requested == LifecycleAction::Hibernate
            && previous == LifecycleState::Running
            && !self.provider.hibernation_supported(&self.instance_type)
        {
            self.logger.log_hibernate_fallback(
                &self.instance,
                &self.instance_type,
                "instance type does not support hibernation",
            );
            performed = LifecycleAction::Stop;
            fallback_applied = true;
        }

        let new_state = match plan(&self.instance, previous, performed)? {
            Plan::AlreadyInTarget => previous,
            Plan::Through { via, call, target } => {
                match self.drive(previous, via, call, target).await {
                    Err(EngineError::CapabilityUnavailable { .. })
                        if call == LifecycleAction::Hibernate =>
                    {
                        // Adapter refused at call time; carry it out as stop instead.
                        self.logger.log_hibernate_fallback(
                            &self.instance,
                            &self.instance_type,
                            "provider rejected hibernate",
                        );
                        performed = LifecycleAction::Stop;
                        fallback_applied = true;
                        self.drive(
                            previous,
                            Some(LifecycleState::Stopping),
                            LifecycleAction::Stop,
                            LifecycleState::Stopped,
                        )
                        .await?
                    }
                    other => other?,
                }
            }
        };

        if fallback_applied {
            self.metrics.inc_hibernate_fallbacks();
        }
        let no_op = new_state == previous;
        self.logger.log_transition(
            &self.instance,
            requested,
            performed,
            previous,
            new_state,
            no_op,
        );

        Ok(TransitionOutcome {
            instance_name: self.instance.clone(),
            requested,
            performed,
            previous_state: previous,
            new_state,
            fallback_applied,
            no_op,
        })
    }

    /// Show `via`, make the provider call, then settle on `target`.
    /// Any failure restores `previous`.
    async fn drive(
        &self,
        previous: LifecycleState,
        via: Option<LifecycleState>,
        call: LifecycleAction,
        target: LifecycleState,
    ) -> EngineResult<LifecycleState> {
        if let Some(via) = via {
            self.set_state(via).await;
        }
        debug!(instance = %self.instance, action = %call, "Calling cloud provider");

        let result = match tokio::time::timeout(self.timeout, self.invoke(call)).await {
            Ok(Ok(())) => Ok(target),
            Ok(Err(ProviderError::CapabilityUnavailable(_))) => {
                Err(EngineError::CapabilityUnavailable {
                    instance: self.instance.clone(),
                    action: call,
                })
            }
            Ok(Err(ProviderError::Other(e))) => Err(EngineError::Provider {
                instance: self.instance.clone(),
                action: call,
                message: format!("{e:#}"),
            }),
            Err(_) => Err(EngineError::ProviderTimeout {
                instance: self.instance.clone(),
                action: call,
                timeout_secs: self.timeout.as_secs(),
            }),
        };

        self.report_health(&result).await;
        match result {
            Ok(target) => {
                self.set_state(target).await;
                Ok(target)
            }
            Err(e) => {
                warn!(
                    instance = %self.instance,
                    action = %call,
                    error = %e,
                    restored_state = %previous,
                    "Provider call failed, restoring previous state"
                );
                self.set_state(previous).await;
                Err(e)
            }
        }
    }

    /// Provider failures and timeouts degrade `lifecycle`; the next
    /// successful call clears it.
    async fn report_health(&self, result: &EngineResult<LifecycleState>) {
        let Some(health) = &self.health else {
            return;
        };
        match result {
            Ok(_) => {
                if health.status_of(components::LIFECYCLE).await != Some(ComponentStatus::Healthy) {
                    health.set_healthy(components::LIFECYCLE).await;
                }
            }
            Err(e @ (EngineError::Provider { .. } | EngineError::ProviderTimeout { .. })) => {
                health
                    .set_degraded(components::LIFECYCLE, format!("{}: {e}", self.instance))
                    .await;
            }
            Err(_) => {}
        }
    }

    async fn invoke(&self, call: LifecycleAction) -> Result<(), ProviderError> {
        match call {
            LifecycleAction::Start => self.provider.start(&self.instance).await,
            LifecycleAction::Stop => self.provider.stop(&self.instance).await,
            LifecycleAction::Hibernate => self.provider.hibernate(&self.instance).await,
            LifecycleAction::Resume => self.provider.resume(&self.instance).await,
            LifecycleAction::Terminate => self.provider.terminate(&self.instance).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::provider::SimulatedProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider with scripted behaviour for the hibernate call
    struct ScriptedProvider {
        hibernation_flag: bool,
        reject_hibernate: bool,
        fail_stop: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(hibernation_flag: bool) -> Self {
            Self {
                hibernation_flag,
                reject_hibernate: false,
                fail_stop: false,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        async fn call(&self) -> Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CloudProvider for ScriptedProvider {
        async fn start(&self, _instance: &str) -> Result<(), ProviderError> {
            self.call().await
        }

        async fn stop(&self, _instance: &str) -> Result<(), ProviderError> {
            self.call().await?;
            if self.fail_stop {
                return Err(ProviderError::Other(anyhow::anyhow!("api throttled")));
            }
            Ok(())
        }

        async fn hibernate(&self, _instance: &str) -> Result<(), ProviderError> {
            self.call().await?;
            if self.reject_hibernate {
                return Err(ProviderError::CapabilityUnavailable(LifecycleAction::Hibernate));
            }
            Ok(())
        }

        async fn resume(&self, _instance: &str) -> Result<(), ProviderError> {
            self.call().await
        }

        async fn terminate(&self, _instance: &str) -> Result<(), ProviderError> {
            self.call().await
        }

        fn hibernation_supported(&self, _instance_type: &str) -> bool {
            self.hibernation_flag
        }
    }

    fn machine(state: LifecycleState, provider: Arc<dyn CloudProvider>) -> Arc<LifecycleStateMachine> {
        Arc::new(LifecycleStateMachine::new(
            "ws-1",
            "t3.medium",
            state,
            provider,
            Duration::from_secs(5),
            StructuredLogger::new("test"),
        ))
    }

    #[tokio::test]
    async fn test_hibernate_falls_back_to_stop_when_unsupported() {
        let m = machine(LifecycleState::Running, Arc::new(ScriptedProvider::new(false)));
        let outcome = m.request(LifecycleAction::Hibernate).await.unwrap();
        assert!(outcome.fallback_applied);
        assert_eq!(outcome.performed, LifecycleAction::Stop);
        assert_eq!(outcome.new_state, LifecycleState::Stopped);
        assert_eq!(m.state().await, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_hibernate_supported() {
        let m = machine(LifecycleState::Running, Arc::new(SimulatedProvider::default()));
        let outcome = m.request(LifecycleAction::Hibernate).await.unwrap();
        assert!(!outcome.fallback_applied);
        assert_eq!(outcome.new_state, LifecycleState::Hibernated);
    }

    #[tokio::test]
    async fn test_provider_rejection_at_call_time_falls_back() {
        let provider = ScriptedProvider {
            reject_hibernate: true,
            ..ScriptedProvider::new(true)
        };
        let m = machine(LifecycleState::Running, Arc::new(provider));
        let outcome = m.request(LifecycleAction::Hibernate).await.unwrap();
        assert!(outcome.fallback_applied);
        assert_eq!(outcome.new_state, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_hibernate_already_hibernated_is_no_op() {
        let provider = Arc::new(ScriptedProvider::new(false));
        let m = machine(LifecycleState::Hibernated, provider.clone());
        let outcome = m.request(LifecycleAction::Hibernate).await.unwrap();
        assert!(outcome.no_op);
        assert!(!outcome.fallback_applied);
        assert_eq!(outcome.new_state, LifecycleState::Hibernated);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_restores_state() {
        let provider = ScriptedProvider {
            fail_stop: true,
            ..ScriptedProvider::new(true)
        };
        let m = machine(LifecycleState::Running, Arc::new(provider));
        let err = m.request(LifecycleAction::Stop).await.unwrap_err();
        assert!(matches!(err, EngineError::Provider { .. }));
        assert_eq!(m.state().await, LifecycleState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_timeout_restores_state() {
        let provider = ScriptedProvider {
            delay: Duration::from_secs(60),
            ..ScriptedProvider::new(true)
        };
        let m = machine(LifecycleState::Stopped, Arc::new(provider));
        let err = m.request(LifecycleAction::Start).await.unwrap_err();
        assert!(matches!(err, EngineError::ProviderTimeout { timeout_secs: 5, .. }));
        assert_eq!(m.state().await, LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_request_reports_in_progress() {
        let provider = ScriptedProvider {
            delay: Duration::from_secs(2),
            ..ScriptedProvider::new(true)
        };
        let m = machine(LifecycleState::Running, Arc::new(provider));

        let first = {
            let m = m.clone();
            tokio::spawn(async move { m.request(LifecycleAction::Hibernate).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(m.state().await, LifecycleState::Hibernating);

        let err = m.request(LifecycleAction::Stop).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::TransitionInProgress {
                state: LifecycleState::Hibernating,
                ..
            }
        ));

        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome.new_state, LifecycleState::Hibernated);

        // The second request now observes the settled state
        let err = m.request(LifecycleAction::Stop).await.unwrap_err();
        assert!(matches!(err, EngineError::State { .. }));
    }

    #[tokio::test]
    async fn test_hibernate_from_invalid_source_ignores_capability() {
        for supported in [true, false] {
            for source in [LifecycleState::Stopped, LifecycleState::Pending] {
                let provider = Arc::new(ScriptedProvider::new(supported));
                let m = machine(source, provider.clone());
                let err = m.request(LifecycleAction::Hibernate).await.unwrap_err();
                assert!(
                    matches!(err, EngineError::State { actual, .. } if actual == source),
                    "supported={supported} source={source}: {err}"
                );
                assert_eq!(m.state().await, source);
                assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
            }
        }
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_lifecycle_health() {
        let health = HealthRegistry::new();
        health.register(components::LIFECYCLE).await;

        let provider = ScriptedProvider {
            fail_stop: true,
            ..ScriptedProvider::new(true)
        };
        let m = Arc::new(
            LifecycleStateMachine::new(
                "ws-1",
                "t3.medium",
                LifecycleState::Running,
                Arc::new(provider),
                Duration::from_secs(5),
                StructuredLogger::new("test"),
            )
            .with_health(health.clone()),
        );

        m.request(LifecycleAction::Stop).await.unwrap_err();
        assert_eq!(
            health.status_of(components::LIFECYCLE).await,
            Some(ComponentStatus::Degraded)
        );

        // A no-op never reaches the provider and leaves health alone
        assert!(m.request(LifecycleAction::Resume).await.unwrap().no_op);
        assert_eq!(
            health.status_of(components::LIFECYCLE).await,
            Some(ComponentStatus::Degraded)
        );

        m.request(LifecycleAction::Hibernate).await.unwrap();
        assert_eq!(
            health.status_of(components::LIFECYCLE).await,
            Some(ComponentStatus::Healthy)
        );
    }

    #[tokio::test]
    async fn test_terminate_is_final() {
        let m = machine(LifecycleState::Stopped, Arc::new(SimulatedProvider::default()));
        let outcome = m.request(LifecycleAction::Terminate).await.unwrap();
        assert_eq!(outcome.new_state, LifecycleState::Terminated);

        let err = m.request(LifecycleAction::Hibernate).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::State {
                actual: LifecycleState::Terminated,
                ..
            }
        ));
    }
}
