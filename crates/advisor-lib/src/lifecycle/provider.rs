//! Cloud provider adapter boundary

use crate::models::LifecycleAction;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors returned by a cloud provider adapter
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The adapter cannot perform this exact action for the instance
    #[error("{0} is not supported for this instance")]
    CapabilityUnavailable(LifecycleAction),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Adapter that performs lifecycle calls against a cloud provider.
///
/// Implementations are expected to bound their own calls; the state machine
/// additionally wraps every call in its configured timeout.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn start(&self, instance: &str) -> Result<(), ProviderError>;

    async fn stop(&self, instance: &str) -> Result<(), ProviderError>;

    async fn hibernate(&self, instance: &str) -> Result<(), ProviderError>;

    async fn resume(&self, instance: &str) -> Result<(), ProviderError>;

    async fn terminate(&self, instance: &str) -> Result<(), ProviderError>;

    /// Whether instances of this concrete type can hibernate
    fn hibernation_supported(&self, instance_type: &str) -> bool;
}

/// Instance families that support hibernation
const HIBERNATION_FAMILIES: &[&str] = &[
    "t2", "t3", "t3a", "m3", "m4", "m5", "m5a", "m5n", "m5zn", "m6i", "m6a", "m6g", "m7i", "m7a",
    "m7g", "c3", "c4", "c5", "c5n", "c6i", "c6a", "c6g", "c7i", "c7a", "c7g", "r3", "r4", "r5",
    "r5a", "r5n", "r6i", "r6a", "r6g", "r7i", "r7a", "r7g", "x1", "x1e", "g4dn", "g4ad", "g5",
    "g5g",
];

/// Family lookup for types written as `family.size`
pub fn family_supports_hibernation(instance_type: &str) -> bool {
    let family = instance_type.split('.').next().unwrap_or_default();
    HIBERNATION_FAMILIES.contains(&family)
}

/// In-process provider that acknowledges every call after a fixed latency
#[derive(Debug, Clone, Default)]
pub struct SimulatedProvider {
    latency: Duration,
}

impl SimulatedProvider {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    async fn acknowledge(&self, instance: &str, action: LifecycleAction) -> Result<(), ProviderError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        debug!(instance = %instance, action = %action, "Simulated provider call acknowledged");
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for SimulatedProvider {
    async fn start(&self, instance: &str) -> Result<(), ProviderError> {
        self.acknowledge(instance, LifecycleAction::Start).await
    }

    async fn stop(&self, instance: &str) -> Result<(), ProviderError> {
        self.acknowledge(instance, LifecycleAction::Stop).await
    }

    async fn hibernate(&self, instance: &str) -> Result<(), ProviderError> {
        self.acknowledge(instance, LifecycleAction::Hibernate).await
    }

    async fn resume(&self, instance: &str) -> Result<(), ProviderError> {
        self.acknowledge(instance, LifecycleAction::Resume).await
    }

    async fn terminate(&self, instance: &str) -> Result<(), ProviderError> {
        self.acknowledge(instance, LifecycleAction::Terminate).await
    }

    fn hibernation_supported(&self, instance_type: &str) -> bool {
        family_supports_hibernation(instance_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hibernation_families() {
        assert!(family_supports_hibernation("t3.medium"));
        assert!(family_supports_hibernation("m5zn.large"));
        assert!(!family_supports_hibernation("t4g.medium"));
        assert!(!family_supports_hibernation(""));
    }

    #[tokio::test]
    async fn test_simulated_provider_acknowledges() {
        let provider = SimulatedProvider::default();
        assert!(provider.hibernate("ws-1").await.is_ok());
        assert!(!provider.hibernation_supported("t4g.small"));
        assert!(provider.hibernation_supported("t3a.small"));
    }
}
