//! Engine error types

use crate::models::{LifecycleAction, LifecycleState, SizeTier};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Direction of a size catalog lookup that ran off an extreme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Largest,
    Smallest,
}

impl std::fmt::Display for Boundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Boundary::Largest => write!(f, "no larger tier"),
            Boundary::Smallest => write!(f, "no smaller tier"),
        }
    }
}

/// Errors raised by the advisory engine.
///
/// Every variant is scoped to a single instance's operation; fleet-wide
/// operations collect them per instance instead of aborting.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient metrics for {instance}: {samples} samples, need {required}")]
    InsufficientMetrics {
        instance: String,
        samples: usize,
        required: usize,
    },

    #[error("{instance} is {actual}, expected {}", join_states(.expected))]
    State {
        instance: String,
        actual: LifecycleState,
        expected: Vec<LifecycleState>,
    },

    #[error("size catalog boundary at {tier}: {boundary}")]
    Boundary { tier: SizeTier, boundary: Boundary },

    #[error("out-of-order sample for {instance}: {timestamp} is not after {latest}")]
    OutOfOrderSample {
        instance: String,
        timestamp: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    #[error("{action} is unavailable for {instance}")]
    CapabilityUnavailable {
        instance: String,
        action: LifecycleAction,
    },

    #[error("transition already in progress for {instance} (currently {state})")]
    TransitionInProgress {
        instance: String,
        state: LifecycleState,
    },

    #[error("instance not found: {0}")]
    UnknownInstance(String),

    #[error("instance already registered: {0}")]
    InstanceExists(String),

    #[error("instance type not in size catalog: {0}")]
    UnknownInstanceType(String),

    #[error("tier not in size catalog: {0}")]
    UnknownTier(SizeTier),

    #[error("idle policy not found: {0}")]
    UnknownPolicy(String),

    #[error("invalid idle policy: {0}")]
    InvalidPolicy(String),

    #[error("cloud provider failed to {action} {instance}: {message}")]
    Provider {
        instance: String,
        action: LifecycleAction,
        message: String,
    },

    #[error("cloud provider timed out after {timeout_secs}s on {action} {instance}")]
    ProviderTimeout {
        instance: String,
        action: LifecycleAction,
        timeout_secs: u64,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether the caller should simply try again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientMetrics { .. } | EngineError::TransitionInProgress { .. }
        )
    }

    /// Short machine-readable code for API responses and log fields
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InsufficientMetrics { .. } => "insufficient_metrics",
            EngineError::State { .. } => "state_error",
            EngineError::Boundary { .. } => "boundary_error",
            EngineError::OutOfOrderSample { .. } => "out_of_order_sample",
            EngineError::CapabilityUnavailable { .. } => "capability_unavailable",
            EngineError::TransitionInProgress { .. } => "transition_in_progress",
            EngineError::UnknownInstance(_) => "unknown_instance",
            EngineError::InstanceExists(_) => "instance_exists",
            EngineError::UnknownInstanceType(_) => "unknown_instance_type",
            EngineError::UnknownTier(_) => "unknown_tier",
            EngineError::UnknownPolicy(_) => "unknown_policy",
            EngineError::InvalidPolicy(_) => "invalid_policy",
            EngineError::Provider { .. } => "provider_error",
            EngineError::ProviderTimeout { .. } => "provider_timeout",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::Config(_) => "config_error",
        }
    }
}

fn join_states(states: &[LifecycleState]) -> String {
    states
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" or ")
}

pub type EngineResult<T> = Result<T, EngineError>;
