//! Idle policies and built-in templates

use crate::error::{EngineError, EngineResult};
use crate::models::LifecycleAction;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Action taken once an instance has been idle past the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleAction {
    Hibernate,
    Stop,
}

impl From<IdleAction> for LifecycleAction {
    fn from(action: IdleAction) -> Self {
        match action {
            IdleAction::Hibernate => LifecycleAction::Hibernate,
            IdleAction::Stop => LifecycleAction::Stop,
        }
    }
}

/// Reusable idle policy template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdlePolicy {
    pub name: String,
    pub idle_minutes: u32,
    pub action: IdleAction,
    pub check_interval_minutes: u32,
}

impl IdlePolicy {
    pub fn new(
        name: impl Into<String>,
        idle_minutes: u32,
        action: IdleAction,
        check_interval_minutes: u32,
    ) -> Self {
        Self {
            name: name.into(),
            idle_minutes,
            action,
            check_interval_minutes,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidPolicy("name must not be empty".to_string()));
        }
        if self.idle_minutes < 1 {
            return Err(EngineError::InvalidPolicy(format!(
                "{}: idle threshold must be at least 1 minute",
                self.name
            )));
        }
        if self.check_interval_minutes < 1 {
            return Err(EngineError::InvalidPolicy(format!(
                "{}: check interval must be at least 1 minute",
                self.name
            )));
        }
        Ok(())
    }

    pub fn idle_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.idle_minutes))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.check_interval_minutes) * 60)
    }

    /// Built-in templates
    pub fn templates() -> Vec<IdlePolicy> {
        vec![
            IdlePolicy::new("aggressive-cost", 10, IdleAction::Hibernate, 1),
            IdlePolicy::new("balanced", 30, IdleAction::Hibernate, 5),
            IdlePolicy::new("conservative", 60, IdleAction::Hibernate, 10),
            IdlePolicy::new("research", 15, IdleAction::Stop, 5),
            IdlePolicy::new("development", 5, IdleAction::Hibernate, 1),
        ]
    }

    pub fn template(name: &str) -> EngineResult<IdlePolicy> {
        Self::templates()
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| EngineError::UnknownPolicy(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid() {
        for policy in IdlePolicy::templates() {
            policy.validate().unwrap();
        }
        let balanced = IdlePolicy::template("balanced").unwrap();
        assert_eq!(balanced.idle_minutes, 30);
        assert_eq!(balanced.check_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_unknown_template() {
        assert!(matches!(
            IdlePolicy::template("nightly"),
            Err(EngineError::UnknownPolicy(_))
        ));
    }

    #[test]
    fn test_validation() {
        assert!(IdlePolicy::new("", 30, IdleAction::Stop, 5).validate().is_err());
        assert!(IdlePolicy::new("p", 0, IdleAction::Stop, 5).validate().is_err());
        assert!(IdlePolicy::new("p", 30, IdleAction::Stop, 0).validate().is_err());
    }

    #[test]
    fn test_policy_json_shape() {
        let policy: IdlePolicy = serde_json::from_str(
            r#"{"name":"night","idle_minutes":45,"action":"stop","check_interval_minutes":5}"#,
        )
        .unwrap();
        assert_eq!(LifecycleAction::from(policy.action), LifecycleAction::Stop);
    }
}
