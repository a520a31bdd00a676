//! Bounded log of actions fired by idle policies

use crate::models::{LifecycleAction, LifecycleState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdleEvent {
    pub instance_name: String,
    pub policy: String,
    pub requested: LifecycleAction,
    pub performed: LifecycleAction,
    pub fallback_applied: bool,
    pub idle_minutes: i64,
    pub resulting_state: LifecycleState,
    /// Hourly compute cost of the instance's tier, avoided while it stays down
    pub estimated_hourly_savings: f64,
    pub fired_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct IdleHistory {
    events: Mutex<VecDeque<IdleEvent>>,
    capacity: usize,
}

impl IdleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, event: IdleEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// All events, oldest first
    pub fn entries(&self) -> Vec<IdleEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.iter().cloned().collect()
    }

    pub fn for_instance(&self, instance: &str) -> Vec<IdleEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events
            .iter()
            .filter(|e| e.instance_name == instance)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(instance: &str) -> IdleEvent {
        IdleEvent {
            instance_name: instance.to_string(),
            policy: "balanced".to_string(),
            requested: LifecycleAction::Hibernate,
            performed: LifecycleAction::Stop,
            fallback_applied: true,
            idle_minutes: 31,
            resulting_state: LifecycleState::Stopped,
            estimated_hourly_savings: 0.0336,
            fired_at: Utc::now(),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let history = IdleHistory::new(2);
        history.record(event("ws-1"));
        history.record(event("ws-2"));
        history.record(event("ws-3"));

        let names: Vec<String> = history.entries().into_iter().map(|e| e.instance_name).collect();
        assert_eq!(names, vec!["ws-2", "ws-3"]);
        assert_eq!(history.for_instance("ws-3").len(), 1);
        assert!(history.for_instance("ws-1").is_empty());
    }
}
