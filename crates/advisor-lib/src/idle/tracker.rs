//! Idle episode tracking
//!
//! Decides whether a policy should fire on this tick. The tracker remembers
//! the episode it last fired for so a single idle stretch triggers at most
//! one action.

use super::policy::IdlePolicy;
use crate::models::LifecycleState;
use chrono::{DateTime, Duration, Utc};

/// Result of observing an instance on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleCheck {
    /// Only running instances are evaluated
    NotRunning(LifecycleState),
    /// Idle, but under the threshold
    Active { idle_for: Duration, remaining: Duration },
    /// Threshold crossed and not yet acted on for this episode
    Breach { idle_for: Duration },
    /// Already acted on for this episode
    AlreadyFired { idle_for: Duration },
}

#[derive(Debug, Clone, Copy)]
struct FiredEpisode {
    last_active: DateTime<Utc>,
    resulting_state: LifecycleState,
}

#[derive(Debug, Default)]
pub struct IdleTracker {
    fired: Option<FiredEpisode>,
}

impl IdleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.fired.is_none()
    }

    pub fn observe(
        &mut self,
        policy: &IdlePolicy,
        state: LifecycleState,
        last_active: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> IdleCheck {
        // Re-arm once the instance was active again or someone else moved it.
        if let Some(episode) = self.fired {
            if last_active > episode.last_active || state != episode.resulting_state {
                self.fired = None;
            }
        }

        let idle_for = (now - last_active).max(Duration::zero());
        if self.fired.is_some() {
            return IdleCheck::AlreadyFired { idle_for };
        }
        if state != LifecycleState::Running {
            return IdleCheck::NotRunning(state);
        }

        let threshold = policy.idle_threshold();
        if idle_for >= threshold {
            IdleCheck::Breach { idle_for }
        } else {
            IdleCheck::Active {
                idle_for,
                remaining: threshold - idle_for,
            }
        }
    }

    /// Mark the current episode as acted on
    pub fn record_fired(&mut self, last_active: DateTime<Utc>, resulting_state: LifecycleState) {
        self.fired = Some(FiredEpisode {
            last_active,
            resulting_state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idle::policy::IdleAction;

    fn policy() -> IdlePolicy {
        IdlePolicy::new("balanced", 30, IdleAction::Hibernate, 5)
    }

    #[test]
    fn test_fires_once_per_episode() {
        let mut tracker = IdleTracker::new();
        let active = Utc::now();
        let p = policy();

        assert!(matches!(
            tracker.observe(&p, LifecycleState::Running, active, active + Duration::minutes(29)),
            IdleCheck::Active { .. }
        ));
        assert!(matches!(
            tracker.observe(&p, LifecycleState::Running, active, active + Duration::minutes(30)),
            IdleCheck::Breach { .. }
        ));
        tracker.record_fired(active, LifecycleState::Hibernated);

        for minute in [35, 60, 600] {
            assert!(matches!(
                tracker.observe(
                    &p,
                    LifecycleState::Hibernated,
                    active,
                    active + Duration::minutes(minute)
                ),
                IdleCheck::AlreadyFired { .. }
            ));
        }
    }

    #[test]
    fn test_rearms_after_activity() {
        let mut tracker = IdleTracker::new();
        let active = Utc::now();
        let p = policy();
        tracker.record_fired(active, LifecycleState::Hibernated);

        let resumed = active + Duration::hours(2);
        assert!(matches!(
            tracker.observe(&p, LifecycleState::Running, resumed, resumed + Duration::minutes(1)),
            IdleCheck::Active { .. }
        ));
        assert!(tracker.is_armed());
        assert!(matches!(
            tracker.observe(&p, LifecycleState::Running, resumed, resumed + Duration::minutes(31)),
            IdleCheck::Breach { .. }
        ));
    }

    #[test]
    fn test_rearms_after_external_state_change() {
        let mut tracker = IdleTracker::new();
        let active = Utc::now();
        tracker.record_fired(active, LifecycleState::Stopped);

        let check = tracker.observe(
            &policy(),
            LifecycleState::Terminated,
            active,
            active + Duration::hours(1),
        );
        assert_eq!(check, IdleCheck::NotRunning(LifecycleState::Terminated));
        assert!(tracker.is_armed());
    }

    #[test]
    fn test_clock_skew_counts_as_not_idle() {
        let mut tracker = IdleTracker::new();
        let now = Utc::now();
        let check = tracker.observe(
            &policy(),
            LifecycleState::Running,
            now + Duration::minutes(5),
            now,
        );
        assert_eq!(
            check,
            IdleCheck::Active {
                idle_for: Duration::zero(),
                remaining: Duration::minutes(30)
            }
        );
    }
}
