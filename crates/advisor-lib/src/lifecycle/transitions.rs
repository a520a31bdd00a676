//! Transition table
//!
//! Pure mapping from (current state, requested action) to the provider call
//! to make and the states to pass through. No I/O happens here.

use crate::error::{EngineError, EngineResult};
use crate::models::{LifecycleAction, LifecycleState};

/// How to carry out an action from a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// The instance is already where the action would leave it
    AlreadyInTarget,
    /// Call the provider, showing `via` while the call is in flight
    Through {
        via: Option<LifecycleState>,
        call: LifecycleAction,
        target: LifecycleState,
    },
}

/// States from which `action` can start
pub fn valid_sources(action: LifecycleAction) -> Vec<LifecycleState> {
    use LifecycleState::*;
    match action {
        LifecycleAction::Start => vec![Pending, Stopped, Hibernated],
        LifecycleAction::Stop => vec![Running],
        LifecycleAction::Hibernate => vec![Running],
        LifecycleAction::Resume => vec![Hibernated, Stopped],
        LifecycleAction::Terminate => vec![Pending, Running, Stopped, Hibernated],
    }
}

/// State an action leaves the instance in
pub fn target_of(action: LifecycleAction) -> LifecycleState {
    match action {
        LifecycleAction::Start | LifecycleAction::Resume => LifecycleState::Running,
        LifecycleAction::Stop => LifecycleState::Stopped,
        LifecycleAction::Hibernate => LifecycleState::Hibernated,
        LifecycleAction::Terminate => LifecycleState::Terminated,
    }
}

pub fn plan(instance: &str, current: LifecycleState, action: LifecycleAction) -> EngineResult<Plan> {
    use LifecycleState::*;

    if current == target_of(action) {
        return Ok(Plan::AlreadyInTarget);
    }

    let through = |via: Option<LifecycleState>, call: LifecycleAction| Plan::Through {
        via,
        call,
        target: target_of(action),
    };

    let planned = match (action, current) {
        (LifecycleAction::Start, Pending | Stopped) => through(Some(Starting), LifecycleAction::Start),
        (LifecycleAction::Start, Hibernated) => through(Some(Resuming), LifecycleAction::Resume),
        (LifecycleAction::Stop, Running) => through(Some(Stopping), LifecycleAction::Stop),
        (LifecycleAction::Hibernate, Running) => {
            through(Some(Hibernating), LifecycleAction::Hibernate)
        }
        (LifecycleAction::Resume, Hibernated) => through(Some(Resuming), LifecycleAction::Resume),
        (LifecycleAction::Resume, Stopped) => through(Some(Starting), LifecycleAction::Start),
        (LifecycleAction::Terminate, state) if !state.is_terminal() && !state.is_transitional() => {
            through(None, LifecycleAction::Terminate)
        }
        _ => {
            return Err(EngineError::State {
                instance: instance.to_string(),
                actual: current,
                expected: valid_sources(action),
            })
        }
    };
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleAction::*;
    use LifecycleState::*;

    #[test]
    fn test_already_in_target_is_no_op() {
        assert_eq!(plan("ws", Hibernated, Hibernate).unwrap(), Plan::AlreadyInTarget);
        assert_eq!(plan("ws", Running, Start).unwrap(), Plan::AlreadyInTarget);
        assert_eq!(plan("ws", Running, Resume).unwrap(), Plan::AlreadyInTarget);
        assert_eq!(plan("ws", Terminated, Terminate).unwrap(), Plan::AlreadyInTarget);
    }

    #[test]
    fn test_resume_from_stopped_is_ordinary_start() {
        assert_eq!(
            plan("ws", Stopped, Resume).unwrap(),
            Plan::Through {
                via: Some(Starting),
                call: Start,
                target: Running
            }
        );
        assert_eq!(
            plan("ws", Hibernated, Resume).unwrap(),
            Plan::Through {
                via: Some(Resuming),
                call: Resume,
                target: Running
            }
        );
    }

    #[test]
    fn test_hibernate_on_terminated_names_states() {
        let err = plan("ws-9", Terminated, Hibernate).unwrap_err();
        match err {
            EngineError::State {
                actual, expected, ..
            } => {
                assert_eq!(actual, Terminated);
                assert_eq!(expected, vec![Running]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_terminated_is_final() {
        for action in [Start, Stop, Hibernate, Resume] {
            assert!(plan("ws", Terminated, action).is_err());
        }
    }

    #[test]
    fn test_terminate_from_any_settled_state() {
        for state in [Pending, Running, Stopped, Hibernated] {
            assert_eq!(
                plan("ws", state, Terminate).unwrap(),
                Plan::Through {
                    via: None,
                    call: Terminate,
                    target: Terminated
                }
            );
        }
    }

    #[test]
    fn test_stop_requires_running() {
        assert!(plan("ws", Hibernated, Stop).is_err());
        assert!(plan("ws", Pending, Hibernate).is_err());
    }
}
