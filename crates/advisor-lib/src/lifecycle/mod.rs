//! Lifecycle management
//!
//! The state machine is the only writer of an instance's [`LifecycleState`];
//! everything else reads it. Provider calls go through the [`CloudProvider`]
//! adapter.
//!
//! [`LifecycleState`]: crate::models::LifecycleState

mod machine;
pub mod provider;
pub mod transitions;

pub use machine::LifecycleStateMachine;
pub use provider::{family_supports_hibernation, CloudProvider, ProviderError, SimulatedProvider};
pub use transitions::{plan, Plan};
