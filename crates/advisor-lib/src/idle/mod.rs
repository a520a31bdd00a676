//! Idle detection
//!
//! Each instance with an assigned policy gets one background evaluator that
//! compares time since last activity against the policy threshold and asks
//! the lifecycle state machine to hibernate or stop it once per idle episode.

pub mod activity;
pub mod evaluator;
pub mod history;
pub mod policy;
pub mod tracker;

pub use activity::ActivitySignal;
pub use evaluator::{EvaluatorContext, IdleDecision, IdleEvaluator};
pub use history::{IdleEvent, IdleHistory};
pub use policy::{IdleAction, IdlePolicy};
pub use tracker::{IdleCheck, IdleTracker};
