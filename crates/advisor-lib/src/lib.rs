//! Advisor library for cloud workstation fleets
//!
//! This crate provides the core functionality for:
//! - Bounded per-instance utilization windows
//! - Resource analysis and right-sizing recommendations
//! - Lifecycle transitions with hibernate-to-stop fallback
//! - Idle policy evaluation
//! - Health checks and observability

pub mod analyzer;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod idle;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod recommender;
pub mod store;

pub use analyzer::{ResourceAnalyzer, ResourceSummary};
pub use catalog::{SizeCatalog, SizeSpec};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{AdvisorEngine, RefreshReport};
pub use error::{EngineError, EngineResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use idle::{IdleAction, IdleDecision, IdleEvent, IdlePolicy};
pub use lifecycle::{CloudProvider, ProviderError, SimulatedProvider};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use recommender::{
    FleetRecommendations, FleetSummary, RecommendationRefresher, RefreshConfig, RefreshScheduler,
};
