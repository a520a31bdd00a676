//! Periodic recommendation refresh
//!
//! Regenerates every instance's cached recommendation on a fixed interval
//! and folds the outcome into the recommender and metrics store health.

use crate::engine::{AdvisorEngine, RefreshReport};
use crate::health::{components, HealthRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Default refresh interval (hourly)
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Share of rejected samples in one interval that degrades the metrics store
pub const REJECTION_DEGRADED_RATIO: f64 = 0.10;

/// Anything the scheduler can ask for a refresh pass
#[async_trait]
pub trait RecommendationRefresher: Send + Sync {
    async fn refresh_recommendations(&self) -> RefreshReport;
}

#[async_trait]
impl RecommendationRefresher for AdvisorEngine {
    async fn refresh_recommendations(&self) -> RefreshReport {
        AdvisorEngine::refresh_recommendations(self).await
    }
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

pub struct RefreshScheduler {
    refresher: Arc<dyn RecommendationRefresher>,
    health: Option<HealthRegistry>,
    config: RefreshConfig,
}

impl RefreshScheduler {
    pub fn new(refresher: Arc<dyn RecommendationRefresher>, config: RefreshConfig) -> Self {
        Self {
            refresher,
            health: None,
            config,
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run one refresh cycle
    pub async fn refresh_once(&self) -> RefreshReport {
        let report = self.refresher.refresh_recommendations().await;
        if let Some(health) = &self.health {
            let attempted = report.refreshed + report.failed.len();
            health
                .record_cycle(components::RECOMMENDER, attempted, report.failed.len())
                .await;
            Self::record_ingest(health, &report).await;
        }
        report
    }

    async fn record_ingest(health: &HealthRegistry, report: &RefreshReport) {
        let total = report.samples_accepted + report.samples_rejected;
        if total == 0 {
            return;
        }
        let ratio = report.samples_rejected as f64 / total as f64;
        if ratio >= REJECTION_DEGRADED_RATIO {
            warn!(
                rejected = report.samples_rejected,
                total, "Elevated sample rejection rate"
            );
            health
                .set_degraded(
                    components::METRICS_STORE,
                    format!("{} of {total} samples rejected", report.samples_rejected),
                )
                .await;
        } else {
            health.set_healthy(components::METRICS_STORE).await;
        }
    }

    /// Run the refresh loop until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting recommendation refresh scheduler"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down recommendation refresh scheduler");
                    break;
                }
            }
        }
    }
}
