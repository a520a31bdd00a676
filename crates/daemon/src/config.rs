//! Daemon configuration

use advisor_lib::config::EngineConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "WORKSTATION_ADVISOR_CONFIG";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "WORKSTATION_ADVISOR";

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Fleet label attached to structured log events
    #[serde(default = "default_fleet_name")]
    pub fleet_name: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Recommendation refresh interval in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Artificial latency of the simulated cloud provider
    #[serde(default)]
    pub simulated_latency_ms: u64,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_fleet_name() -> String {
    "default".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_refresh_interval() -> u64 {
    3600
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            fleet_name: default_fleet_name(),
            api_port: default_api_port(),
            refresh_interval_secs: default_refresh_interval(),
            simulated_latency_ms: 0,
            engine: EngineConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the optional config file and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (if any), then apply environment overrides
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;

        let config: DaemonConfig = config
            .try_deserialize()
            .context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            anyhow::bail!("refresh_interval_secs must be positive");
        }
        self.engine.validate()?;
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}
